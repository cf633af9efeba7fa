// [libs/domain-models/src/speech.rs]
/*!
 * APARATO: SPEECH UTTERANCE CONTRACT
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single recognized speech utterance, produced by the STT module and
/// consumed (single-slot, destructively) by the LLM analysis module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechUtterance {
    /// Non-empty, UTF-8 recognized text.
    pub text: String,
    pub recognized_at: DateTime<Utc>,
    /// Audio duration, seconds.
    pub duration_secs: f32,
    /// Most recent `mic.doa_detected.sector_angle` observed at recognition time.
    pub doa_angle: Option<u16>,
}
