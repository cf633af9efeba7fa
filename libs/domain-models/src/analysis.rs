// [libs/domain-models/src/analysis.rs]
/*!
 * APARATO: MULTIMODAL ANALYSIS CONTRACT
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: RESULTADO DE ANÁLISIS DE SITUACIÓN LLM Y LA ESCALA DE
 *                   PRIORIDAD/URGENCIA COMPARTIDA POR TODO EL SISTEMA
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::speech::SpeechUtterance;

/// Shared urgency/priority scale. Ordering matches `PRIORITY_ORDER` in the
/// originating system's orchestrator: `Critical > High > Medium > Low`.
/// Used both as `AnalysisResult::urgency`/`priority` and as the generic
/// rank the orchestrator's `highest_priority` helper scans pipeline step
/// results for (see SPEC_FULL.md §F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

pub type Urgency = Priority;

/// Output of one multimodal LLM situation analysis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub situation_type: String,
    pub situation: String,
    pub urgency: Urgency,
    pub priority: Priority,
    pub is_emergency: bool,
    pub reason: String,
    pub suggested_action: String,
    pub audio_visual_consistency: String,
    pub produced_at: DateTime<Utc>,
    pub source_utterance: SpeechUtterance,
}
