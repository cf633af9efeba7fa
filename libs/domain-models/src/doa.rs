// [libs/domain-models/src/doa.rs]
/*!
 * APARATO: DIRECTION-OF-ARRIVAL CONTRACT
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: LECTURA DE DOA SUAVIZADA DEL ARREGLO DE MICRÓFONOS
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single smoothed direction-of-arrival reading, already through the
/// circular-mean and sector-quantization pipeline in the mic array module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoaReading {
    /// Raw instantaneous angle, 0..360, 0 = array front, clockwise.
    pub raw_angle: f32,
    /// Circular-mean smoothed angle over the recent history window.
    pub smooth_angle: f32,
    /// Circular-mean resultant length, in `[0, 1]`.
    pub confidence: f32,
    /// AGC gain at the time of the reading.
    pub gain: f32,
    /// `smooth_angle` quantized to the nearest 30-degree sector.
    pub sector: u16,
    pub captured_at: DateTime<Utc>,
}
