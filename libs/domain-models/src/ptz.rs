// [libs/domain-models/src/ptz.rs]
/*!
 * APARATO: PTZ REQUEST & OWNERSHIP CONTRACTS
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: TIPOS PARA EL ARBITRAJE DE CONTROL DE CÁMARA
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Camera move priority, lowest to highest. Ordering is load-bearing: the
/// arbiter's accept rule compares these numerically (`req.priority >=
/// current`), so the derive order here must track `PATROL=0, MIC_DOA=1,
/// YOLO_TRACKING=2, EMERGENCY=3` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PtzPriority {
    Patrol = 0,
    MicDoa = 1,
    YoloTracking = 2,
    Emergency = 3,
}

/// The move itself: either a velocity command or an absolute pose command.
/// Pan/tilt/zoom for `Continuous` are clipped to `[-1, 1]` by the caller
/// before construction; `pan_deg`/`tilt_deg` for `Absolute` are in camera
/// degrees (`pan_deg in [0, 360)`, `tilt_deg in [-90, 90]`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum PtzMode {
    Continuous { pan: f32, tilt: f32, zoom: f32 },
    Absolute { pan_deg: f32, tilt_deg: f32, zoom: f32 },
}

/// A single request to move the camera, tagged with the requester's
/// identity and priority for arbitration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PtzRequest {
    pub mode: PtzMode,
    pub owner: String,
    pub priority: PtzPriority,
    pub created_at: DateTime<Utc>,
}

impl PtzRequest {
    pub fn new(mode: PtzMode, owner: impl Into<String>, priority: PtzPriority) -> Self {
        Self {
            mode,
            owner: owner.into(),
            priority,
            created_at: Utc::now(),
        }
    }
}
