// [libs/domain-models/src/detection.rs]
/*!
 * APARATO: DETECTION & RE-IDENTIFICATION CONTRACTS
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: TIPOS PARA OBJETOS DETECTADOS, IDENTIDAD PERSISTENTE
 *                   Y LA MÁQUINA DE ESTADOS DE SEGUIMIENTO
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounding box clamped to its parent frame, in pixel coordinates.
///
/// Invariant: `x1 < x2` and `y1 < y2`; callers that cannot uphold this
/// (zero-area crops, out-of-frame coordinates) must not construct one —
/// see `DetectedObject::clamp_to_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn area(&self) -> i64 {
        (self.x2 - self.x1) as i64 * (self.y2 - self.y1) as i64
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.x1 + self.x2) as f32 / 2.0,
            (self.y1 + self.y2) as f32 / 2.0,
        )
    }

    /// Clamps the box into `[0, frame_width) x [0, frame_height)`. Returns
    /// `None` if the clamped box has zero or negative area — the caller
    /// must skip the detection rather than construct a degenerate box.
    pub fn clamp_to_frame(&self, frame_width: u32, frame_height: u32) -> Option<Self> {
        let x1 = self.x1.max(0);
        let y1 = self.y1.max(0);
        let x2 = self.x2.min(frame_width as i32);
        let y2 = self.y2.min(frame_height as i32);
        if x2 <= x1 || y2 <= y1 {
            None
        } else {
            Some(Self { x1, y1, x2, y2 })
        }
    }
}

/// A single raw detector output, before re-identification or priority
/// scoring have run. Produced by whatever concrete object detector is
/// wired in — the detector itself is out of scope for this crate; this is
/// the thin contract it must fill in.
#[derive(Debug, Clone)]
pub struct RawDetection {
    /// Ephemeral id assigned by the detector's own tracker for this frame;
    /// may churn frame to frame.
    pub tracker_id: u64,
    pub class_id: u32,
    pub class_name: String,
    pub bbox: BoundingBox,
}

/// One detection in a single pass over a frame, after re-identification and
/// priority scoring have run. `tracker_id` is the ephemeral id the detector
/// assigns this pass (may churn frame to frame); `permanent_id` is the
/// re-identification identity that survives churn — see [`ReIdentity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedObject {
    pub tracker_id: u64,
    pub permanent_id: u64,
    pub class_id: u32,
    pub class_name: String,
    pub display_name: String,
    pub bbox: BoundingBox,
    pub priority_score: f32,
    pub doa_bonus: Option<f32>,
}

impl DetectedObject {
    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }

    /// `priority_score` plus any DOA alignment bonus — what the tracking
    /// state machine actually ranks objects by.
    pub fn effective_priority(&self) -> f32 {
        self.priority_score + self.doa_bonus.unwrap_or(0.0)
    }
}

/// A persistent identity tracked across frames by appearance fingerprint.
///
/// Invariant: at any instant at most one live tracker id maps to a given
/// `permanent_id` — enforced by the id map in the detection module, not by
/// this type. `fingerprint` is a normalized Hue/Saturation 2-D histogram,
/// flattened row-major (16x16 = 256 bins).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReIdentity {
    pub permanent_id: u64,
    pub fingerprint: Vec<f32>,
    pub display_name: String,
    pub last_seen: DateTime<Utc>,
}

impl ReIdentity {
    pub fn new(permanent_id: u64, fingerprint: Vec<f32>, now: DateTime<Utc>) -> Self {
        Self {
            permanent_id,
            display_name: format!("Person {permanent_id}"),
            fingerprint,
            last_seen: now,
        }
    }

    /// Overwrites the stored fingerprint — replacement, not averaging.
    /// This mirrors the source system's observed behavior exactly; see
    /// SPEC_FULL.md's Open Question resolution before changing this to an
    /// averaged update.
    pub fn update_fingerprint(&mut self, fingerprint: Vec<f32>, now: DateTime<Utc>) {
        self.fingerprint = fingerprint;
        self.last_seen = now;
    }
}

/// The detection state machine's current mode. Transitions are restricted
/// to those in the detection module's documentation — this type itself
/// does not enforce them, it is the payload the state machine mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackState {
    Tracking {
        target_permanent_id: u64,
        since: DateTime<Utc>,
    },
    Searching {
        lost_at: DateTime<Utc>,
    },
    Patrol,
}

impl TrackState {
    pub fn is_tracking(&self) -> bool {
        matches!(self, TrackState::Tracking { .. })
    }

    pub fn is_searching(&self) -> bool {
        matches!(self, TrackState::Searching { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_rejects_zero_area() {
        let bbox = BoundingBox { x1: 10, y1: 10, x2: 10, y2: 50 };
        assert!(bbox.clamp_to_frame(640, 480).is_none());
    }

    #[test]
    fn clamp_clips_to_frame_bounds() {
        let bbox = BoundingBox { x1: -5, y1: -5, x2: 700, y2: 500 };
        let clamped = bbox.clamp_to_frame(640, 480).unwrap();
        assert_eq!(clamped, BoundingBox { x1: 0, y1: 0, x2: 640, y2: 480 });
    }

    #[test]
    fn fingerprint_update_replaces_not_averages() {
        let now = Utc::now();
        let mut identity = ReIdentity::new(1, vec![1.0, 0.0], now);
        identity.update_fingerprint(vec![0.0, 1.0], now);
        assert_eq!(identity.fingerprint, vec![0.0, 1.0]);
    }
}
