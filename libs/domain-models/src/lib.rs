// [libs/domain-models/src/lib.rs]

pub mod analysis;
pub mod detection;
pub mod doa;
pub mod event;
pub mod frame;
pub mod ptz;
pub mod speech;

pub use analysis::{AnalysisResult, Priority, Urgency};
pub use detection::{BoundingBox, DetectedObject, RawDetection, ReIdentity, TrackState};
pub use doa::DoaReading;
pub use event::{Event, EventPayload};
pub use frame::Frame;
pub use ptz::{PtzMode, PtzPriority, PtzRequest};
pub use speech::SpeechUtterance;
