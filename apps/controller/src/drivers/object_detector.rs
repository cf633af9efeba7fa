// [apps/controller/src/drivers/object_detector.rs]
/*!
 * APARATO: OBJECT DETECTOR CONTRACT
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTERS (ESTRATO L6)
 * RESPONSABILIDAD: FRONTERA DELGADA HACIA EL MODELO DE DETECCIÓN
 *
 * The concrete detector (weights, runtime, inference backend) is
 * deliberately out of scope — this is the thin contract `DetectionModule`
 * calls each tick. A detector error is caught by the module, never
 * propagated; this trait surfaces `anyhow::Result` so real implementors
 * can report exactly that without inventing their own error type.
 */

use std::sync::Mutex;

use aegis_domain_models::{Frame, RawDetection};

pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> anyhow::Result<Vec<RawDetection>>;
}

/// A scripted detector for tests and `test://`-style local runs: replays
/// a fixed queue of per-frame detection sets, repeating the last set
/// forever once exhausted (empty set if none was ever scripted).
pub struct ScriptedObjectDetector {
    script: Mutex<std::collections::VecDeque<Vec<RawDetection>>>,
    last: Mutex<Vec<RawDetection>>,
}

impl ScriptedObjectDetector {
    pub fn new(frames: Vec<Vec<RawDetection>>) -> Self {
        Self {
            script: Mutex::new(frames.into()),
            last: Mutex::new(Vec::new()),
        }
    }
}

impl ObjectDetector for ScriptedObjectDetector {
    fn detect(&self, _frame: &Frame) -> anyhow::Result<Vec<RawDetection>> {
        let mut script = self.script.lock().unwrap();
        let next = script.pop_front();
        drop(script);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = next {
            *last = next;
        }
        Ok(last.clone())
    }
}
