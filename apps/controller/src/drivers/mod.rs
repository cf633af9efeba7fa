// [apps/controller/src/drivers/mod.rs]
/*!
 * APARATO: DRIVER ABSTRACTIONS
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTERS (ESTRATO L6)
 * RESPONSABILIDAD: FRONTERAS DELGADAS HACIA HARDWARE EXTERNO
 *
 * Wire protocols (RTSP decoding, ONVIF/Hikvision PTZ command formats,
 * mic-array firmware registers) are deliberately out of scope — each
 * trait here is the thin contract a real adapter implements. This crate
 * ships one concrete implementor per trait for local testing and `test://`
 * style development, not a production hardware backend.
 */

pub mod frame_source;
pub mod llm_client;
pub mod mic_driver;
pub mod object_detector;
pub mod ptz_driver;
pub mod speech_recognizer;

pub use frame_source::{FrameSource, SyntheticFrameSource};
pub use llm_client::{LlmAnalysisRequest, LlmClient, ScriptedLlmClient};
pub use mic_driver::{MicDriver, ScriptedMicDriver};
pub use object_detector::{ObjectDetector, ScriptedObjectDetector};
pub use ptz_driver::{LoggingPtzDriver, PtzDriver};
pub use speech_recognizer::{ListenOutcome, RecognizedAudio, ScriptedSpeechRecognizer, SpeechRecognizer};
