// [apps/controller/src/drivers/speech_recognizer.rs]
/*!
 * APARATO: SPEECH RECOGNIZER CONTRACT
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTERS (ESTRATO L6)
 * RESPONSABILIDAD: FRONTERA DELGADA HACIA EL BACKEND DE RECONOCIMIENTO DE VOZ
 *
 * The concrete recognizer (Google Speech API, a local Whisper model, or
 * anything else) is deliberately out of scope — this is the thin contract
 * `SttModule` polls on its own background thread. `listen` never panics
 * and never returns a `Result`: every failure mode the spec distinguishes
 * (timeout, unrecognized audio, network error, other error) is a variant
 * of [`ListenOutcome`] so the module can apply its own retry/backoff
 * policy without downcasting an error type.
 */

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One successfully transcribed utterance, before the STT module wraps it
/// into a [`aegis_domain_models::SpeechUtterance`] with a DOA angle.
#[derive(Debug, Clone)]
pub struct RecognizedAudio {
    pub text: String,
    pub duration_secs: f32,
}

/// Every outcome one `listen` call can produce. `TimedOut` is the normal
/// "nothing said in the wait window" case and warrants an immediate retry
/// with no backoff; `NetworkError`/`OtherError` warrant the backoff the
/// spec prescribes (2s / 1s respectively).
#[derive(Debug, Clone)]
pub enum ListenOutcome {
    Recognized(RecognizedAudio),
    TimedOut,
    Unrecognized,
    NetworkError,
    OtherError(String),
}

/// Background-thread-polled speech recognizer. `adjust_for_ambient_noise`
/// is called once at startup; `listen` is called repeatedly from the
/// module's own loop.
pub trait SpeechRecognizer: Send + Sync {
    fn adjust_for_ambient_noise(&self, duration: Duration);
    fn listen(&self, wait_timeout: Duration, phrase_time_limit: Duration) -> ListenOutcome;
}

/// A scripted recognizer for tests and `test://`-style local runs: replays
/// a fixed queue of outcomes, repeating `TimedOut` forever once exhausted
/// (so a loop polling it behaves like a quiet room rather than looping a
/// stale utterance).
pub struct ScriptedSpeechRecognizer {
    script: Mutex<VecDeque<ListenOutcome>>,
}

impl ScriptedSpeechRecognizer {
    pub fn new(outcomes: Vec<ListenOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
        }
    }
}

impl SpeechRecognizer for ScriptedSpeechRecognizer {
    fn adjust_for_ambient_noise(&self, _duration: Duration) {}

    fn listen(&self, _wait_timeout: Duration, _phrase_time_limit: Duration) -> ListenOutcome {
        let mut script = self.script.lock().unwrap();
        script.pop_front().unwrap_or(ListenOutcome::TimedOut)
    }
}
