// [apps/controller/src/modules/stt.rs]
/*!
 * APARATO: SPEECH-TO-TEXT MODULE (C8)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: ESCUCHA EN SEGUNDO PLANO Y PUBLICACIÓN DE
 *                   TRANSCRIPCIONES RECONOCIDAS
 *
 * Runs its own background loop, independent of the pipeline cadence — one
 * of the "parallel threads" spec.md §5 describes. The recognized text is
 * handed off to `LlmAnalysisModule` exclusively through the single-slot
 * [`crate::mailbox::PendingUtteranceSlot`], never a shared queue.
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use aegis_domain_models::{Event, EventPayload, SpeechUtterance};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SttConfig;
use crate::drivers::{ListenOutcome, SpeechRecognizer};
use crate::event_bus::EventBus;
use crate::mailbox::PendingUtteranceSlot;

use super::{Module, ModuleStatus, ModuleStatusSnapshot, SharedData};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const AMBIENT_NOISE_ADJUST: Duration = Duration::from_secs(1);
const NETWORK_ERROR_BACKOFF: Duration = Duration::from_secs(2);
const OTHER_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Listens in the background, transcribes speech, and publishes
/// `stt.text_recognized` — the only producer into the STT/LLM handoff
/// mailbox.
pub struct SttModule {
    config: SttConfig,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    bus: Arc<EventBus>,
    mailbox: Arc<PendingUtteranceSlot>,
    running: Arc<AtomicBool>,
    loop_handle: StdMutex<Option<JoinHandle<()>>>,
    latest_doa_sector: Arc<StdMutex<Option<u16>>>,
    status: ModuleStatus,
}

impl SttModule {
    pub fn new(
        config: SttConfig,
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
        bus: Arc<EventBus>,
        mailbox: Arc<PendingUtteranceSlot>,
    ) -> Self {
        Self {
            config,
            recognizer,
            bus,
            mailbox,
            running: Arc::new(AtomicBool::new(false)),
            loop_handle: StdMutex::new(None),
            latest_doa_sector: Arc::new(StdMutex::new(None)),
            status: ModuleStatus::new(),
        }
    }

    fn spawn_loop(&self) {
        let Some(recognizer) = self.recognizer.clone() else {
            return;
        };
        let running = Arc::clone(&self.running);
        let bus = Arc::clone(&self.bus);
        let mailbox = Arc::clone(&self.mailbox);
        let doa = Arc::clone(&self.latest_doa_sector);
        let phrase_time_limit = Duration::from_secs_f32(self.config.phrase_time_limit_secs);
        let min_audio_duration = self.config.min_audio_duration_secs;

        running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(async move {
            recognizer.adjust_for_ambient_noise(AMBIENT_NOISE_ADJUST);

            while running.load(Ordering::SeqCst) {
                let outcome = {
                    let recognizer = Arc::clone(&recognizer);
                    tokio::task::spawn_blocking(move || recognizer.listen(WAIT_TIMEOUT, phrase_time_limit))
                        .await
                        .unwrap_or(ListenOutcome::OtherError("recognizer task panicked".to_string()))
                };
                match outcome {
                    ListenOutcome::Recognized(audio) => {
                        if audio.duration_secs < min_audio_duration {
                            debug!(duration = audio.duration_secs, "recording rejected as noise");
                            continue;
                        }

                        let now = Utc::now();
                        let doa_angle = *doa.lock().unwrap();
                        let utterance = SpeechUtterance {
                            text: audio.text.clone(),
                            recognized_at: now,
                            duration_secs: audio.duration_secs,
                            doa_angle,
                        };
                        mailbox.publish(utterance);

                        info!(text = %audio.text, "speech recognized");
                        bus.publish(Event::new(
                            EventPayload::SttTextRecognized {
                                text: audio.text,
                                timestamp: now,
                                duration: audio.duration_secs,
                                doa_angle,
                            },
                            "stt",
                            0,
                        ))
                        .await;
                    }
                    ListenOutcome::TimedOut => {}
                    ListenOutcome::Unrecognized => {
                        debug!("speech detected but not recognized");
                    }
                    ListenOutcome::NetworkError => {
                        warn!("recognizer network error, backing off");
                        tokio::time::sleep(NETWORK_ERROR_BACKOFF).await;
                    }
                    ListenOutcome::OtherError(message) => {
                        warn!(error = %message, "recognizer error, backing off");
                        tokio::time::sleep(OTHER_ERROR_BACKOFF).await;
                    }
                }
            }
        });

        *self.loop_handle.lock().unwrap() = Some(handle);
    }
}

impl Module for SttModule {
    fn name(&self) -> &str {
        "stt"
    }

    fn initialize(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        async move {
            if self.recognizer.is_none() {
                anyhow::bail!("speech recognizer unavailable at init");
            }
            self.spawn_loop();
            self.status.mark_initialized(true);
            self.bus
                .publish(Event::new(EventPayload::SttListeningStarted, "stt", 0))
                .await;
            info!("stt module started");
            Ok(())
        }
        .boxed()
    }

    fn process<'a>(&'a self, _shared: &'a SharedData) -> BoxFuture<'a, anyhow::Result<serde_json::Value>> {
        async move { Ok(json!({ "listening": self.running.load(Ordering::SeqCst) })) }.boxed()
    }

    fn shutdown(&self) -> BoxFuture<'_, ()> {
        async move {
            self.running.store(false, Ordering::SeqCst);
            if let Some(handle) = self.loop_handle.lock().unwrap().take() {
                let _ = tokio::time::timeout(Duration::from_secs(3), handle).await;
            }
            self.bus
                .publish(Event::new(EventPayload::SttListeningStopped, "stt", 0))
                .await;
            self.status.mark_initialized(false);
            debug!("stt module shut down");
        }
        .boxed()
    }

    fn on_event(&self, event: &Event) {
        if let EventPayload::MicDoaDetected { sector_angle, .. } = &event.payload {
            *self.latest_doa_sector.lock().unwrap() = Some(*sector_angle);
        }
    }

    fn status(&self) -> ModuleStatusSnapshot {
        self.status.snapshot()
    }

    fn enable(&self) {
        self.status.enable();
    }

    fn disable(&self) {
        self.status.disable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::RecognizedAudio;

    fn config() -> SttConfig {
        SttConfig {
            language: "ko-KR".to_string(),
            energy_threshold: 400,
            pause_threshold_secs: 3.0,
            phrase_time_limit_secs: 15.0,
            min_audio_duration_secs: 0.3,
        }
    }

    #[tokio::test]
    async fn recognized_speech_lands_in_mailbox_and_on_bus() {
        let recognizer: Arc<dyn SpeechRecognizer> =
            Arc::new(crate::drivers::ScriptedSpeechRecognizer::new(vec![ListenOutcome::Recognized(
                RecognizedAudio { text: "help me".to_string(), duration_secs: 1.2 },
            )]));
        let bus = EventBus::new();
        let mailbox = PendingUtteranceSlot::new();
        let module = SttModule::new(config(), Some(recognizer), Arc::clone(&bus), Arc::clone(&mailbox));

        module.initialize().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let pending = mailbox.take_if_fresh(Duration::from_secs(30));
        assert_eq!(pending.unwrap().text, "help me");

        module.shutdown().await;
    }

    #[tokio::test]
    async fn recordings_shorter_than_minimum_are_rejected_as_noise() {
        let recognizer: Arc<dyn SpeechRecognizer> =
            Arc::new(crate::drivers::ScriptedSpeechRecognizer::new(vec![ListenOutcome::Recognized(
                RecognizedAudio { text: "uh".to_string(), duration_secs: 0.1 },
            )]));
        let bus = EventBus::new();
        let mailbox = PendingUtteranceSlot::new();
        let module = SttModule::new(config(), Some(recognizer), Arc::clone(&bus), Arc::clone(&mailbox));

        module.initialize().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(mailbox.take_if_fresh(Duration::from_secs(30)).is_none());
        module.shutdown().await;
    }

    #[tokio::test]
    async fn missing_recognizer_fails_initialization() {
        let bus = EventBus::new();
        let mailbox = PendingUtteranceSlot::new();
        let module = SttModule::new(config(), None, bus, mailbox);
        assert!(module.initialize().await.is_err());
    }
}
