// [apps/controller/src/modules/llm_analysis.rs]
/*!
 * APARATO: LLM SITUATION ANALYSIS MODULE (C9)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: FUSIÓN DE VOZ RECONOCIDA + FOTOGRAMA ACTUAL EN UN
 *                   ANÁLISIS DE SITUACIÓN MULTIMODAL
 *
 * Grounded in `modules/context_llm.py`. The trigger is intentionally
 * narrow: a pending STT utterance, not a person detection, is what starts
 * an analysis — visual-only activity never reaches the LLM on its own.
 */

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use aegis_domain_models::{AnalysisResult, Event, EventPayload};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, RgbImage};
use serde_json::json;
use tracing::{info, warn};

use crate::config::LlmConfig;
use crate::drivers::{LlmAnalysisRequest, LlmClient};
use crate::event_bus::EventBus;
use crate::mailbox::PendingUtteranceSlot;

use super::{Module, ModuleStatus, ModuleStatusSnapshot, SharedData};

/// Re-encodes `frame`'s raw RGB pixels as a JPEG no larger than
/// `max_long_side` on its longest dimension, matching spec.md §4.9 step 5.
/// Upscaling never happens — a frame already within bounds is encoded as-is.
fn downsample_and_encode(
    frame: &aegis_domain_models::Frame,
    max_long_side: u32,
    jpeg_quality: u8,
) -> anyhow::Result<Vec<u8>> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
        .ok_or_else(|| anyhow::anyhow!("frame pixel buffer does not match its declared dimensions"))?;

    let long_side = frame.width.max(frame.height);
    let resized = if long_side > max_long_side {
        let scale = max_long_side as f32 / long_side as f32;
        let new_width = ((frame.width as f32) * scale).round().max(1.0) as u32;
        let new_height = ((frame.height as f32) * scale).round().max(1.0) as u32;
        image::imageops::resize(&image, new_width, new_height, FilterType::Triangle)
    } else {
        image
    };

    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, jpeg_quality);
    encoder.encode_image(&resized)?;
    Ok(buffer)
}

/// Fuses the pending STT utterance (if any, if fresh) with the current
/// frame into one multimodal LLM call, gated by a cooldown and cached
/// between calls so a quiet tick still has a displayable last result.
pub struct LlmAnalysisModule {
    config: LlmConfig,
    client: Option<std::sync::Arc<dyn LlmClient>>,
    bus: std::sync::Arc<EventBus>,
    mailbox: std::sync::Arc<PendingUtteranceSlot>,
    last_analysis_millis: AtomicI64,
    last_result: StdMutex<Option<AnalysisResult>>,
    status: ModuleStatus,
}

impl LlmAnalysisModule {
    pub fn new(
        config: LlmConfig,
        client: Option<std::sync::Arc<dyn LlmClient>>,
        bus: std::sync::Arc<EventBus>,
        mailbox: std::sync::Arc<PendingUtteranceSlot>,
    ) -> Self {
        Self {
            config,
            client,
            bus,
            mailbox,
            last_analysis_millis: AtomicI64::new(0),
            last_result: StdMutex::new(None),
            status: ModuleStatus::new(),
        }
    }

    fn cooldown_elapsed(&self) -> bool {
        let last = self.last_analysis_millis.load(Ordering::SeqCst);
        if last == 0 {
            return true;
        }
        let elapsed_millis = Utc::now().timestamp_millis() - last;
        elapsed_millis >= (self.config.analysis_cooldown_secs * 1000.0) as i64
    }

    fn cached_result(&self) -> serde_json::Value {
        match self.last_result.lock().unwrap().clone() {
            Some(result) => json!({ "status": "cached", "result": result }),
            None => json!({ "status": "not_analyzed", "reason": "cooldown" }),
        }
    }

    async fn emit_result(&self, result: &AnalysisResult) {
        self.bus
            .publish(Event::new(
                EventPayload::LlmAnalysisComplete {
                    priority: result.priority,
                    is_emergency: result.is_emergency,
                    situation_type: result.situation_type.clone(),
                    urgency: result.urgency,
                    summary: result.situation.clone(),
                    speech_text: result.source_utterance.text.clone(),
                },
                "llm_analysis",
                if result.is_emergency { 2 } else { 0 },
            ))
            .await;

        if result.is_emergency {
            self.bus
                .publish(Event::new(
                    EventPayload::LlmEmergency {
                        urgency: result.urgency,
                        situation: result.situation.clone(),
                        reason: result.reason.clone(),
                    },
                    "llm_analysis",
                    2,
                ))
                .await;
        }
    }
}

impl Module for LlmAnalysisModule {
    fn name(&self) -> &str {
        "llm_analysis"
    }

    fn initialize(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        async move {
            if self.client.is_none() {
                anyhow::bail!("llm client unavailable at init");
            }
            self.status.mark_initialized(true);
            info!("llm analysis module ready");
            Ok(())
        }
        .boxed()
    }

    fn process<'a>(&'a self, shared: &'a SharedData) -> BoxFuture<'a, anyhow::Result<serde_json::Value>> {
        async move {
            let Some(client) = self.client.clone() else {
                return Ok(json!({ "status": "not_analyzed", "reason": "no_client" }));
            };

            let Some(frame) = shared.frame.clone() else {
                return Ok(json!({ "status": "not_analyzed", "reason": "no_frame" }));
            };

            if !self.cooldown_elapsed() {
                return Ok(self.cached_result());
            }

            let ttl = Duration::from_secs_f32(self.config.pending_utterance_ttl_secs);
            let Some(utterance) = self.mailbox.take_if_fresh(ttl) else {
                return Ok(json!({ "status": "not_analyzed", "reason": "no_speech" }));
            };

            let has_person = shared
                .result_for("detection")
                .and_then(|value| value.get("person_detected"))
                .and_then(|value| value.as_bool())
                .unwrap_or(false);

            let jpeg_image = match downsample_and_encode(&frame, self.config.max_image_size, self.config.jpeg_quality) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(error = %err, "failed to encode frame for llm analysis");
                    self.status.record_process(true);
                    return Ok(json!({ "status": "not_analyzed", "reason": "error", "error": err.to_string() }));
                }
            };

            let request = LlmAnalysisRequest {
                utterance_text: utterance.text.clone(),
                jpeg_image,
                has_person,
            };

            // The cooldown clock starts here, before the call returns, so a
            // slow or hanging provider cannot be re-triggered every tick.
            self.last_analysis_millis
                .store(Utc::now().timestamp_millis(), Ordering::SeqCst);

            let analysis = tokio::task::spawn_blocking(move || client.analyze(request)).await;
            let result = match analysis {
                Ok(Ok(mut result)) => {
                    result.source_utterance = utterance;
                    result
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "llm analysis call failed");
                    self.status.record_process(true);
                    return Ok(json!({ "status": "not_analyzed", "reason": "error", "error": err.to_string() }));
                }
                Err(join_err) => {
                    warn!(error = %join_err, "llm analysis task panicked");
                    self.status.record_process(true);
                    return Ok(json!({ "status": "not_analyzed", "reason": "error", "error": join_err.to_string() }));
                }
            };

            self.emit_result(&result).await;
            *self.last_result.lock().unwrap() = Some(result.clone());
            self.status.record_process(false);
            Ok(json!({ "status": "analyzed", "result": result }))
        }
        .boxed()
    }

    fn shutdown(&self) -> BoxFuture<'_, ()> {
        async move {
            self.status.mark_initialized(false);
        }
        .boxed()
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
    use crate::drivers::ScriptedLlmClient;
    use aegis_domain_models::{Frame, Priority, SpeechUtterance};
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;

    fn config() -> LlmConfig {
        LlmConfig {
            model: "test-model".to_string(),
            analysis_cooldown_secs: 5.0,
            max_image_size: 640,
            jpeg_quality: 75,
            pending_utterance_ttl_secs: 30.0,
        }
    }

    fn sample_frame() -> Frame {
        Frame::new(4, 4, vec![128u8; 4 * 4 * 3], Utc::now())
    }

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            situation_type: "suspicious_activity".to_string(),
            situation: "person lingering near entrance".to_string(),
            urgency: Priority::Medium,
            priority: Priority::Medium,
            is_emergency: false,
            reason: "repeated loitering".to_string(),
            suggested_action: "notify security".to_string(),
            audio_visual_consistency: "consistent".to_string(),
            produced_at: Utc::now(),
            source_utterance: SpeechUtterance {
                text: "placeholder".to_string(),
                recognized_at: Utc::now(),
                duration_secs: 1.0,
                doa_angle: None,
            },
        }
    }

    #[tokio::test]
    async fn visual_activity_alone_never_triggers_analysis() {
        let client: std::sync::Arc<dyn LlmClient> = std::sync::Arc::new(ScriptedLlmClient::new(vec![sample_result()]));
        let bus = EventBus::new();
        let mailbox = PendingUtteranceSlot::new();
        let module = LlmAnalysisModule::new(config(), Some(client), bus, mailbox);
        module.initialize().await.unwrap();

        let mut shared = SharedData::default();
        shared.frame = Some(sample_frame());
        shared.results.insert("detection".to_string(), json!({ "person_detected": true }));

        let outcome = module.process(&shared).await.unwrap();
        assert_eq!(outcome["status"], "not_analyzed");
        assert_eq!(outcome["reason"], "no_speech");
    }

    #[tokio::test]
    async fn pending_utterance_triggers_analysis_and_clears_mailbox() {
        let client: std::sync::Arc<dyn LlmClient> = std::sync::Arc::new(ScriptedLlmClient::new(vec![sample_result()]));
        let bus = EventBus::new();
        let mailbox = PendingUtteranceSlot::new();
        mailbox.publish(SpeechUtterance {
            text: "someone is at the door".to_string(),
            recognized_at: Utc::now(),
            duration_secs: 1.5,
            doa_angle: Some(90),
        });
        let module = LlmAnalysisModule::new(config(), Some(client), bus, Arc::clone(&mailbox));

        let mut shared = SharedData::default();
        shared.frame = Some(sample_frame());

        let outcome = module.process(&shared).await.unwrap();
        assert_eq!(outcome["status"], "analyzed");
        assert!(mailbox.take_if_fresh(Duration::from_secs(30)).is_none());
    }

    #[tokio::test]
    async fn cooldown_blocks_back_to_back_analysis() {
        let client: std::sync::Arc<dyn LlmClient> =
            std::sync::Arc::new(ScriptedLlmClient::new(vec![sample_result(), sample_result()]));
        let bus = EventBus::new();
        let mailbox = PendingUtteranceSlot::new();
        mailbox.publish(SpeechUtterance {
            text: "first utterance".to_string(),
            recognized_at: Utc::now(),
            duration_secs: 1.0,
            doa_angle: None,
        });
        let module = LlmAnalysisModule::new(config(), Some(client), bus, Arc::clone(&mailbox));

        let mut shared = SharedData::default();
        shared.frame = Some(sample_frame());
        let first = module.process(&shared).await.unwrap();
        assert_eq!(first["status"], "analyzed");

        mailbox.publish(SpeechUtterance {
            text: "second utterance".to_string(),
            recognized_at: Utc::now(),
            duration_secs: 1.0,
            doa_angle: None,
        });
        let second = module.process(&shared).await.unwrap();
        assert_eq!(second["status"], "cached");
    }

    #[tokio::test]
    async fn stale_utterance_beyond_ttl_is_treated_as_no_speech() {
        let client: std::sync::Arc<dyn LlmClient> = std::sync::Arc::new(ScriptedLlmClient::new(vec![sample_result()]));
        let bus = EventBus::new();
        let mailbox = PendingUtteranceSlot::new();
        mailbox.publish(SpeechUtterance {
            text: "long gone".to_string(),
            recognized_at: Utc::now() - ChronoDuration::seconds(45),
            duration_secs: 1.0,
            doa_angle: None,
        });
        let module = LlmAnalysisModule::new(config(), Some(client), bus, mailbox);

        let mut shared = SharedData::default();
        shared.frame = Some(sample_frame());
        let outcome = module.process(&shared).await.unwrap();
        assert_eq!(outcome["reason"], "no_speech");
    }
}
