// [apps/controller/src/modules/reporter.rs]
/*!
 * APARATO: REPORTER MODULE (C11)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: ENVÍO DE EVENTOS SELECCIONADOS A UN ENDPOINT HTTP
 *                   EXTERNO CON LÍMITE DE TASA POR TÓPICO
 *
 * Grounded in `modules/server_reporter.py`: a fixed topic subscription
 * list, one independent cooldown timer per topic, and a fire-and-forget
 * POST that never retries. A slow or unreachable endpoint must never stall
 * the event bus that feeds this module — `on_event` returns immediately
 * and the HTTP call runs on a detached task.
 */

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aegis_domain_models::{Event, EventPayload};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::ReporterConfig;

use super::{Module, ModuleStatus, ModuleStatusSnapshot, SharedData};

/// One per-topic cooldown gate: a shared last-sent timestamp and the
/// minimum interval that must elapse before the next send is allowed.
/// A `min_interval` of zero (the emergency topic) always allows sending.
struct TopicGate {
    last_sent_millis: AtomicI64,
    min_interval: Duration,
}

impl TopicGate {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_sent_millis: AtomicI64::new(0),
            min_interval,
        }
    }

    fn try_acquire(&self) -> bool {
        if self.min_interval.is_zero() {
            return true;
        }
        let now = Utc::now().timestamp_millis();
        let last = self.last_sent_millis.load(Ordering::SeqCst);
        if now - last < self.min_interval.as_millis() as i64 {
            return false;
        }
        self.last_sent_millis
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Posts selected events to a configured HTTP endpoint, rate-limited
/// independently per topic. Never retries a failed send; the next eligible
/// event simply supersedes it.
pub struct ReporterModule {
    config: ReporterConfig,
    client: reqwest::Client,
    emergency_gate: TopicGate,
    analysis_gate: TopicGate,
    person_detected_gate: TopicGate,
    doa_gate: TopicGate,
    send_count: Arc<AtomicU64>,
    fail_count: Arc<AtomicU64>,
    status: ModuleStatus,
}

impl ReporterModule {
    pub fn new(config: ReporterConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f32(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            emergency_gate: TopicGate::new(Duration::from_secs_f32(config.cooldown_emergency_secs)),
            analysis_gate: TopicGate::new(Duration::from_secs_f32(config.cooldown_analysis_secs)),
            person_detected_gate: TopicGate::new(Duration::from_secs_f32(config.cooldown_person_detected_secs)),
            doa_gate: TopicGate::new(Duration::from_secs_f32(config.cooldown_doa_secs)),
            config,
            client,
            send_count: Arc::new(AtomicU64::new(0)),
            fail_count: Arc::new(AtomicU64::new(0)),
            status: ModuleStatus::new(),
        }
    }

    /// Test/introspection hook matching `server_reporter.py`'s counters.
    pub fn counts(&self) -> (u64, u64) {
        (
            self.send_count.load(Ordering::SeqCst),
            self.fail_count.load(Ordering::SeqCst),
        )
    }

    fn dispatch(&self, event_type: &str, data: serde_json::Value) {
        if self.config.url.is_empty() {
            return;
        }

        let body = json!({
            "source": "controller",
            "type": event_type,
            "timestamp": Utc::now().to_rfc3339(),
            "data": data,
        });

        let client = self.client.clone();
        let url = self.config.url.clone();
        let send_count = Arc::clone(&self.send_count);
        let fail_count = Arc::clone(&self.fail_count);
        let event_type = event_type.to_string();

        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    send_count.fetch_add(1, Ordering::SeqCst);
                    debug!(event_type = %event_type, "reported event delivered");
                }
                Ok(response) => {
                    fail_count.fetch_add(1, Ordering::SeqCst);
                    warn!(event_type = %event_type, status = %response.status(), "reporter received non-success status");
                }
                Err(err) => {
                    fail_count.fetch_add(1, Ordering::SeqCst);
                    warn!(event_type = %event_type, error = %err, "reporter post failed");
                }
            }
        });
    }
}

impl Module for ReporterModule {
    fn name(&self) -> &str {
        "reporter"
    }

    fn initialize(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        async move {
            self.status.mark_initialized(true);
            Ok(())
        }
        .boxed()
    }

    fn process<'a>(&'a self, _shared: &'a SharedData) -> BoxFuture<'a, anyhow::Result<serde_json::Value>> {
        async move {
            let (sent, failed) = self.counts();
            Ok(json!({ "send_count": sent, "fail_count": failed }))
        }
        .boxed()
    }

    fn shutdown(&self) -> BoxFuture<'_, ()> {
        async move {
            self.status.mark_initialized(false);
        }
        .boxed()
    }

    fn on_event(&self, event: &Event) {
        match &event.payload {
            EventPayload::LlmEmergency { urgency, situation, reason } => {
                if self.emergency_gate.try_acquire() {
                    self.dispatch(
                        "emergency",
                        json!({ "urgency": urgency, "situation": situation, "reason": reason }),
                    );
                }
            }
            EventPayload::LlmAnalysisComplete {
                priority,
                is_emergency,
                situation_type,
                urgency,
                summary,
                speech_text,
            } => {
                if self.analysis_gate.try_acquire() {
                    self.dispatch(
                        "analysis",
                        json!({
                            "priority": priority,
                            "is_emergency": is_emergency,
                            "situation_type": situation_type,
                            "urgency": urgency,
                            "summary": summary,
                            "speech_text": speech_text,
                        }),
                    );
                }
            }
            EventPayload::YoloPersonDetected { objects, count, target } => {
                if self.person_detected_gate.try_acquire() {
                    self.dispatch(
                        "person_detected",
                        json!({ "objects": objects, "count": count, "target": target }),
                    );
                }
            }
            EventPayload::MicDoaDetected {
                sector_angle,
                smooth_angle,
                confidence,
            } => {
                if self.doa_gate.try_acquire() {
                    self.dispatch(
                        "doa",
                        json!({
                            "sector_angle": sector_angle,
                            "smooth_angle": smooth_angle,
                            "confidence": confidence,
                        }),
                    );
                }
            }
            _ => {}
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

    fn config(url: &str) -> ReporterConfig {
        ReporterConfig {
            url: url.to_string(),
            timeout_secs: 2.0,
            cooldown_emergency_secs: 0.0,
            cooldown_analysis_secs: 2.0,
            cooldown_person_detected_secs: 3.0,
            cooldown_doa_secs: 0.2,
            cooldown_camera_move_secs: 0.5,
        }
    }

    #[test]
    fn emergency_gate_always_allows_send() {
        let gate = TopicGate::new(Duration::from_secs(0));
        assert!(gate.try_acquire());
        assert!(gate.try_acquire());
        assert!(gate.try_acquire());
    }

    #[test]
    fn rate_limited_gate_blocks_until_interval_elapses() {
        let gate = TopicGate::new(Duration::from_secs(3));
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
    }

    #[test]
    fn reporter_with_no_url_configured_does_not_panic_on_dispatch() {
        let reporter = ReporterModule::new(config(""));
        reporter.on_event(&Event::new(EventPayload::MicZenithDetected { confidence: 0.1 }, "mic", 0));
        let (sent, failed) = reporter.counts();
        assert_eq!(sent, 0);
        assert_eq!(failed, 0);
    }

    #[test]
    fn unrelated_topics_are_ignored() {
        let reporter = ReporterModule::new(config("http://127.0.0.1:9/report"));
        reporter.on_event(&Event::new(EventPayload::SttListeningStarted, "stt", 0));
        let (sent, failed) = reporter.counts();
        assert_eq!(sent, 0);
        assert_eq!(failed, 0);
    }
}
