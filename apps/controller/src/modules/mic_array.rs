// [apps/controller/src/modules/mic_array.rs]
/*!
 * APARATO: MIC ARRAY MODULE (C7)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: SUAVIZADO DE DOA POR MEDIA CIRCULAR, CLASIFICACIÓN DE
 *                   SECTORES/CENIT, Y SOLICITUDES PTZ ASOCIADAS
 *
 * Runs its own ~20 Hz sample loop on a dedicated task, independent of the
 * pipeline cadence — this is one of the "parallel threads" spec.md §5
 * describes, not a pipeline step. Cancellation is a polled `running` flag,
 * matching the design note against shared mutable queues across unrelated
 * modules.
 */

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use aegis_domain_models::{Event, EventPayload, PtzMode, PtzPriority, PtzRequest};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::MicConfig;
use crate::drivers::MicDriver;
use crate::event_bus::EventBus;
use crate::ptz_arbiter::PtzArbiter;

use super::{Module, ModuleStatus, ModuleStatusSnapshot, SharedData};

const SAMPLE_INTERVAL: Duration = Duration::from_millis(50); // ~20 Hz
const MIN_SAMPLES_FOR_ESTIMATE: usize = 5;

/// Quantizes a smoothed angle to the nearest 30-degree sector, per
/// spec.md §4.7 / §8: `floor((angle + 15) / 30) * 30 mod 360`.
pub fn quantize_sector(angle: f32) -> u16 {
    let sector = ((angle + 15.0) / 30.0).floor() * 30.0;
    (sector.rem_euclid(360.0)) as u16
}

/// Circular mean over a window of raw angles (degrees): returns
/// `(smoothed_angle_degrees, confidence in [0, 1])`.
pub fn circular_mean(angles_deg: &[f32]) -> (f32, f32) {
    let n = angles_deg.len() as f32;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let (sum_sin, sum_cos) = angles_deg.iter().fold((0.0f32, 0.0f32), |(s, c), &a| {
        let rad = a.to_radians();
        (s + rad.sin(), c + rad.cos())
    });
    let mean_sin = sum_sin / n;
    let mean_cos = sum_cos / n;
    let confidence = (mean_sin.powi(2) + mean_cos.powi(2)).sqrt().clamp(0.0, 1.0);
    let smooth_angle = mean_sin.atan2(mean_cos).to_degrees().rem_euclid(360.0);
    (smooth_angle, confidence)
}

struct LoopState {
    history: VecDeque<f32>,
    last_sector: Option<u16>,
}

/// Smooths DOA via circular mean, classifies zenith/side sectors, and
/// requests absolute camera moves when the sector changes.
pub struct MicArrayModule {
    config: MicConfig,
    driver: Option<Arc<dyn MicDriver>>,
    bus: Arc<EventBus>,
    arbiter: Arc<PtzArbiter>,
    running: Arc<AtomicBool>,
    loop_handle: StdMutex<Option<JoinHandle<()>>>,
    state: Arc<StdMutex<LoopState>>,
    status: ModuleStatus,
}

impl MicArrayModule {
    pub fn new(config: MicConfig, driver: Option<Arc<dyn MicDriver>>, bus: Arc<EventBus>, arbiter: Arc<PtzArbiter>) -> Self {
        Self {
            config,
            driver,
            bus,
            arbiter,
            running: Arc::new(AtomicBool::new(false)),
            loop_handle: StdMutex::new(None),
            state: Arc::new(StdMutex::new(LoopState {
                history: VecDeque::with_capacity(10),
                last_sector: None,
            })),
            status: ModuleStatus::new(),
        }
    }

    fn spawn_loop(&self) {
        let Some(driver) = self.driver.clone() else {
            return;
        };
        let running = Arc::clone(&self.running);
        let state = Arc::clone(&self.state);
        let bus = Arc::clone(&self.bus);
        let arbiter = Arc::clone(&self.arbiter);
        let config = self.config.clone();
        let history_size = config.history_size.max(MIN_SAMPLES_FOR_ESTIMATE);

        running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                if driver.read_speech_detected() {
                    let raw_angle = driver.read_doa() as f32;
                    let gain = driver.read_gain();

                    bus.publish(Event::new(
                        EventPayload::MicSpeechDetected { raw_angle, gain },
                        "mic_array",
                        0,
                    ))
                    .await;

                    let mut guard = state.lock().unwrap();
                    if guard.history.len() >= history_size {
                        guard.history.pop_front();
                    }
                    guard.history.push_back(raw_angle);

                    if guard.history.len() >= MIN_SAMPLES_FOR_ESTIMATE {
                        let samples: Vec<f32> = guard.history.iter().copied().collect();
                        let (smooth_angle, confidence) = circular_mean(&samples);
                        let last_sector = guard.last_sector;
                        drop(guard);

                        if confidence < config.zenith_confidence && gain < config.zenith_gain {
                            bus.publish(Event::new(
                                EventPayload::MicZenithDetected { confidence },
                                "mic_array",
                                0,
                            ))
                            .await;
                            let request = PtzRequest::new(
                                PtzMode::Absolute { pan_deg: 0.0, tilt_deg: -90.0, zoom: 0.0 },
                                "mic_array",
                                PtzPriority::MicDoa,
                            );
                            arbiter.request(request);
                        } else if confidence > config.confidence_threshold {
                            let sector = quantize_sector(smooth_angle);
                            if Some(sector) != last_sector {
                                state.lock().unwrap().last_sector = Some(sector);
                                bus.publish(Event::new(
                                    EventPayload::MicDoaDetected {
                                        sector_angle: sector,
                                        smooth_angle,
                                        confidence,
                                    },
                                    "mic_array",
                                    1,
                                ))
                                .await;
                                let request = PtzRequest::new(
                                    PtzMode::Absolute { pan_deg: sector as f32, tilt_deg: -15.0, zoom: 0.0 },
                                    "mic_array",
                                    PtzPriority::MicDoa,
                                );
                                arbiter.request(request);
                            }
                        }
                    }
                }

                tokio::time::sleep(SAMPLE_INTERVAL).await;
            }
        });

        *self.loop_handle.lock().unwrap() = Some(handle);
    }
}

impl Module for MicArrayModule {
    fn name(&self) -> &str {
        "mic_array"
    }

    fn initialize(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        async move {
            if self.driver.is_none() {
                anyhow::bail!("mic driver unavailable at init");
            }
            self.spawn_loop();
            self.status.mark_initialized(true);
            info!("mic array module started");
            Ok(())
        }
        .boxed()
    }

    fn process<'a>(&'a self, _shared: &'a SharedData) -> BoxFuture<'a, anyhow::Result<serde_json::Value>> {
        // This module runs its own loop; the pipeline step (if registered
        // at all) is a pure status probe.
        async move { Ok(json!({ "running": self.running.load(Ordering::SeqCst) })) }.boxed()
    }

    fn shutdown(&self) -> BoxFuture<'_, ()> {
        async move {
            self.running.store(false, Ordering::SeqCst);
            if let Some(handle) = self.loop_handle.lock().unwrap().take() {
                let _ = tokio::time::timeout(Duration::from_secs(3), handle).await;
            }
            self.status.mark_initialized(false);
            debug!("mic array module shut down");
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

    #[test]
    fn sector_quantization_is_idempotent_for_any_angle() {
        let mut angle = 0.0;
        while angle < 360.0 {
            let sector = quantize_sector(angle);
            assert_eq!(quantize_sector(sector as f32), sector);
            angle += 1.0;
        }
    }

    #[test]
    fn sector_rounds_to_nearest_multiple_of_thirty() {
        assert_eq!(quantize_sector(95.0), 90);
        assert_eq!(quantize_sector(14.0), 0);
        assert_eq!(quantize_sector(16.0), 30);
        assert_eq!(quantize_sector(359.0), 0);
    }

    #[test]
    fn circular_mean_of_uniform_spread_has_low_confidence() {
        let angles: Vec<f32> = (0..10).map(|i| i as f32 * 36.0).collect();
        let (_, confidence) = circular_mean(&angles);
        assert!(confidence < 0.1, "confidence was {confidence}");
    }

    #[test]
    fn circular_mean_of_tight_cluster_has_high_confidence() {
        let angles = vec![94.0, 95.0, 96.0, 95.0, 94.0];
        let (smooth, confidence) = circular_mean(&angles);
        assert!(confidence > 0.99, "confidence was {confidence}");
        assert!((smooth - 94.8).abs() < 1.0);
    }

    proptest::proptest! {
        #[test]
        fn sector_quantization_round_trip(angle in 0f32..360.0) {
            let once = quantize_sector(angle);
            let twice = quantize_sector(once as f32);
            proptest::prop_assert_eq!(once, twice);
        }
    }
}
