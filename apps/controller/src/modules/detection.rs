// [apps/controller/src/modules/detection.rs]
/*!
 * APARATO: DETECTION & TRACKING MODULE (C6)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: DETECCIÓN, RE-IDENTIFICACIÓN, PUNTUACIÓN DE PRIORIDAD,
 *                   MÁQUINA DE ESTADOS DE SEGUIMIENTO Y SOLICITUDES PTZ
 *
 * The heaviest module in the system: it owns the re-identification table,
 * scores every detection, drives the Patrol/Tracking/Searching state
 * machine, and is the primary requester against [`crate::ptz_arbiter`].
 */

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use aegis_domain_models::{
    BoundingBox, DetectedObject, DoaReading, Event, EventPayload, PtzMode, PtzPriority, PtzRequest,
    TrackState,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{ControllerConfig, PtzControlMode};
use crate::drivers::ObjectDetector;
use crate::event_bus::EventBus;
use crate::ptz_arbiter::PtzArbiter;
use crate::reid::{appearance_fingerprint, ReidTable};
use std::sync::Arc;

use super::{Module, ModuleStatus, ModuleStatusSnapshot, SharedData};

/// Per-module configuration, assembled once at construction from the
/// host's `ControllerConfig` — never mutated afterward, per spec.md §5.
pub struct DetectionModuleConfig {
    pub camera_fov_deg: f32,
    pub doa_boost_weight: Option<f32>,
    pub doa_memory_secs: f32,
    pub reid_similarity_threshold: f32,
    pub pid_kp: f32,
    pub dead_zone_pixels: f32,
    pub patrol_speed: f32,
    pub patrol_return_delay_secs: f32,
    pub control_mode: PtzControlMode,
}

impl DetectionModuleConfig {
    pub fn from_controller_config(config: &ControllerConfig) -> Self {
        Self {
            camera_fov_deg: config.yolo.camera_fov_deg,
            doa_boost_weight: config.yolo.doa_boost_weight,
            doa_memory_secs: config.yolo.doa_memory_secs,
            reid_similarity_threshold: config.yolo.reid_similarity_threshold,
            pid_kp: config.ptz.pid_kp,
            dead_zone_pixels: config.ptz.dead_zone_pixels,
            patrol_speed: config.ptz.patrol_speed,
            patrol_return_delay_secs: config.ptz.patrol_return_delay_secs,
            control_mode: config.ptz.control_mode,
        }
    }
}

/// `type_score` lookup from spec.md §4.6's priority formula.
fn class_type_score(class_name: &str) -> f32 {
    match class_name {
        "person" => 1.0,
        "car" | "motorcycle" => 0.5,
        "bus" | "truck" => 0.4,
        _ => 0.2,
    }
}

/// DOA alignment bonus for one object center, given the most recent DOA
/// reading (already checked against `doa_memory_secs` by the caller).
fn doa_alignment_bonus(
    object_cx: f32,
    frame_width: f32,
    camera_fov_deg: f32,
    doa: &DoaReading,
    boost_weight: f32,
) -> f32 {
    let half_fov = camera_fov_deg / 2.0;
    let object_angle = (object_cx / frame_width - 0.5) * camera_fov_deg;
    let mut angle_error = (doa.smooth_angle - object_angle + 180.0) % 360.0 - 180.0;
    if angle_error < -180.0 {
        angle_error += 360.0;
    }
    let alignment = (1.0 - angle_error.abs().min(half_fov) / half_fov).max(0.0);
    boost_weight * alignment
}

/// P-control velocities from a target center against the frame center,
/// clipped to `[-1, 1]` and zeroed inside the dead zone.
fn control_velocities(
    target: (f32, f32),
    frame_center: (f32, f32),
    kp: f32,
    dead_zone_pixels: f32,
) -> (f32, f32) {
    let error_x = target.0 - frame_center.0;
    let error_y = target.1 - frame_center.1;

    let pan = if error_x.abs() > dead_zone_pixels {
        (error_x / frame_center.0) * kp
    } else {
        0.0
    };
    let tilt = if error_y.abs() > dead_zone_pixels {
        -(error_y / frame_center.1) * kp
    } else {
        0.0
    };

    (pan.clamp(-1.0, 1.0), tilt.clamp(-1.0, 1.0))
}

/// Target center expressed as an absolute pose, using the same
/// center-relative-angle projection `doa_alignment_bonus` uses for DOA
/// fusion. Assumes a symmetric vertical FOV equal to the horizontal one,
/// since spec.md only documents one `camera_fov_deg` value.
fn absolute_pose(target: (f32, f32), frame_width: f32, frame_height: f32, camera_fov_deg: f32) -> (f32, f32) {
    let pan_deg = (target.0 / frame_width - 0.5) * camera_fov_deg;
    let tilt_deg = -(target.1 / frame_height - 0.5) * camera_fov_deg;
    (pan_deg.rem_euclid(360.0), tilt_deg.clamp(-90.0, 90.0))
}

/// Pure state-machine transition, isolated so it can be exercised directly
/// by the property tests in spec.md §8 without standing up a full module.
pub fn transition(
    current: &TrackState,
    objects: &[DetectedObject],
    now: DateTime<Utc>,
    patrol_return_delay: StdDuration,
) -> TrackState {
    let top = objects
        .iter()
        .max_by(|a, b| a.effective_priority().total_cmp(&b.effective_priority()));

    match (current, top) {
        (_, Some(top)) => {
            if let TrackState::Tracking { target_permanent_id, since } = current {
                if objects.iter().any(|o| o.permanent_id == *target_permanent_id) {
                    return TrackState::Tracking {
                        target_permanent_id: *target_permanent_id,
                        since: *since,
                    };
                }
            }
            TrackState::Tracking {
                target_permanent_id: top.permanent_id,
                since: now,
            }
        }
        (TrackState::Tracking { .. }, None) => TrackState::Searching { lost_at: now },
        (TrackState::Searching { lost_at }, None) => {
            let elapsed = now.signed_duration_since(*lost_at);
            if elapsed.to_std().unwrap_or_default() >= patrol_return_delay {
                TrackState::Patrol
            } else {
                current.clone()
            }
        }
        (TrackState::Patrol, None) => TrackState::Patrol,
    }
}

/// Detects objects, stabilizes identities, scores priorities, drives the
/// tracking state machine, and requests camera moves through the arbiter.
pub struct DetectionModule {
    config: DetectionModuleConfig,
    detector: Box<dyn ObjectDetector>,
    bus: Arc<EventBus>,
    arbiter: Arc<PtzArbiter>,
    reid: Mutex<ReidTable>,
    state: Mutex<TrackState>,
    latest_doa: Mutex<Option<DoaReading>>,
    status: ModuleStatus,
}

impl DetectionModule {
    pub fn new(
        config: DetectionModuleConfig,
        detector: Box<dyn ObjectDetector>,
        bus: Arc<EventBus>,
        arbiter: Arc<PtzArbiter>,
    ) -> Self {
        let threshold = config.reid_similarity_threshold;
        Self {
            config,
            detector,
            bus,
            arbiter,
            reid: Mutex::new(ReidTable::new(threshold)),
            state: Mutex::new(TrackState::Patrol),
            latest_doa: Mutex::new(None),
            status: ModuleStatus::new(),
        }
    }

    pub fn track_state(&self) -> TrackState {
        self.state.lock().unwrap().clone()
    }

    fn score_objects(&self, frame: &aegis_domain_models::Frame, raw: Vec<aegis_domain_models::RawDetection>) -> Vec<DetectedObject> {
        let frame_area = (frame.width as f32) * (frame.height as f32);
        let frame_center = frame.center();
        let max_dist = (frame_center.0.powi(2) + frame_center.1.powi(2)).sqrt();
        let now = Utc::now();
        let doa = self.latest_doa.lock().unwrap().clone();

        let mut reid = self.reid.lock().unwrap();
        let mut seen_trackers = HashSet::new();
        let mut objects = Vec::new();

        for detection in raw {
            let bbox: BoundingBox = match detection.bbox.clamp_to_frame(frame.width, frame.height) {
                Some(b) => b,
                None => continue,
            };
            let fingerprint = match appearance_fingerprint(frame, &bbox) {
                Some(fp) => fp,
                None => continue,
            };

            seen_trackers.insert(detection.tracker_id);
            let permanent_id = reid.resolve(detection.tracker_id, fingerprint, now);

            let (cx, cy) = bbox.center();
            let area_fraction = bbox.area() as f32 / frame_area;
            let dist_to_center = ((cx - frame_center.0).powi(2) + (cy - frame_center.1).powi(2)).sqrt();
            let type_score = class_type_score(&detection.class_name);

            let base_score =
                0.6 * type_score + 0.3 * area_fraction + 0.1 * (1.0 - dist_to_center / max_dist);

            let doa_bonus = match (&doa, self.config.doa_boost_weight) {
                (Some(doa), Some(weight)) => {
                    let age = now.signed_duration_since(doa.captured_at);
                    let within_memory = age
                        .to_std()
                        .map(|d| d.as_secs_f32() <= self.config.doa_memory_secs)
                        .unwrap_or(false);
                    if within_memory {
                        Some(doa_alignment_bonus(
                            cx,
                            frame.width as f32,
                            self.config.camera_fov_deg,
                            doa,
                            weight,
                        ))
                    } else {
                        None
                    }
                }
                _ => None,
            };

            objects.push(DetectedObject {
                tracker_id: detection.tracker_id,
                permanent_id,
                class_id: detection.class_id,
                class_name: detection.class_name.clone(),
                display_name: reid.display_name(permanent_id),
                bbox,
                priority_score: base_score,
                doa_bonus,
            });
        }

        reid.evict_stale_trackers(&seen_trackers);
        objects
    }

    fn drive_ptz(&self, frame: &aegis_domain_models::Frame, state: &TrackState, objects: &[DetectedObject]) {
        match state {
            TrackState::Tracking { target_permanent_id, .. } => {
                let Some(target) = objects.iter().find(|o| o.permanent_id == *target_permanent_id) else {
                    return;
                };

                if matches!(self.config.control_mode, PtzControlMode::Continuous | PtzControlMode::Both) {
                    let (pan, tilt) = control_velocities(
                        target.center(),
                        frame.center(),
                        self.config.pid_kp,
                        self.config.dead_zone_pixels,
                    );
                    self.arbiter.request(PtzRequest::new(
                        PtzMode::Continuous { pan, tilt, zoom: 0.0 },
                        "detection",
                        PtzPriority::YoloTracking,
                    ));
                }

                if matches!(self.config.control_mode, PtzControlMode::Absolute | PtzControlMode::Both) {
                    let (pan_deg, tilt_deg) = absolute_pose(
                        target.center(),
                        frame.width as f32,
                        frame.height as f32,
                        self.config.camera_fov_deg,
                    );
                    self.arbiter.request(PtzRequest::new(
                        PtzMode::Absolute { pan_deg, tilt_deg, zoom: 0.0 },
                        "detection",
                        PtzPriority::YoloTracking,
                    ));
                }
            }
            TrackState::Searching { .. } => {
                self.arbiter.stop();
            }
            TrackState::Patrol => {
                let request = PtzRequest::new(
                    PtzMode::Continuous { pan: self.config.patrol_speed, tilt: 0.0, zoom: 0.0 },
                    "detection",
                    PtzPriority::Patrol,
                );
                self.arbiter.request(request);
            }
        }
    }

    async fn publish_detection_events(&self, mode: &str, objects: &[DetectedObject]) {
        if objects.is_empty() {
            self.bus
                .publish(Event::new(
                    EventPayload::YoloNoObjects { mode: mode.to_string() },
                    "detection",
                    0,
                ))
                .await;
            return;
        }

        self.bus
            .publish(Event::new(
                EventPayload::YoloObjectsDetected {
                    objects: objects.to_vec(),
                    count: objects.len(),
                    mode: mode.to_string(),
                },
                "detection",
                0,
            ))
            .await;

        let persons: Vec<DetectedObject> = objects
            .iter()
            .filter(|o| o.class_name == "person")
            .cloned()
            .collect();
        if !persons.is_empty() {
            let target = persons
                .iter()
                .max_by(|a, b| a.effective_priority().total_cmp(&b.effective_priority()))
                .cloned();
            self.bus
                .publish(Event::new(
                    EventPayload::YoloPersonDetected {
                        count: persons.len(),
                        objects: persons,
                        target,
                    },
                    "detection",
                    1,
                ))
                .await;
        }
    }
}

impl Module for DetectionModule {
    fn name(&self) -> &str {
        "detection"
    }

    fn initialize(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        async move {
            self.status.mark_initialized(true);
            Ok(())
        }
        .boxed()
    }

    fn process<'a>(&'a self, shared: &'a SharedData) -> BoxFuture<'a, anyhow::Result<serde_json::Value>> {
        async move {
            let Some(frame) = shared.frame.clone() else {
                return Ok(json!({"mode": "no_frame"}));
            };

            let raw = match self.detector.detect(&frame) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(error = %err, "detector failed, retaining previous track state");
                    self.status.record_process(true);
                    return Ok(json!({"error": err.to_string()}));
                }
            };

            let objects = self.score_objects(&frame, raw);

            let mut state = self.state.lock().unwrap();
            let next = transition(
                &state,
                &objects,
                Utc::now(),
                StdDuration::from_secs_f32(self.config.patrol_return_delay_secs),
            );
            *state = next.clone();
            drop(state);

            self.drive_ptz(&frame, &next, &objects);

            let mode = match &next {
                TrackState::Tracking { .. } => "tracking",
                TrackState::Searching { .. } => "searching",
                TrackState::Patrol => "patrol",
            };
            self.publish_detection_events(mode, &objects).await;

            self.status.record_process(false);
            let person_detected = objects.iter().any(|o| o.class_name == "person");
            Ok(json!({
                "mode": mode,
                "count": objects.len(),
                "person_detected": person_detected,
            }))
        }
        .boxed()
    }

    fn shutdown(&self) -> BoxFuture<'_, ()> {
        async move {
            self.status.mark_initialized(false);
            debug!("detection module shut down");
        }
        .boxed()
    }

    fn on_event(&self, event: &Event) {
        if let EventPayload::MicDoaDetected { sector_angle: _, smooth_angle, confidence } = &event.payload {
            *self.latest_doa.lock().unwrap() = Some(DoaReading {
                raw_angle: *smooth_angle,
                smooth_angle: *smooth_angle,
                confidence: *confidence,
                gain: 0.0,
                sector: 0,
                captured_at: event.timestamp,
            });
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

    fn object_at(permanent_id: u64, priority: f32) -> DetectedObject {
        DetectedObject {
            tracker_id: permanent_id,
            permanent_id,
            class_id: 0,
            class_name: "person".to_string(),
            display_name: format!("Person {permanent_id}"),
            bbox: BoundingBox { x1: 0, y1: 0, x2: 10, y2: 10 },
            priority_score: priority,
            doa_bonus: None,
        }
    }

    #[test]
    fn patrol_moves_to_tracking_when_objects_appear() {
        let now = Utc::now();
        let next = transition(&TrackState::Patrol, &[object_at(1, 0.9)], now, StdDuration::from_secs(3));
        assert_eq!(next, TrackState::Tracking { target_permanent_id: 1, since: now });
    }

    #[test]
    fn tracking_with_no_objects_goes_to_searching() {
        let now = Utc::now();
        let current = TrackState::Tracking { target_permanent_id: 1, since: now };
        let next = transition(&current, &[], now, StdDuration::from_secs(3));
        assert_eq!(next, TrackState::Searching { lost_at: now });
    }

    #[test]
    fn searching_returns_to_patrol_after_delay() {
        let lost_at = Utc::now() - chrono::Duration::seconds(4);
        let current = TrackState::Searching { lost_at };
        let next = transition(&current, &[], Utc::now(), StdDuration::from_secs(3));
        assert_eq!(next, TrackState::Patrol);
    }

    #[test]
    fn searching_stays_searching_before_delay_elapses() {
        let lost_at = Utc::now() - chrono::Duration::seconds(1);
        let current = TrackState::Searching { lost_at };
        let next = transition(&current, &[], Utc::now(), StdDuration::from_secs(3));
        assert_eq!(next, current);
    }

    #[test]
    fn tracking_retargets_to_top_object_when_target_lost_but_others_present() {
        let now = Utc::now();
        let current = TrackState::Tracking { target_permanent_id: 1, since: now };
        let next = transition(&current, &[object_at(2, 0.5)], now, StdDuration::from_secs(3));
        assert_eq!(next, TrackState::Tracking { target_permanent_id: 2, since: now });
    }

    #[test]
    fn control_law_matches_off_center_scenario() {
        let (pan, tilt) = control_velocities((500.0, 240.0), (320.0, 240.0), 0.4, 50.0);
        assert!((pan - 0.225).abs() < 1e-4);
        assert_eq!(tilt, 0.0);
    }

    #[test]
    fn control_law_is_zero_when_centered() {
        let (pan, tilt) = control_velocities((320.0, 240.0), (320.0, 240.0), 0.4, 50.0);
        assert_eq!(pan, 0.0);
        assert_eq!(tilt, 0.0);
    }

    #[test]
    fn control_law_respects_dead_zone() {
        let (pan, tilt) = control_velocities((340.0, 240.0), (320.0, 240.0), 0.4, 50.0);
        assert_eq!(pan, 0.0);
        assert_eq!(tilt, 0.0);
    }

    #[test]
    fn absolute_pose_is_zero_when_target_is_centered() {
        let (pan_deg, tilt_deg) = absolute_pose((320.0, 240.0), 640.0, 480.0, 90.0);
        assert!((pan_deg - 0.0).abs() < 1e-4 || (pan_deg - 360.0).abs() < 1e-4);
        assert!((tilt_deg - 0.0).abs() < 1e-4);
    }

    #[test]
    fn absolute_pose_wraps_pan_into_0_360() {
        let (pan_deg, _) = absolute_pose((0.0, 240.0), 640.0, 480.0, 90.0);
        assert!((0.0..360.0).contains(&pan_deg));
    }
}
