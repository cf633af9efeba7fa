// [apps/controller/src/config.rs]
/*!
 * APARATO: CONFIGURATION TREE
 * CLASIFICACIÓN: APPLICATION ROOT (ESTRATO L3)
 * RESPONSABILIDAD: ESTRUCTURA TIPADA DE CONFIGURACIÓN Y SUS VALORES
 *                   POR DEFECTO
 *
 * Parsing a document (TOML/JSON/env) into this tree is a host-application
 * concern, deliberately not shipped here. `ControllerConfig` is read-only
 * once the kernel is built — it is handed around as `Arc<ControllerConfig>`
 * and never mutated at runtime.
 */

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub camera: CameraConfig,
    pub ptz: PtzConfig,
    pub yolo: YoloConfig,
    pub mic: MicConfig,
    pub stt: SttConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub reporter: ReporterConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            ptz: PtzConfig::default(),
            yolo: YoloConfig::default(),
            mic: MicConfig::default(),
            stt: SttConfig::default(),
            llm: LlmConfig::default(),
            pipeline: PipelineConfig::default(),
            reporter: ReporterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// RTSP URL, webcam index, file path, or `test://` for a synthetic source.
    pub url: String,
    pub ip: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "test://synthetic".to_string(),
            ip: String::new(),
            port: 80,
            user: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtzControlMode {
    Continuous,
    Absolute,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PtzConfig {
    pub control_mode: PtzControlMode,
    pub pid_kp: f32,
    pub dead_zone_pixels: f32,
    pub patrol_speed: f32,
    pub patrol_return_delay_secs: f32,
}

impl Default for PtzConfig {
    fn default() -> Self {
        Self {
            control_mode: PtzControlMode::Both,
            pid_kp: 0.4,
            dead_zone_pixels: 50.0,
            patrol_speed: 0.2,
            patrol_return_delay_secs: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloConfig {
    pub model_path: String,
    pub confidence: f32,
    pub target_classes: Vec<String>,
    pub camera_fov_deg: f32,
    /// `None` disables DOA-fusion bonus entirely (the default); `Some(weight)`
    /// enables it at that weight. See SPEC_FULL.md §F for why this stays opt-in.
    pub doa_boost_weight: Option<f32>,
    pub doa_memory_secs: f32,
    pub reid_similarity_threshold: f32,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            confidence: 0.3,
            target_classes: vec!["person".to_string()],
            camera_fov_deg: 90.0,
            doa_boost_weight: Some(0.35),
            doa_memory_secs: 1.5,
            reid_similarity_threshold: 0.75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicConfig {
    pub agc_max_gain: f32,
    pub vad_threshold: f32,
    pub confidence_threshold: f32,
    pub zenith_confidence: f32,
    pub zenith_gain: f32,
    pub history_size: usize,
}

impl Default for MicConfig {
    fn default() -> Self {
        Self {
            agc_max_gain: 15.0,
            vad_threshold: 10.0,
            confidence_threshold: 0.6,
            zenith_confidence: 0.4,
            zenith_gain: 10.0,
            history_size: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    pub language: String,
    pub energy_threshold: u32,
    pub pause_threshold_secs: f32,
    pub phrase_time_limit_secs: f32,
    pub min_audio_duration_secs: f32,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            language: "ko-KR".to_string(),
            energy_threshold: 400,
            pause_threshold_secs: 3.0,
            phrase_time_limit_secs: 15.0,
            min_audio_duration_secs: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub analysis_cooldown_secs: f32,
    pub max_image_size: u32,
    pub jpeg_quality: u8,
    pub pending_utterance_ttl_secs: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            analysis_cooldown_secs: 5.0,
            max_image_size: 640,
            jpeg_quality: 75,
            pending_utterance_ttl_secs: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub default_pipeline: String,
    pub process_every_n_frames: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_pipeline: "security".to_string(),
            process_every_n_frames: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterConfig {
    pub url: String,
    pub timeout_secs: f32,
    pub cooldown_emergency_secs: f32,
    pub cooldown_analysis_secs: f32,
    pub cooldown_person_detected_secs: f32,
    pub cooldown_doa_secs: f32,
    pub cooldown_camera_move_secs: f32,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: 2.0,
            cooldown_emergency_secs: 0.0,
            cooldown_analysis_secs: 2.0,
            cooldown_person_detected_secs: 3.0,
            cooldown_doa_secs: 0.2,
            cooldown_camera_move_secs: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        let config = ControllerConfig::default();
        assert_eq!(config.ptz.pid_kp, 0.4);
        assert_eq!(config.ptz.dead_zone_pixels, 50.0);
        assert_eq!(config.mic.zenith_confidence, 0.4);
        assert_eq!(config.mic.zenith_gain, 10.0);
        assert_eq!(config.llm.analysis_cooldown_secs, 5.0);
        assert_eq!(config.pipeline.process_every_n_frames, 3);
        assert_eq!(config.reporter.cooldown_person_detected_secs, 3.0);
    }
}
