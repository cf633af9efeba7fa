// [libs/domain-models/src/event.rs]
/*!
 * APARATO: EVENT CONTRACT
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: UNIÓN DISCRIMINADA DE TODAS LAS SEÑALES QUE CRUZAN
 *                   EL BUS DE EVENTOS, MÁS EL SOBRE (ENVELOPE) COMÚN
 *
 * Every topic's payload schema is frozen here as a tagged enum variant.
 * A handler that receives an `Event` and finds its topic's payload variant
 * does not match must treat that as a contract violation, not attempt to
 * coerce it — see `apps/controller::error`.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{Priority, Urgency};
use crate::detection::DetectedObject;

/// Sovereign payload union for every topic this system publishes. The
/// `#[serde(tag = "kind")]` discriminant lets a reporter or dashboard
/// deserialize an envelope without knowing the topic string in advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventPayload {
    #[serde(rename = "mic.doa_detected")]
    MicDoaDetected {
        sector_angle: u16,
        smooth_angle: f32,
        confidence: f32,
    },
    #[serde(rename = "mic.zenith_detected")]
    MicZenithDetected { confidence: f32 },
    #[serde(rename = "mic.speech_detected")]
    MicSpeechDetected { raw_angle: f32, gain: f32 },
    #[serde(rename = "yolo.objects_detected")]
    YoloObjectsDetected {
        objects: Vec<DetectedObject>,
        count: usize,
        mode: String,
    },
    #[serde(rename = "yolo.person_detected")]
    YoloPersonDetected {
        objects: Vec<DetectedObject>,
        count: usize,
        target: Option<DetectedObject>,
    },
    #[serde(rename = "yolo.no_objects")]
    YoloNoObjects { mode: String },
    #[serde(rename = "stt.text_recognized")]
    SttTextRecognized {
        text: String,
        timestamp: DateTime<Utc>,
        duration: f32,
        doa_angle: Option<u16>,
    },
    #[serde(rename = "stt.listening_started")]
    SttListeningStarted,
    #[serde(rename = "stt.listening_stopped")]
    SttListeningStopped,
    #[serde(rename = "llm.analysis_complete")]
    LlmAnalysisComplete {
        priority: Priority,
        is_emergency: bool,
        situation_type: String,
        urgency: Urgency,
        summary: String,
        speech_text: String,
    },
    #[serde(rename = "llm.emergency")]
    LlmEmergency {
        urgency: Urgency,
        situation: String,
        reason: String,
    },
}

impl EventPayload {
    /// The dotted topic string this payload is published under. Kept in
    /// sync with the `#[serde(rename = "...")]` discriminant by hand since
    /// serde does not expose the tag value at runtime.
    pub fn topic(&self) -> &'static str {
        match self {
            EventPayload::MicDoaDetected { .. } => "mic.doa_detected",
            EventPayload::MicZenithDetected { .. } => "mic.zenith_detected",
            EventPayload::MicSpeechDetected { .. } => "mic.speech_detected",
            EventPayload::YoloObjectsDetected { .. } => "yolo.objects_detected",
            EventPayload::YoloPersonDetected { .. } => "yolo.person_detected",
            EventPayload::YoloNoObjects { .. } => "yolo.no_objects",
            EventPayload::SttTextRecognized { .. } => "stt.text_recognized",
            EventPayload::SttListeningStarted => "stt.listening_started",
            EventPayload::SttListeningStopped => "stt.listening_stopped",
            EventPayload::LlmAnalysisComplete { .. } => "llm.analysis_complete",
            EventPayload::LlmEmergency { .. } => "llm.emergency",
        }
    }
}

/// The envelope every publish on the event bus carries: topic, payload,
/// provenance, priority, and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub topic: String,
    pub payload: EventPayload,
    pub source: String,
    /// 0 = normal, 1 = high, 2 = emergency.
    pub priority: u8,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(payload: EventPayload, source: impl Into<String>, priority: u8) -> Self {
        Self {
            topic: payload.topic().to_string(),
            payload,
            source: source.into(),
            priority,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_tracks_payload_variant() {
        let event = Event::new(
            EventPayload::MicZenithDetected { confidence: 0.2 },
            "mic_array",
            0,
        );
        assert_eq!(event.topic, "mic.zenith_detected");
    }

    #[test]
    fn serde_round_trips_through_json() {
        let event = Event::new(
            EventPayload::MicDoaDetected {
                sector_angle: 90,
                smooth_angle: 95.0,
                confidence: 0.8,
            },
            "mic_array",
            1,
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.topic, "mic.doa_detected");
    }
}
