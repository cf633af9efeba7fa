// [apps/controller/src/mailbox.rs]
/*!
 * APARATO: PENDING UTTERANCE MAILBOX
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: ENTREGA DE UN ÚNICO SLOT ENTRE STT Y ANÁLISIS LLM
 *
 * Exactly the single-slot mailbox spec.md §5/§9 calls for in place of a
 * shared mutable queue: `SttModule` is the only writer, `LlmAnalysisModule`
 * the only reader, and a fresh utterance overwrites an unconsumed older
 * one rather than queuing behind it — stale text paired with a fresh frame
 * is worse than a dropped utterance.
 */

use std::sync::{Arc, Mutex};
use std::time::Duration;

use aegis_domain_models::SpeechUtterance;
use chrono::Utc;

/// Single-slot, destructively-consumed mailbox for the most recent STT
/// result. `take_if_fresh` both enforces the 30s pending-utterance expiry
/// from spec.md §4.9 step 3 and consumes the slot in the same operation,
/// so a caller never observes a stale utterance twice.
pub struct PendingUtteranceSlot {
    slot: Mutex<Option<SpeechUtterance>>,
}

impl PendingUtteranceSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { slot: Mutex::new(None) })
    }

    /// Overwrites whatever utterance (consumed or not) currently occupies
    /// the slot.
    pub fn publish(&self, utterance: SpeechUtterance) {
        *self.slot.lock().unwrap() = Some(utterance);
    }

    /// Returns and clears the slot's utterance iff it is younger than
    /// `ttl`. A stale utterance is discarded (not returned) rather than
    /// left for the next caller to also find stale.
    pub fn take_if_fresh(&self, ttl: Duration) -> Option<SpeechUtterance> {
        let mut guard = self.slot.lock().unwrap();
        let is_fresh = guard.as_ref().is_some_and(|utterance| {
            Utc::now()
                .signed_duration_since(utterance.recognized_at)
                .to_std()
                .map(|age| age <= ttl)
                .unwrap_or(false)
        });
        if is_fresh {
            guard.take()
        } else {
            guard.take();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn utterance(text: &str, age: ChronoDuration) -> SpeechUtterance {
        SpeechUtterance {
            text: text.to_string(),
            recognized_at: Utc::now() - age,
            duration_secs: 1.0,
            doa_angle: None,
        }
    }

    #[test]
    fn fresh_utterance_is_returned_once() {
        let slot = PendingUtteranceSlot::new();
        slot.publish(utterance("help", ChronoDuration::seconds(1)));
        assert!(slot.take_if_fresh(Duration::from_secs(30)).is_some());
        assert!(slot.take_if_fresh(Duration::from_secs(30)).is_none());
    }

    #[test]
    fn stale_utterance_is_discarded_not_returned() {
        let slot = PendingUtteranceSlot::new();
        slot.publish(utterance("old news", ChronoDuration::seconds(45)));
        assert!(slot.take_if_fresh(Duration::from_secs(30)).is_none());
    }

    #[test]
    fn fresh_publish_overwrites_unconsumed_older_one() {
        let slot = PendingUtteranceSlot::new();
        slot.publish(utterance("first", ChronoDuration::seconds(0)));
        slot.publish(utterance("second", ChronoDuration::seconds(0)));
        let utterance = slot.take_if_fresh(Duration::from_secs(30)).unwrap();
        assert_eq!(utterance.text, "second");
    }
}
