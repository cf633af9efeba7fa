// [apps/controller/src/ptz_arbiter.rs]
/*!
 * APARATO: PTZ PRIORITY ARBITER
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: SERIALIZAR SOLICITUDES DE MOVIMIENTO POR PRIORIDAD Y
 *                   DUEÑO, DELEGANDO EL DESPACHO AL DRIVER
 *
 * The only genuine process-wide mutable state in this system lives here:
 * current owner, current priority, last accepted request time. The lock
 * that protects it is held only for the arbitration decision itself —
 * dispatch to the driver happens after the guard is dropped, so a slow
 * driver can never make a caller wait on the lock.
 */

use std::sync::Mutex;
use std::time::{Duration, Instant};

use aegis_domain_models::{PtzMode, PtzPriority, PtzRequest};
use tracing::info;

use crate::drivers::PtzDriver;

/// Minimum time since the last accepted request before a lower-priority
/// requester may still win — the "stale owner release" rule.
pub const STALE_OWNER_RELEASE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbitrationOutcome {
    Accepted,
    Rejected,
}

struct Ownership {
    priority: PtzPriority,
    owner: String,
    last_accepted_at: Instant,
}

impl Ownership {
    fn patrol_default(now: Instant) -> Self {
        Self {
            priority: PtzPriority::Patrol,
            owner: String::new(),
            last_accepted_at: now,
        }
    }
}

/// Accepts tagged move requests, serializes them against the current
/// owner/priority, and forwards winners to a [`crate::drivers::PtzDriver`].
pub struct PtzArbiter {
    state: Mutex<Ownership>,
    driver: Box<dyn PtzDriver>,
}

impl PtzArbiter {
    pub fn new(driver: Box<dyn PtzDriver>) -> Self {
        Self {
            state: Mutex::new(Ownership::patrol_default(Instant::now())),
            driver,
        }
    }

    /// Arbitration rule (evaluated atomically): accept `req` iff its
    /// priority is `>=` the current priority, or the stale-owner release
    /// window has elapsed since the last accepted request. On accept, the
    /// lock is released before dispatching to the driver.
    pub fn request(&self, req: PtzRequest) -> ArbitrationOutcome {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();

        let stale = now.duration_since(state.last_accepted_at) >= STALE_OWNER_RELEASE;
        if req.priority < state.priority && !stale {
            return ArbitrationOutcome::Rejected;
        }

        state.priority = req.priority;
        state.owner = req.owner.clone();
        state.last_accepted_at = now;
        drop(state);

        info!(owner = %req.owner, priority = ?req.priority, "ptz request accepted");
        self.dispatch(req.mode);
        ArbitrationOutcome::Accepted
    }

    /// Relinquishes ownership back to `Patrol` iff `owner` still holds it.
    pub fn release(&self, owner: &str) {
        let mut state = self.state.lock().unwrap();
        if state.owner == owner {
            *state = Ownership::patrol_default(Instant::now());
        }
    }

    /// Unconditionally halts motion and resets arbitration state.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap();
            *state = Ownership::patrol_default(Instant::now());
        }
        self.driver.stop();
    }

    pub fn current_owner(&self) -> String {
        self.state.lock().unwrap().owner.clone()
    }

    pub fn current_priority(&self) -> PtzPriority {
        self.state.lock().unwrap().priority
    }

    fn dispatch(&self, mode: PtzMode) {
        match mode {
            PtzMode::Continuous { pan, tilt, zoom } => self.driver.move_continuous(pan, tilt, zoom),
            PtzMode::Absolute { pan_deg, tilt_deg, zoom } => {
                self.driver.move_absolute(pan_deg, tilt_deg, zoom)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::LoggingPtzDriver;
    use std::thread;

    fn request(priority: PtzPriority, owner: &str) -> PtzRequest {
        PtzRequest::new(
            PtzMode::Continuous { pan: 0.1, tilt: 0.0, zoom: 0.0 },
            owner,
            priority,
        )
    }

    #[test]
    fn higher_priority_always_wins() {
        let arbiter = PtzArbiter::new(Box::new(LoggingPtzDriver::new()));
        assert_eq!(
            arbiter.request(request(PtzPriority::MicDoa, "mic")),
            ArbitrationOutcome::Accepted
        );
        assert_eq!(
            arbiter.request(request(PtzPriority::YoloTracking, "detection")),
            ArbitrationOutcome::Accepted
        );
        assert_eq!(
            arbiter.request(request(PtzPriority::MicDoa, "mic")),
            ArbitrationOutcome::Rejected
        );
    }

    #[test]
    fn stale_owner_release_lets_lower_priority_back_in() {
        let arbiter = PtzArbiter::new(Box::new(LoggingPtzDriver::new()));
        arbiter.request(request(PtzPriority::YoloTracking, "detection"));
        thread::sleep(STALE_OWNER_RELEASE + Duration::from_millis(50));
        assert_eq!(
            arbiter.request(request(PtzPriority::Patrol, "patrol")),
            ArbitrationOutcome::Accepted
        );
    }

    #[test]
    fn release_resets_only_when_owner_matches() {
        let arbiter = PtzArbiter::new(Box::new(LoggingPtzDriver::new()));
        arbiter.request(request(PtzPriority::YoloTracking, "detection"));
        arbiter.release("someone_else");
        assert_eq!(arbiter.current_owner(), "detection");
        arbiter.release("detection");
        assert_eq!(arbiter.current_priority(), PtzPriority::Patrol);
    }

    // Property: for any sequence of requests, an accepted request's
    // priority is >= the previously-held priority, or >= 2s have elapsed
    // since the previous acceptance.
    proptest::proptest! {
        #[test]
        fn arbitration_monotonicity(priorities in proptest::collection::vec(0u8..4, 1..50)) {
            let arbiter = PtzArbiter::new(Box::new(LoggingPtzDriver::new()));
            let mut last_accepted_priority: Option<u8> = None;
            for raw in priorities {
                let priority = match raw {
                    0 => PtzPriority::Patrol,
                    1 => PtzPriority::MicDoa,
                    2 => PtzPriority::YoloTracking,
                    _ => PtzPriority::Emergency,
                };
                let outcome = arbiter.request(request(priority, "probe"));
                if outcome == ArbitrationOutcome::Accepted {
                    if let Some(prev) = last_accepted_priority {
                        // Within this tight loop the stale window never
                        // elapses, so every acceptance must be >= previous.
                        proptest::prop_assert!(raw >= prev);
                    }
                    last_accepted_priority = Some(raw);
                }
            }
        }
    }
}
