// [apps/controller/src/drivers/ptz_driver.rs]
/*!
 * APARATO: PTZ DRIVER CONTRACT
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTERS (ESTRATO L6)
 * RESPONSABILIDAD: EJECUCIÓN FIRE-AND-FORGET DE COMANDOS DE MOVIMIENTO
 *
 * Wire protocols (ONVIF ContinuousMove, vendor HTTP absolute-move) are out
 * of scope here — a real implementor speaks whichever protocol the camera
 * wants. What this trait fixes is the shape every such implementor must
 * present to [`crate::ptz_arbiter::PtzArbiter`]: fire-and-forget methods
 * that return immediately and serialize their own outgoing commands.
 */

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A single outgoing move command, queued for serialized dispatch.
#[derive(Debug, Clone)]
pub enum PtzCommand {
    Continuous { pan: f32, tilt: f32, zoom: f32 },
    Absolute { pan_deg: f32, tilt_deg: f32, zoom: f32 },
    Stop,
}

/// Low-level camera command surface. Every method is fire-and-forget: it
/// enqueues the command on the driver's own dispatch worker and returns
/// immediately. Command errors are logged, never propagated — the next
/// command supersedes whatever failed before it.
pub trait PtzDriver: Send + Sync {
    fn move_continuous(&self, pan: f32, tilt: f32, zoom: f32);
    fn move_absolute(&self, pan_deg: f32, tilt_deg: f32, zoom: f32);
    fn stop(&self);
}

/// A concrete driver that serializes commands onto a single dispatch task
/// and logs each one instead of speaking to real hardware. Stands in for
/// an ONVIF or vendor-HTTP backend during local development and tests;
/// internally serializes outgoing commands per the contract above.
pub struct LoggingPtzDriver {
    sender: mpsc::UnboundedSender<PtzCommand>,
    last_command: Arc<Mutex<VecDeque<PtzCommand>>>,
}

impl LoggingPtzDriver {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PtzCommand>();
        let history = Arc::new(Mutex::new(VecDeque::with_capacity(16)));
        let history_writer = Arc::clone(&history);

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                debug!(?command, "ptz command dispatched");
                let mut log = history_writer.lock().unwrap();
                if log.len() >= 16 {
                    log.pop_front();
                }
                log.push_back(command);
            }
        });

        Self {
            sender: tx,
            last_command: history,
        }
    }

    /// Test/introspection hook: the most recent command handed to the
    /// dispatch worker, if any has landed yet.
    pub fn last_dispatched(&self) -> Option<PtzCommand> {
        self.last_command.lock().unwrap().back().cloned()
    }

    fn enqueue(&self, command: PtzCommand) {
        if self.sender.send(command).is_err() {
            warn!("ptz dispatch worker gone, command dropped");
        }
    }
}

impl Default for LoggingPtzDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl PtzDriver for LoggingPtzDriver {
    fn move_continuous(&self, pan: f32, tilt: f32, zoom: f32) {
        self.enqueue(PtzCommand::Continuous { pan, tilt, zoom });
    }

    fn move_absolute(&self, pan_deg: f32, tilt_deg: f32, zoom: f32) {
        self.enqueue(PtzCommand::Absolute { pan_deg, tilt_deg, zoom });
    }

    fn stop(&self) {
        self.enqueue(PtzCommand::Stop);
    }
}
