// [apps/controller/src/lib.rs]
/*!
 * APARATO: CONTROLLER LIBRARY ROOT
 * CLASIFICACIÓN: APPLICATION ROOT (ESTRATO L3)
 * RESPONSABILIDAD: SUPERFICIE PÚBLICA DEL CONTROLADOR DE VIGILANCIA
 *                   MULTIMODAL
 *
 * The binary (`main.rs`) is a thin composition root: it reads CLI flags,
 * wires concrete driver implementations into the modules declared here,
 * and runs the main loop. Everything with actual logic lives in this
 * library so it can be exercised directly from integration tests.
 */

pub mod config;
pub mod drivers;
pub mod error;
pub mod event_bus;
pub mod mailbox;
pub mod modules;
pub mod orchestrator;
pub mod ptz_arbiter;
pub mod reid;

pub use config::ControllerConfig;
pub use error::{ControllerError, ControllerResult};
pub use event_bus::EventBus;
pub use orchestrator::{Orchestrator, Pipeline, PipelineStep};
pub use ptz_arbiter::PtzArbiter;
