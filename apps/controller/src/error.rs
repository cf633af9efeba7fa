// [apps/controller/src/error.rs]
/*!
 * APARATO: ERROR TAXONOMY
 * CLASIFICACIÓN: APPLICATION ROOT (ESTRATO L3)
 * RESPONSABILIDAD: DISTINGUIR ENTRE FALLOS FATALES Y FALLOS AISLABLES
 *
 * Only the truly fatal class gets a typed variant here: the process
 * cannot continue and must exit nonzero after an orderly shutdown
 * attempt. Everything else — startup-missing devices, transient I/O,
 * decode/parse failures, a module's own `process()` panicking a
 * `Result` — is caught and isolated at the boundary that owns it
 * (a module's retry loop, or the orchestrator's `safe_process`) and
 * never reaches this type.
 */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("event bus worker pool failed to start")]
    EventBusStartup,

    #[error("no usable frame source configured and no test source available")]
    NoFrameSource,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ControllerResult<T> = Result<T, ControllerError>;
