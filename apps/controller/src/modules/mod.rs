// [apps/controller/src/modules/mod.rs]
/*!
 * APARATO: MODULE CAPABILITY SET
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: CONTRATO MÍNIMO QUE EL ORQUESTADOR USA PARA TRATAR
 *                   CADA SENSOR/ANALIZADOR COMO UNA UNIDAD INTERCAMBIABLE
 *
 * `Module` is the one abstraction the orchestrator programs against —
 * it never downcasts to a concrete module type. Per-module configuration
 * is threaded through each module's own constructor (an explicit builder
 * struct), never through this trait's methods, matching the design note
 * against runtime keyword-argument dispatch.
 *
 * `process_count`/`error_count`/`enabled`/`initialized` bookkeeping is
 * ambient behavior every module needs regardless of which sensor it
 * wraps, so it lives here once as [`ModuleStatus`] rather than being
 * re-implemented per module.
 */

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::future::BoxFuture;

pub mod detection;
pub mod llm_analysis;
pub mod mic_array;
pub mod reporter;
pub mod stt;

/// Data threaded through one pipeline tick. Keyed loosely by module name
/// so each step can read what previous steps in the same tick produced
/// (mirrors the orchestrator's `shared_data`/results-dict in spec.md
/// §4.10) without every module needing to know every other module's type.
#[derive(Default)]
pub struct SharedData {
    pub frame: Option<aegis_domain_models::Frame>,
    pub results: std::collections::HashMap<String, serde_json::Value>,
}

impl SharedData {
    pub fn result_for(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.results.get(module_name)
    }
}

/// Ambient per-module bookkeeping: how many times `process` ran, how many
/// of those raised, and whether the module is currently enabled/initialized.
/// Grounded in the source system's `BaseModule` — see SPEC_FULL.md §F.
#[derive(Default)]
pub struct ModuleStatus {
    process_count: AtomicU64,
    error_count: AtomicU64,
    enabled: AtomicBool,
    initialized: AtomicBool,
}

impl ModuleStatus {
    pub fn new() -> Self {
        Self {
            process_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            enabled: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn mark_initialized(&self, ok: bool) {
        self.initialized.store(ok, Ordering::SeqCst);
        self.enabled.store(ok, Ordering::SeqCst);
    }

    pub fn record_process(&self, errored: bool) {
        self.process_count.fetch_add(1, Ordering::SeqCst);
        if errored {
            self.error_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ModuleStatusSnapshot {
        ModuleStatusSnapshot {
            process_count: self.process_count.load(Ordering::SeqCst),
            error_count: self.error_count.load(Ordering::SeqCst),
            enabled: self.is_enabled(),
            initialized: self.is_initialized(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleStatusSnapshot {
    pub process_count: u64,
    pub error_count: u64,
    pub enabled: bool,
    pub initialized: bool,
}

/// The capability set every sensor/analyzer module exposes to the
/// orchestrator. Methods return boxed futures rather than being `async
/// fn`s directly so the trait stays object-safe and modules can be held
/// as `Vec<Box<dyn Module>>` (spec.md §4.10's module registry).
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    /// Attempts to bring the module up. A failure here must not be fatal
    /// to the process — the orchestrator retains the module disabled
    /// (spec.md §7's "Startup-missing" class) and keeps running.
    fn initialize(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Runs one unit of work for this pipeline tick against `shared`,
    /// returning a JSON value to be inserted under this module's name in
    /// the tick's results. Never called directly by a pipeline's `run` —
    /// always through `safe_process` in `crate::orchestrator`.
    fn process<'a>(&'a self, shared: &'a SharedData) -> BoxFuture<'a, anyhow::Result<serde_json::Value>>;

    fn shutdown(&self) -> BoxFuture<'_, ()>;

    /// Optional event-bus callback hook; modules that only publish (and
    /// never react to other modules' events) leave this as a no-op.
    fn on_event(&self, _event: &aegis_domain_models::Event) {}

    fn status(&self) -> ModuleStatusSnapshot;
    fn enable(&self);
    fn disable(&self);
}
