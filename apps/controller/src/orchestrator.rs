// [apps/controller/src/orchestrator.rs]
/*!
 * APARATO: MODULE ORCHESTRATOR (C10)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: REGISTRO DE MÓDULOS, PIPELINES NOMBRADOS Y
 *                   EJECUCIÓN ORDENADA+CONDICIONAL POR TICK
 *
 * Grounded in `core/orchestrator.py`'s `Orchestrator`: a name-keyed module
 * registry, named ordered pipelines of `{module, condition}` steps, and
 * `run_pipeline` that threads each step's accumulated results into the
 * next step's predicate. `safe_process` here is the boundary spec.md §7
 * names for "contract violation in a module's process()" — a module that
 * panics or returns `Err` yields `{"error": ...}` and the remaining steps
 * still run.
 */

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use aegis_domain_models::Priority;
use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::event_bus::EventBus;
use crate::modules::{Module, SharedData};

/// One pipeline step: the module to invoke, plus an optional predicate
/// over the results accumulated so far in this tick. A step whose
/// predicate returns `false` is skipped without calling the module.
pub struct PipelineStep {
    pub module_name: String,
    pub predicate: Option<Box<dyn Fn(&HashMap<String, Value>) -> bool + Send + Sync>>,
}

impl PipelineStep {
    pub fn unconditional(module_name: impl Into<String>) -> Self {
        Self { module_name: module_name.into(), predicate: None }
    }

    pub fn conditional<F>(module_name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&HashMap<String, Value>) -> bool + Send + Sync + 'static,
    {
        Self { module_name: module_name.into(), predicate: Some(Box::new(predicate)) }
    }
}

/// A named, ordered list of steps. `"security"` (detection, llm_analysis,
/// reporter, no predicates — each module decides internally whether to
/// act) is the default pipeline per spec.md §4.10.
pub struct Pipeline {
    pub name: String,
    pub steps: Vec<PipelineStep>,
}

/// Registers modules by name, defines named pipelines over them, and runs
/// a pipeline once per invocation (one "pipeline tick", not necessarily
/// one video frame — see GLOSSARY). Module execution order within a tick
/// is exactly the pipeline's step order (spec.md §5 ordering guarantee ii).
pub struct Orchestrator {
    bus: Arc<EventBus>,
    modules: RwLock<Vec<(String, Arc<dyn Module>)>>,
    pipelines: RwLock<HashMap<String, Pipeline>>,
    event_subscriptions: RwLock<Vec<u64>>,
}

impl Orchestrator {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            modules: RwLock::new(Vec::new()),
            pipelines: RwLock::new(HashMap::new()),
            event_subscriptions: RwLock::new(Vec::new()),
        }
    }

    /// Registers `module`, calling its `initialize()`. A failed
    /// initialization does not prevent registration — the module is kept
    /// disabled so the rest of the system still runs (spec.md §7's
    /// "Startup-missing" class is never fatal). Also wires the module's
    /// `on_event` as an event-bus callback over every topic; the bus holds
    /// only this closure (a callback handle), never a reference back into
    /// the orchestrator, per spec.md §9's cyclic-reference note.
    pub async fn register(&self, module: Arc<dyn Module>) {
        let name = module.name().to_string();
        match module.initialize().await {
            Ok(()) => info!(module = %name, "module registered and initialized"),
            Err(err) => {
                module.disable();
                warn!(module = %name, error = %err, "module failed to initialize, retained disabled");
            }
        }

        let callback_target = Arc::clone(&module);
        let subscription_id = self
            .bus
            .subscribe("*", move |event| callback_target.on_event(&event))
            .await;
        self.event_subscriptions.write().await.push(subscription_id);

        self.modules.write().await.push((name, module));
    }

    pub async fn module_status(&self) -> HashMap<String, crate::modules::ModuleStatusSnapshot> {
        self.modules
            .read()
            .await
            .iter()
            .map(|(name, module)| (name.clone(), module.status()))
            .collect()
    }

    /// Registers a named pipeline, replacing any existing definition under
    /// the same name.
    pub async fn define_pipeline(&self, pipeline: Pipeline) {
        let steps: Vec<&str> = pipeline.steps.iter().map(|s| s.module_name.as_str()).collect();
        info!(pipeline = %pipeline.name, steps = ?steps, "pipeline defined");
        self.pipelines.write().await.insert(pipeline.name.clone(), pipeline);
    }

    /// Convenience constructor for spec.md §4.10's default `"security"`
    /// pipeline: `[detection, llm_analysis, reporter]`, no predicates.
    pub async fn define_default_security_pipeline(&self) {
        self.define_pipeline(Pipeline {
            name: "security".to_string(),
            steps: vec![
                PipelineStep::unconditional("detection"),
                PipelineStep::unconditional("llm_analysis"),
                PipelineStep::unconditional("reporter"),
            ],
        })
        .await;
    }

    /// Invokes one module's `process()`, catching both a returned `Err`
    /// and a panic, and always producing a `Value` — never propagating a
    /// failure up to `run`. A disabled or unregistered module is skipped
    /// and yields nothing (mirrors the original's `is_ready` short-circuit
    /// to `{}` before `process()` is ever called).
    async fn safe_process(module: &Arc<dyn Module>, shared: &SharedData) -> Option<Value> {
        if !module.status().enabled {
            return None;
        }

        let outcome = AssertUnwindSafe(module.process(shared)).catch_unwind().await;
        match outcome {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                error!(module = module.name(), error = %err, "module process() returned an error");
                Some(json!({ "error": err.to_string() }))
            }
            Err(_panic) => {
                error!(module = module.name(), "module process() panicked");
                Some(json!({ "error": "module panicked" }))
            }
        }
    }

    /// Runs `pipeline_name` once against `shared`: iterates steps in
    /// order, evaluates each step's predicate (if any) against the
    /// results accumulated so far, and calls `safe_process` for steps
    /// that proceed. Unknown pipeline names return an empty result set.
    pub async fn run(&self, pipeline_name: &str, shared: &SharedData) -> HashMap<String, Value> {
        let pipelines = self.pipelines.read().await;
        let Some(pipeline) = pipelines.get(pipeline_name) else {
            error!(pipeline = %pipeline_name, "no such pipeline defined");
            return HashMap::new();
        };

        let modules = self.modules.read().await;
        let mut results: HashMap<String, Value> = HashMap::new();

        for step in &pipeline.steps {
            if let Some(predicate) = &step.predicate {
                if !predicate(&results) {
                    continue;
                }
            }

            let Some((_, module)) = modules.iter().find(|(name, _)| name == &step.module_name) else {
                continue;
            };

            if let Some(value) = Self::safe_process(module, shared).await {
                results.insert(step.module_name.clone(), value);
            }
        }

        results
    }

    /// Scans a tick's accumulated results for the highest-ranked
    /// `"priority"` field present, independent of which step produced it.
    /// Grounded in `core/orchestrator.py`'s `get_highest_priority` — see
    /// SPEC_FULL.md §F. Returns `None` if no result carries a recognized
    /// priority field (the original defaults to `"LOW"`; `None` lets the
    /// caller decide that default rather than baking it in here).
    pub fn highest_priority(results: &HashMap<String, Value>) -> Option<Priority> {
        fn find_priority(value: &Value) -> Option<Priority> {
            match value {
                Value::Object(map) => {
                    if let Some(found) = map.get("priority").and_then(priority_from_value) {
                        return Some(found);
                    }
                    map.values().find_map(find_priority)
                }
                Value::Array(items) => items.iter().find_map(find_priority),
                _ => None,
            }
        }

        fn priority_from_value(value: &Value) -> Option<Priority> {
            serde_json::from_value(value.clone()).ok()
        }

        results.values().filter_map(find_priority).max()
    }

    /// Shuts down every registered module in reverse registration order
    /// (spec.md §5's cancellation contract), then drains the event bus.
    pub async fn shutdown_all(&self) {
        info!("orchestrator shutdown starting");

        let subscriptions: Vec<u64> = self.event_subscriptions.write().await.drain(..).collect();
        for id in subscriptions {
            self.bus.unsubscribe(id).await;
        }

        let modules = self.modules.read().await;
        for (name, module) in modules.iter().rev() {
            module.shutdown().await;
            info!(module = %name, "module shut down");
        }
        drop(modules);

        self.bus.shutdown().await;
        info!("orchestrator shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::ModuleStatusSnapshot;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingModule {
        name: &'static str,
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    impl Module for CountingModule {
        fn name(&self) -> &str {
            self.name
        }

        fn initialize(&self) -> BoxFuture<'_, anyhow::Result<()>> {
            async move { Ok(()) }.boxed()
        }

        fn process<'a>(&'a self, _shared: &'a SharedData) -> BoxFuture<'a, anyhow::Result<Value>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    anyhow::bail!("boom");
                }
                Ok(json!({ "ran": self.name }))
            }
            .boxed()
        }

        fn shutdown(&self) -> BoxFuture<'_, ()> {
            async move {}.boxed()
        }

        fn status(&self) -> ModuleStatusSnapshot {
            ModuleStatusSnapshot { process_count: 0, error_count: 0, enabled: true, initialized: true }
        }

        fn enable(&self) {}
        fn disable(&self) {}
    }

    #[tokio::test]
    async fn pipeline_runs_steps_in_order_and_survives_a_failing_step() {
        let bus = EventBus::new();
        let orchestrator = Orchestrator::new(Arc::clone(&bus));

        let calls_a = Arc::new(AtomicU32::new(0));
        let calls_b = Arc::new(AtomicU32::new(0));
        orchestrator
            .register(Arc::new(CountingModule { name: "a", calls: Arc::clone(&calls_a), fail: true }))
            .await;
        orchestrator
            .register(Arc::new(CountingModule { name: "b", calls: Arc::clone(&calls_b), fail: false }))
            .await;

        orchestrator
            .define_pipeline(Pipeline {
                name: "test".to_string(),
                steps: vec![PipelineStep::unconditional("a"), PipelineStep::unconditional("b")],
            })
            .await;

        let shared = SharedData::default();
        let results = orchestrator.run("test", &shared).await;

        assert_eq!(calls_a.load(Ordering::SeqCst), 1);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
        assert!(results["a"].get("error").is_some());
        assert_eq!(results["b"]["ran"], "b");
    }

    #[tokio::test]
    async fn predicate_skips_step_without_calling_module() {
        let bus = EventBus::new();
        let orchestrator = Orchestrator::new(Arc::clone(&bus));
        let calls = Arc::new(AtomicU32::new(0));
        orchestrator
            .register(Arc::new(CountingModule { name: "gated", calls: Arc::clone(&calls), fail: false }))
            .await;

        orchestrator
            .define_pipeline(Pipeline {
                name: "test".to_string(),
                steps: vec![PipelineStep::conditional("gated", |_results| false)],
            })
            .await;

        let shared = SharedData::default();
        let results = orchestrator.run("test", &shared).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn unknown_pipeline_yields_empty_results() {
        let bus = EventBus::new();
        let orchestrator = Orchestrator::new(bus);
        let shared = SharedData::default();
        assert!(orchestrator.run("nonexistent", &shared).await.is_empty());
    }

    #[test]
    fn highest_priority_scans_nested_results_for_the_top_rank() {
        let mut results = HashMap::new();
        results.insert("detection".to_string(), json!({ "mode": "tracking" }));
        results.insert(
            "llm_analysis".to_string(),
            json!({ "status": "analyzed", "result": { "priority": "CRITICAL" } }),
        );
        assert_eq!(Orchestrator::highest_priority(&results), Some(Priority::Critical));
    }

    #[test]
    fn highest_priority_is_none_when_no_result_carries_one() {
        let mut results = HashMap::new();
        results.insert("detection".to_string(), json!({ "mode": "patrol" }));
        assert_eq!(Orchestrator::highest_priority(&results), None);
    }
}
