// [libs/shared/telemetry/src/lib.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN TELEMETRY BOOTSTRAP
 * CLASIFICACIÓN: SHARED INFRASTRUCTURE (ESTRATO L1)
 * RESPONSABILIDAD: INICIALIZACIÓN DE TRACING Y CAPTURA DE PÁNICOS
 *
 * Compact human-readable output in debug builds, flattened JSON in
 * release — the same split the rest of the corpus uses so log shipping
 * doesn't need two code paths.
 * =================================================================
 */

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global tracing subscriber for `service_name`. Safe to
/// call once per process; a second call is a logic error in the caller,
/// not something this function guards against (mirrors the rest of the
/// corpus, which treats double-init as a startup bug, not a runtime one).
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,{service_name}=debug")));

    let registry = tracing_subscriber::registry().with(filter);

    if cfg!(debug_assertions) {
        registry.with(fmt::layer().compact().with_target(true)).init();
    } else {
        registry.with(fmt::layer().json().with_target(true)).init();
    }

    install_panic_hook();
}

/// Routes thread panics through `tracing::error!` in addition to the
/// default stderr dump, so a panic in a detached module loop (mic array,
/// STT, PTZ dispatch) shows up in structured logs instead of only stderr.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!(
            target: "panic_monitor",
            "thread panicked: {}",
            panic_info
        );
        default_hook(panic_info);
    }));
}
