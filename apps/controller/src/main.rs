// [apps/controller/src/main.rs]
/*!
 * APARATO: CONTROLLER ENTRY POINT
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L3)
 * RESPONSABILIDAD: PARSEO DE CLI, COMPOSICIÓN DEL KERNEL Y BUCLE PRINCIPAL
 *
 * Wires concrete (scripted/synthetic) driver implementations into the
 * modules this crate defines and runs the main pipeline loop. Real
 * hardware backends (RTSP/ONVIF cameras, a physical mic array, a model
 * weights file, an LLM vendor) are out of scope for this crate per
 * spec.md §1 — `camera.url = "test://..."` and the scripted drivers are
 * what a host application swaps out for real adapters.
 */

use std::sync::Arc;
use std::time::Duration;

use aegis_controller::config::ControllerConfig;
use aegis_controller::drivers::{
    FrameSource, LoggingPtzDriver, ScriptedLlmClient, ScriptedMicDriver, ScriptedObjectDetector,
    ScriptedSpeechRecognizer, SyntheticFrameSource,
};
use aegis_controller::event_bus::EventBus;
use aegis_controller::mailbox::PendingUtteranceSlot;
use aegis_controller::modules::detection::{DetectionModule, DetectionModuleConfig};
use aegis_controller::modules::llm_analysis::LlmAnalysisModule;
use aegis_controller::modules::mic_array::MicArrayModule;
use aegis_controller::modules::reporter::ReporterModule;
use aegis_controller::modules::stt::SttModule;
use aegis_controller::modules::Module;
use aegis_controller::orchestrator::Orchestrator;
use aegis_controller::ptz_arbiter::PtzArbiter;
use clap::Parser;
use tracing::{info, warn};

/// CLI surface per spec.md §6: `--config PATH` plus per-module disable
/// flags and a debug verbosity toggle. Config document parsing itself is
/// a host-application concern (spec.md §1's Non-goals), so `--config` is
/// accepted and logged but the tree underneath it is always
/// `ControllerConfig::default()` in this binary.
#[derive(Parser, Debug)]
#[command(
    name = "aegis-controller",
    version,
    about = "Multimodal surveillance controller: event bus, PTZ arbitration, perception fusion, situation analysis."
)]
struct Cli {
    /// Path to a host-supplied configuration document. Parsing it into a
    /// `ControllerConfig` is outside this crate's scope; when omitted,
    /// built-in defaults are used.
    #[arg(long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    #[arg(long)]
    no_mic: bool,

    #[arg(long)]
    no_stt: bool,

    #[arg(long)]
    no_llm: bool,

    #[arg(long)]
    no_yolo: bool,

    /// No GUI/dashboard ships with this crate (spec.md §1's Non-goals);
    /// accepted for CLI-surface parity and to suppress a future overlay.
    #[arg(long)]
    no_display: bool,

    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.debug && std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug");
    }
    aegis_shared_telemetry::init_tracing("aegis_controller");

    if let Some(path) = &cli.config {
        warn!(path = %path.display(), "--config document parsing is a host-application concern; using built-in defaults");
    }
    if cli.no_display {
        info!("--no-display: no GUI/dashboard ships with this binary, flag is a no-op");
    }

    let config = ControllerConfig::default();
    let bus = EventBus::new();
    let arbiter = Arc::new(PtzArbiter::new(Box::new(LoggingPtzDriver::new())));
    let mailbox = PendingUtteranceSlot::new();
    let orchestrator = Orchestrator::new(Arc::clone(&bus));

    if !cli.no_yolo {
        let detector_config = DetectionModuleConfig::from_controller_config(&config);
        let detector = Box::new(ScriptedObjectDetector::new(Vec::new()));
        let detection = Arc::new(DetectionModule::new(
            detector_config,
            detector,
            Arc::clone(&bus),
            Arc::clone(&arbiter),
        ));
        orchestrator.register(detection as Arc<dyn Module>).await;
    } else {
        info!("--no-yolo: detection module disabled");
    }

    if !cli.no_mic {
        let mic_driver: Arc<dyn aegis_controller::drivers::MicDriver> =
            Arc::new(ScriptedMicDriver::new(Vec::new()));
        let mic_array = Arc::new(MicArrayModule::new(
            config.mic.clone(),
            Some(mic_driver),
            Arc::clone(&bus),
            Arc::clone(&arbiter),
        ));
        orchestrator.register(mic_array as Arc<dyn Module>).await;
    } else {
        info!("--no-mic: mic array module disabled");
    }

    if !cli.no_stt {
        let recognizer: Arc<dyn aegis_controller::drivers::SpeechRecognizer> =
            Arc::new(ScriptedSpeechRecognizer::new(Vec::new()));
        let stt = Arc::new(SttModule::new(
            config.stt.clone(),
            Some(recognizer),
            Arc::clone(&bus),
            Arc::clone(&mailbox),
        ));
        orchestrator.register(stt as Arc<dyn Module>).await;
    } else {
        info!("--no-stt: speech-to-text module disabled");
    }

    if !cli.no_llm {
        let client: Arc<dyn aegis_controller::drivers::LlmClient> =
            Arc::new(ScriptedLlmClient::new(Vec::new()));
        let llm_analysis = Arc::new(LlmAnalysisModule::new(
            config.llm.clone(),
            Some(client),
            Arc::clone(&bus),
            Arc::clone(&mailbox),
        ));
        orchestrator.register(llm_analysis as Arc<dyn Module>).await;
    } else {
        info!("--no-llm: llm analysis module disabled");
    }

    let reporter = Arc::new(ReporterModule::new(config.reporter.clone()));
    orchestrator.register(reporter as Arc<dyn Module>).await;

    orchestrator.define_default_security_pipeline().await;

    let frame_source = match config.camera.url.as_str() {
        url if url.starts_with("test://") => SyntheticFrameSource::new(640, 480),
        other => {
            warn!(url = %other, "no real frame source backend is shipped by this crate, falling back to synthetic");
            SyntheticFrameSource::new(640, 480)
        }
    };
    Arc::clone(&frame_source).start();

    info!("controller running, press ctrl-c to stop");

    let mut frame_count: u64 = 0;
    let cadence = config.pipeline.process_every_n_frames.max(1) as u64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
        }

        frame_count += 1;
        if frame_count % cadence != 0 {
            continue;
        }

        let mut shared = aegis_controller::modules::SharedData::default();
        shared.frame = frame_source.latest();
        let _ = orchestrator.run(&config.pipeline.default_pipeline, &shared).await;
    }

    frame_source.release();
    orchestrator.shutdown_all().await;
    Ok(())
}
