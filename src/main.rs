//! Application entry point for the `ami` assistant runtime.
//!
//! # Startup sequence
//!
//! 1. Load [`AppConfig`] (defaults on first run) and initialise logging.
//! 2. Validate the configuration.
//! 3. Build the collaborators: microphone, wake-word detector, Whisper
//!    transcriber, chat responder, module registry, console surface and the
//!    optional request server.  A missing microphone or model is fatal.
//! 4. Install the Ctrl-C handler.
//! 5. [`Orchestrator::run`] blocks until the surface stops, then shuts
//!    everything down.

use std::sync::Arc;

use ami_runtime::{
    audio::Microphone,
    config::{AppConfig, AppPaths},
    events::EventBus,
    listening::{EnergyWakeDetector, ListeningEngine},
    orchestrator::{ChildProcessServer, Components, ConsoleSurface, Orchestrator, RequestServer},
    registry::ModuleRegistry,
    response::ChatResponder,
    stt::{TranscribeParams, WhisperTranscriber},
};
use anyhow::Context;

fn main() -> anyhow::Result<()> {
    // 1. Configuration + logging
    let loaded = AppConfig::load();
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".into());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    log::info!("ami runtime starting up");

    let mut config = loaded.unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e:#}); using defaults");
        AppConfig::default()
    });

    // 2. Validation
    config.validate().context("invalid settings")?;

    // Relative recording directories live under the data dir.
    let paths = AppPaths::new();
    if let Some(dir) = config.listening.recordings_dir.take() {
        let dir = if dir.is_relative() { paths.recordings_dir.join(dir) } else { dir };
        log::info!("Keeping recordings in {}", dir.display());
        config.listening.recordings_dir = Some(dir);
    }

    // 3. Collaborators
    let microphone = Microphone::new(&config.listening);
    let device = microphone.probe().context("no usable microphone")?;
    log::info!("Audio input: {device}");

    let model_path = paths.whisper_model(&config.stt.model);
    let transcriber = WhisperTranscriber::load(&model_path, TranscribeParams::from_config(&config.stt))
        .with_context(|| format!("cannot load whisper model {}", model_path.display()))?;

    let bus = EventBus::new();
    let engine = ListeningEngine::new(
        &config.listening,
        bus.clone(),
        Arc::new(microphone),
        Box::new(EnergyWakeDetector::new(&config.wake_word)),
        Arc::new(transcriber),
    );

    let server = config.server.enabled.then(|| {
        Box::new(ChildProcessServer::new(&config.server)) as Box<dyn RequestServer>
    });

    let orchestrator = Orchestrator::new(
        &config,
        Components {
            render: Arc::new(ConsoleSurface::new(bus.clone())),
            bus,
            engine,
            responder: Arc::new(ChatResponder::from_config(&config.responder)),
            server,
            registry: ModuleRegistry::with_builtins(&config.modules),
        },
    );

    // 4. Ctrl-C
    let on_signal = orchestrator.clone();
    ctrlc::set_handler(move || {
        log::info!("interrupt received");
        on_signal.stop();
    })
    .context("failed to install Ctrl-C handler")?;

    // 5. Run
    orchestrator.run()
}
