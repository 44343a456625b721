//! The [`Orchestrator`]: owns every long-lived component and defines the
//! single startup and shutdown sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once, Weak};

use anyhow::Context;

use crate::bridge::{Command, CommandHandler, ProcessBridge};
use crate::config::{AppConfig, BridgeConfig};
use crate::events::{Event, EventBus, EventKind, RecorderOutcome};
use crate::listening::ListeningEngine;
use crate::registry::ModuleRegistry;
use crate::response::ResponseGenerator;
use crate::scheduler::{ScheduledTask, TaskScheduler};

use super::{RenderSurface, RequestServer};

/// Everything the orchestrator needs that `main` (or a test) builds.
///
/// `bus` must be the same bus the engine and the render surface publish
/// on.
pub struct Components {
    pub bus: EventBus,
    pub engine: ListeningEngine,
    pub render: Arc<dyn RenderSurface>,
    pub responder: Arc<dyn ResponseGenerator>,
    pub server: Option<Box<dyn RequestServer>>,
    pub registry: ModuleRegistry,
}

struct Inner {
    bus: EventBus,
    scheduler: TaskScheduler,
    engine: ListeningEngine,
    render: Arc<dyn RenderSurface>,
    responder: Arc<dyn ResponseGenerator>,
    server: Option<Box<dyn RequestServer>>,
    registry: ModuleRegistry,
    bridge: BridgeConfig,
    stopping: AtomicBool,
    shutdown: Once,
}

/// Cheap-to-clone handle; clones share one runtime.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("bus", &self.inner.bus)
            .field("registry", &self.inner.registry)
            .field("stopping", &self.inner.stopping.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Build the scheduler from `config` and wire the event subscriptions.
    pub fn new(config: &AppConfig, components: Components) -> Self {
        let Components {
            bus,
            engine,
            render,
            responder,
            server,
            registry,
        } = components;

        let inner = Arc::new(Inner {
            bus,
            scheduler: TaskScheduler::new(&config.scheduler),
            engine,
            render,
            responder,
            server,
            registry,
            bridge: config.bridge.clone(),
            stopping: AtomicBool::new(false),
            shutdown: Once::new(),
        });
        subscribe_all(&inner);
        Self { inner }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Start every component and block in the render surface's main loop.
    ///
    /// Returns once the surface stops (window closed, Ctrl-C, request server
    /// gone), after the full shutdown sequence has run.
    pub fn run(&self) -> anyhow::Result<()> {
        let result = self.start().and_then(|()| {
            log::info!("orchestrator: running");
            self.inner.render.run().context("render surface failed")
        });
        self.stop();
        result
    }

    fn start(&self) -> anyhow::Result<()> {
        let inner = &self.inner;

        let endpoint = match &inner.server {
            Some(server) => Some(server.start().context("failed to start request server")?),
            None => None,
        };

        inner
            .scheduler
            .start()
            .context("failed to start task scheduler")?;

        inner.engine.start_listening();

        if let Some(endpoint) = endpoint {
            let handler: Arc<dyn CommandHandler> = Arc::new(Commands {
                inner: Arc::downgrade(inner),
            });
            ProcessBridge::new(endpoint, handler, inner.scheduler.clone(), &inner.bridge)
                .start()
                .context("failed to start bridge drain task")?;
        }
        Ok(())
    }

    /// Shut everything down: request server, listening engine, render
    /// surface, scheduler.  Safe to call more than once and from any
    /// thread; a caller arriving while another thread is shutting down
    /// blocks until that shutdown has finished.
    ///
    /// Must not be called from a scheduled task: the scheduler joins its
    /// worker as the last step.
    pub fn stop(&self) {
        let inner = &self.inner;
        inner.shutdown.call_once(|| {
            inner.stopping.store(true, Ordering::SeqCst);
            log::info!("orchestrator: shutting down");

            if let Some(server) = &inner.server {
                server.stop();
            }
            inner.engine.shutdown();
            inner.render.stop();
            inner.scheduler.stop();

            log::info!("orchestrator: stopped");
        });
    }
}

// ---------------------------------------------------------------------------
// Event wiring
// ---------------------------------------------------------------------------

/// Listeners hold a weak handle so the bus (owned by `Inner`) does not keep
/// `Inner` alive.
fn subscribe_all(inner: &Arc<Inner>) {
    let bus = inner.bus.clone();

    let weak = Arc::downgrade(inner);
    bus.subscribe(EventKind::HotwordDetected, move |_| {
        with_inner(&weak, |inner| {
            let render = Arc::clone(&inner.render);
            inner.schedule(ScheduledTask::new("start_chat", async move {
                render.open_interaction()
            }))
        })
    });

    let weak = Arc::downgrade(inner);
    bus.subscribe(EventKind::RecorderCallback, move |event| {
        with_inner(&weak, |inner| match event {
            Event::RecorderCallback(RecorderOutcome::Transcript(text)) => {
                if text.trim().is_empty() {
                    log::info!("orchestrator: nothing was understood");
                    inner.schedule_close()
                } else {
                    inner.schedule(inner.human_to_ai(text.clone()))
                }
            }
            Event::RecorderCallback(RecorderOutcome::Cancelled) => {
                log::warn!("orchestrator: recording was cancelled before it finished");
                Ok(())
            }
            _ => Ok(()),
        })
    });

    let weak = Arc::downgrade(inner);
    bus.subscribe(EventKind::Timeout, move |_| {
        with_inner(&weak, |inner| {
            log::info!("orchestrator: listening timed out");
            inner.schedule_close()
        })
    });

    let weak = Arc::downgrade(inner);
    bus.subscribe(EventKind::LoadingMessage, move |event| {
        with_inner(&weak, |inner| match event {
            Event::LoadingMessage(message) => inner.render.set_loading_message(message),
            _ => Ok(()),
        })
    });

    let weak = Arc::downgrade(inner);
    bus.subscribe(EventKind::InteractionFinished, move |_| {
        with_inner(&weak, |inner| {
            if inner.stopping.load(Ordering::SeqCst) {
                log::debug!("orchestrator: shutting down, not re-arming");
            } else {
                inner.engine.start_listening();
            }
            Ok(())
        })
    });
}

fn with_inner(
    weak: &Weak<Inner>,
    f: impl FnOnce(&Inner) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    match weak.upgrade() {
        Some(inner) => f(&inner),
        None => Ok(()),
    }
}

impl Inner {
    fn schedule(&self, task: ScheduledTask) -> anyhow::Result<()> {
        let name = task.name().to_string();
        self.scheduler
            .schedule(task)
            .with_context(|| format!("could not schedule `{name}`"))
    }

    fn schedule_close(&self) -> anyhow::Result<()> {
        let render = Arc::clone(&self.render);
        self.schedule(ScheduledTask::new("close_interaction", async move {
            render.close_interaction()
        }))
    }

    /// Show the utterance, generate a reply and show it.  A failed reply
    /// closes the interaction instead.
    fn human_to_ai(&self, utterance: String) -> ScheduledTask {
        let render = Arc::clone(&self.render);
        let responder = Arc::clone(&self.responder);
        let bus = self.bus.clone();

        ScheduledTask::new("human_to_ai", async move {
            render.set_human_message(&utterance)?;

            let progress = move |message: &str| {
                if let Err(e) = bus.publish(Event::loading(message)) {
                    log::warn!("orchestrator: loading message dropped: {e:#}");
                }
            };

            match responder.respond(&utterance, &progress).await {
                Ok(reply) => render.set_response(&reply),
                Err(e) => {
                    log::error!("orchestrator: response generation failed: {e}");
                    render.close_interaction()
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Bridge commands
// ---------------------------------------------------------------------------

struct Commands {
    inner: Weak<Inner>,
}

impl CommandHandler for Commands {
    fn handle_command(&self, command: &Command) -> anyhow::Result<()> {
        let Some(inner) = self.inner.upgrade() else {
            return Ok(());
        };
        let Some(module) = inner.registry.get(&command.module) else {
            log::error!("orchestrator: invalid module `{}`", command.module);
            return Ok(());
        };
        if !command.reload {
            return Ok(());
        }

        module
            .reload()
            .with_context(|| format!("module `{}` failed to reload", module.name()))?;
        inner.render.reload_module(module.name())?;
        log::info!("orchestrator: reloaded `{}`", module.name());
        Ok(())
    }

    fn server_exited(&self) {
        if let Some(inner) = self.inner.upgrade() {
            log::info!("orchestrator: request server exited, closing");
            inner.render.stop();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
