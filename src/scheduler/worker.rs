//! The serialising task scheduler.
//!
//! [`TaskScheduler`] owns one dedicated OS thread running a single-threaded
//! tokio runtime.  Tasks submitted from any thread go into an unbounded FIFO
//! channel; the worker pulls one, awaits it to completion, then pulls the
//! next, so two tasks never run at the same time.
//!
//! ```text
//! schedule() ──▶ mpsc (FIFO) ──▶ worker loop ── timeout(poll_interval, recv)
//!   any thread                     │   ├─ task    → spawn + await (errors/panics logged)
//!                                  │   ├─ elapsed → re-check shutdown flag
//!                                  │   └─ closed  → exit
//!                                  └─ on exit: drop queued tasks, close runtime
//! ```
//!
//! The bounded wait means shutdown is observed within one poll interval even
//! if the wake-up from `stop()` were missed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::SchedulerConfig;

use super::task::ScheduledTask;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The worker could not be started.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to build the scheduler runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to spawn the scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A task was rejected and dropped without running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("scheduler is not running; task `{0}` cancelled")]
    NotRunning(String),

    #[error("scheduler is shutting down; task `{0}` cancelled")]
    ShuttingDown(String),
}

// ---------------------------------------------------------------------------
// TaskScheduler
// ---------------------------------------------------------------------------

struct Worker {
    tx: mpsc::UnboundedSender<ScheduledTask>,
    shutdown: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

struct Inner {
    poll_interval: Duration,
    quiet_tasks: HashSet<String>,
    worker: Mutex<Option<Worker>>,
    /// Worker that stopped itself from inside a task and is still
    /// finishing it; joined by the next `start()`.
    detached: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn detached(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.detached.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the scheduler.  Clones share the same worker.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("poll_interval", &self.inner.poll_interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl TaskScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                poll_interval: config.poll_interval(),
                quiet_tasks: config.quiet_tasks.iter().cloned().collect(),
                worker: Mutex::new(None),
                detached: Mutex::new(None),
            }),
        }
    }

    /// A scheduler with the given poll interval and no quiet tasks.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self::new(&SchedulerConfig {
            poll_interval_ms: poll_interval.as_millis().max(1) as u64,
            quiet_tasks: Vec::new(),
        })
    }

    /// `true` between a successful [`start`](Self::start) and the next
    /// [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        self.inner.worker().is_some()
    }

    /// Launch the worker thread.  A no-op when already running.
    ///
    /// If the previous worker stopped itself from inside a task, this waits
    /// for that task to finish first, so old and new tasks never overlap.
    pub fn start(&self) -> Result<(), SchedulerError> {
        self.join_detached();
        let mut slot = self.inner.worker();
        if slot.is_some() {
            log::debug!("scheduler: already running, start() ignored");
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SchedulerError::Runtime)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let poll_interval = self.inner.poll_interval;

        let thread = {
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("task-scheduler".into())
                .spawn(move || run_worker(runtime, rx, shutdown, poll_interval))
                .map_err(SchedulerError::Spawn)?
        };

        *slot = Some(Worker {
            tx,
            shutdown,
            thread,
        });
        log::info!("scheduler: worker started");
        Ok(())
    }

    /// Enqueue `task` for execution after everything already accepted.
    ///
    /// Safe to call from any thread, including from inside a running task.
    /// When the scheduler is stopped or stopping the task is dropped
    /// unstarted and the rejection is both logged and returned.
    pub fn schedule(&self, task: ScheduledTask) -> Result<(), ScheduleError> {
        let slot = self.inner.worker();

        let Some(worker) = slot.as_ref() else {
            log::warn!(
                "scheduler: not running, cancelling `{}`",
                task.name()
            );
            return Err(ScheduleError::NotRunning(task.name().to_string()));
        };

        if worker.shutdown.load(Ordering::SeqCst) {
            log::warn!(
                "scheduler: shutting down, cancelling `{}`",
                task.name()
            );
            return Err(ScheduleError::ShuttingDown(task.name().to_string()));
        }

        if !self.inner.quiet_tasks.contains(task.name()) {
            log::info!("scheduler: scheduled `{}`", task.name());
        }

        worker.tx.send(task).map_err(|rejected| {
            let name = rejected.0.name().to_string();
            log::warn!("scheduler: worker gone, cancelling `{name}`");
            ScheduleError::ShuttingDown(name)
        })
    }

    /// Signal shutdown, let the in-flight task finish, drop queued tasks and
    /// join the worker.  A no-op when not running.
    ///
    /// Called from inside a scheduled task, the worker is signalled but not
    /// joined (it would be joining itself); it exits once that task returns.
    pub fn stop(&self) {
        let worker = self.inner.worker().take();
        let Some(Worker {
            tx,
            shutdown,
            thread,
        }) = worker
        else {
            return;
        };

        log::info!("scheduler: stopping worker");
        shutdown.store(true, Ordering::SeqCst);
        // Closing the channel wakes an idle worker immediately.
        drop(tx);

        if thread.thread().id() == std::thread::current().id() {
            log::warn!("scheduler: stop() called from a scheduled task; worker exits after it");
            *self.inner.detached() = Some(thread);
            return;
        }

        if thread.join().is_err() {
            log::error!("scheduler: worker thread panicked");
        }
        log::info!("scheduler: worker stopped");
    }
}

impl TaskScheduler {
    /// Join a worker left running by a self-stop.  Not called with the
    /// worker slot held: the old task may still be scheduling.
    fn join_detached(&self) {
        let Some(thread) = self.inner.detached().take() else {
            return;
        };
        if thread.thread().id() == std::thread::current().id() {
            // Restarted from the same task that stopped it; that task
            // finishes alongside the new worker.
            log::warn!("scheduler: restarted from inside its own stopping task");
            return;
        }
        log::debug!("scheduler: waiting for the previous worker to exit");
        if thread.join().is_err() {
            log::error!("scheduler: worker thread panicked");
        }
    }
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

fn run_worker(
    runtime: tokio::runtime::Runtime,
    mut rx: mpsc::UnboundedReceiver<ScheduledTask>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    log::debug!("scheduler: event loop started");

    runtime.block_on(async {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            match tokio::time::timeout(poll_interval, rx.recv()).await {
                Err(_elapsed) => continue,
                Ok(None) => break,
                Ok(Some(task)) => run_task(task).await,
            }
        }

        rx.close();
        let mut cancelled = 0usize;
        while let Ok(task) = rx.try_recv() {
            log::debug!("scheduler: cancelled `{}` at shutdown", task.name());
            cancelled += 1;
        }
        if cancelled > 0 {
            log::info!("scheduler: dropped {cancelled} pending task(s) at shutdown");
        }
    });

    // Anything a task spawned on its own is cancelled here.
    runtime.shutdown_timeout(poll_interval);
    log::debug!("scheduler: event loop closed");
}

async fn run_task(task: ScheduledTask) {
    let (name, future) = task.into_parts();
    log::debug!("scheduler: running `{name}`");

    match tokio::spawn(future).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::error!("scheduler: task `{name}` failed: {e:#}"),
        Err(e) if e.is_panic() => log::error!(
            "scheduler: task `{name}` panicked: {}",
            crate::panic_message(e.into_panic().as_ref())
        ),
        Err(_) => log::debug!("scheduler: task `{name}` cancelled"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
