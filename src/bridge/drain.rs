//! The recurring drain task.
//!
//! Each run polls the endpoint once without blocking, dispatches at most one
//! message, sleeps for `idle_delay` if there was nothing to do, and then
//! schedules its own successor.  The loop ends by itself once the scheduler
//! stops accepting work.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::config::BridgeConfig;
use crate::scheduler::{ScheduleError, ScheduledTask, TaskScheduler};

use super::endpoint::BridgeEndpoint;
use super::message::{BridgeError, BridgeMessage, Command};

/// Name the drain task is scheduled under.
pub const DRAIN_TASK: &str = "bridge-drain";

/// Receiver of decoded commands.
pub trait CommandHandler: Send + Sync {
    fn handle_command(&self, command: &Command) -> anyhow::Result<()>;

    /// The request server announced its exit or the channel closed.
    /// Called at most once per bridge.
    fn server_exited(&self);
}

/// What a single drain pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Idle,
    Dispatched,
    Dropped,
    Closed,
}

struct Inner {
    endpoint: Mutex<BridgeEndpoint>,
    handler: Arc<dyn CommandHandler>,
    scheduler: TaskScheduler,
    idle_delay: Duration,
    exit_reported: AtomicBool,
    passes: AtomicU64,
}

#[derive(Clone)]
pub struct ProcessBridge {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ProcessBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessBridge")
            .field("idle_delay", &self.inner.idle_delay)
            .field("passes", &self.passes())
            .finish_non_exhaustive()
    }
}

impl ProcessBridge {
    pub fn new(
        endpoint: BridgeEndpoint,
        handler: Arc<dyn CommandHandler>,
        scheduler: TaskScheduler,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint: Mutex::new(endpoint),
                handler,
                scheduler,
                idle_delay: config.idle_delay(),
                exit_reported: AtomicBool::new(false),
                passes: AtomicU64::new(0),
            }),
        }
    }

    /// Submit the first drain task.
    pub fn start(&self) -> Result<(), ScheduleError> {
        self.inner
            .scheduler
            .schedule(drain_task(Arc::clone(&self.inner)))
    }

    /// Run one non-blocking drain pass.
    pub fn drain_once(&self) -> DrainOutcome {
        self.inner.drain_once()
    }

    /// Completed drain passes so far.
    pub fn passes(&self) -> u64 {
        self.inner.passes.load(Ordering::SeqCst)
    }
}

fn drain_task(inner: Arc<Inner>) -> ScheduledTask {
    ScheduledTask::new(DRAIN_TASK, async move {
        match inner.drain_once() {
            DrainOutcome::Idle | DrainOutcome::Closed => {
                tokio::time::sleep(inner.idle_delay).await
            }
            DrainOutcome::Dispatched | DrainOutcome::Dropped => {}
        }
        inner.passes.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = inner.scheduler.schedule(drain_task(Arc::clone(&inner))) {
            log::debug!("bridge: drain loop ended ({e})");
        }
        Ok(())
    })
}

impl Inner {
    fn drain_once(&self) -> DrainOutcome {
        let polled = self
            .endpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv();

        match polled {
            Ok(None) => DrainOutcome::Idle,
            Ok(Some(BridgeMessage::Command(command))) => {
                self.dispatch(&command);
                DrainOutcome::Dispatched
            }
            Ok(Some(BridgeMessage::ServerExited)) => {
                self.report_exit("server announced exit");
                DrainOutcome::Closed
            }
            Err(BridgeError::Closed) => {
                self.report_exit("channel closed");
                DrainOutcome::Closed
            }
            Err(BridgeError::Io(e)) => {
                log::error!("bridge: read failed: {e}");
                self.report_exit("channel failed");
                DrainOutcome::Closed
            }
            Err(e) => {
                log::error!("bridge: dropped message: {e}");
                DrainOutcome::Dropped
            }
        }
    }

    fn dispatch(&self, command: &Command) {
        log::debug!(
            "bridge: command for `{}` (reload: {})",
            command.module,
            command.reload
        );
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.handler.handle_command(command)));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("bridge: command for `{}` failed: {e:#}", command.module),
            Err(payload) => log::error!(
                "bridge: command handler panicked: {}",
                crate::panic_message(payload.as_ref())
            ),
        }
    }

    fn report_exit(&self, why: &str) {
        if !self.exit_reported.swap(true, Ordering::SeqCst) {
            log::info!("bridge: request server gone ({why})");
            self.handler.server_exited();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Instant;

    #[derive(Default)]
    struct RecordingHandler {
        commands: Mutex<Vec<Command>>,
        exits: std::sync::atomic::AtomicUsize,
        fail: bool,
    }

    impl CommandHandler for RecordingHandler {
        fn handle_command(&self, command: &Command) -> anyhow::Result<()> {
            self.commands.lock().unwrap().push(command.clone());
            if self.fail {
                anyhow::bail!("handler refused");
            }
            Ok(())
        }

        fn server_exited(&self) {
            self.exits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config() -> BridgeConfig {
        BridgeConfig { idle_delay_ms: 5 }
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn endpoint(input: Vec<u8>) -> BridgeEndpoint {
        BridgeEndpoint::from_streams(Cursor::new(input), std::io::sink())
    }

    #[test]
    fn malformed_input_is_dropped_and_the_loop_keeps_running() {
        let mut input = Vec::new();
        input.extend_from_slice(b"definitely not json\n");
        input.extend_from_slice(&[0xff, 0xfe, 0x00, b'\n']);
        input.extend_from_slice(b"{\"kind\":\"command\",\"module\":\"../../etc\"}\n");
        input.extend_from_slice(b"{\"kind\":\"launch_missiles\"}\n");
        input.extend_from_slice(b"{\"kind\":\"command\",\"module\":\"calendar\",\"reload\":true}\n");

        let scheduler = TaskScheduler::with_poll_interval(Duration::from_millis(20));
        scheduler.start().unwrap();
        let handler = Arc::new(RecordingHandler::default());
        let bridge = ProcessBridge::new(endpoint(input), handler.clone(), scheduler.clone(), &config());
        bridge.start().unwrap();

        assert!(wait_until(|| handler.commands.lock().unwrap().len() == 1));
        // Several passes after the bad lines, so the loop outlived them.
        assert!(wait_until(|| bridge.passes() >= 8));
        assert_eq!(
            *handler.commands.lock().unwrap(),
            vec![Command::reload("calendar")]
        );
        scheduler.stop();
    }

    #[test]
    fn end_of_stream_reports_server_exit_once() {
        let scheduler = TaskScheduler::with_poll_interval(Duration::from_millis(20));
        scheduler.start().unwrap();
        let handler = Arc::new(RecordingHandler::default());
        let bridge = ProcessBridge::new(
            endpoint(b"{\"kind\":\"server_exited\"}\n".to_vec()),
            handler.clone(),
            scheduler.clone(),
            &config(),
        );
        bridge.start().unwrap();

        assert!(wait_until(|| handler.exits.load(Ordering::SeqCst) == 1));
        let passes = bridge.passes();
        assert!(wait_until(|| bridge.passes() > passes + 3));
        assert_eq!(handler.exits.load(Ordering::SeqCst), 1);
        scheduler.stop();
    }

    #[test]
    fn handler_errors_do_not_stop_draining() {
        let input = concat!(
            "{\"kind\":\"command\",\"module\":\"media\",\"reload\":true}\n",
            "{\"kind\":\"command\",\"module\":\"utils\",\"reload\":true}\n",
        );
        let handler = Arc::new(RecordingHandler {
            fail: true,
            ..RecordingHandler::default()
        });
        let bridge = ProcessBridge::new(
            endpoint(input.as_bytes().to_vec()),
            handler.clone(),
            TaskScheduler::with_poll_interval(Duration::from_millis(20)),
            &config(),
        );

        assert!(wait_until(|| {
            bridge.drain_once();
            handler.commands.lock().unwrap().len() == 2
        }));
    }

    #[test]
    fn drain_once_is_idle_without_input() {
        let (_keep_open, rx) = std::sync::mpsc::channel::<u8>();
        struct Blocking(std::sync::mpsc::Receiver<u8>);
        impl std::io::Read for Blocking {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                match self.0.recv() {
                    Ok(b) => {
                        buf[0] = b;
                        Ok(1)
                    }
                    Err(_) => Ok(0),
                }
            }
        }

        let bridge = ProcessBridge::new(
            BridgeEndpoint::from_streams(Blocking(rx), std::io::sink()),
            Arc::new(RecordingHandler::default()),
            TaskScheduler::with_poll_interval(Duration::from_millis(20)),
            &config(),
        );
        assert_eq!(bridge.drain_once(), DrainOutcome::Idle);
    }

    #[test]
    fn stopped_scheduler_refuses_to_start_the_loop() {
        let bridge = ProcessBridge::new(
            endpoint(Vec::new()),
            Arc::new(RecordingHandler::default()),
            TaskScheduler::with_poll_interval(Duration::from_millis(20)),
            &config(),
        );
        assert!(bridge.start().is_err());
    }
}
