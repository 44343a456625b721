//! Terminal render surface.
//!
//! Prints each interaction as a short transcript and blocks the main thread
//! in [`ConsoleSurface::run`] until stopped.  Closing or answering an
//! interaction publishes `interaction_finished`, which re-arms listening.

use std::io::Write;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::events::{Event, EventBus};

use super::RenderSurface;

pub struct ConsoleSurface {
    bus: EventBus,
    out: Mutex<Box<dyn Write + Send>>,
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl std::fmt::Debug for ConsoleSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSurface")
            .field("stopped", &*self.stopped_flag())
            .finish_non_exhaustive()
    }
}

impl ConsoleSurface {
    /// A surface printing to stdout.
    pub fn new(bus: EventBus) -> Self {
        Self::with_writer(bus, std::io::stdout())
    }

    pub fn with_writer(bus: EventBus, out: impl Write + Send + 'static) -> Self {
        Self {
            bus,
            out: Mutex::new(Box::new(out)),
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    fn line(&self, text: &str) -> anyhow::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{text}")?;
        out.flush()?;
        Ok(())
    }

    fn finish(&self) -> anyhow::Result<()> {
        self.bus.publish(Event::InteractionFinished)
    }

    fn stopped_flag(&self) -> MutexGuard<'_, bool> {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RenderSurface for ConsoleSurface {
    fn open_interaction(&self) -> anyhow::Result<()> {
        self.line("[ami] listening...")
    }

    fn close_interaction(&self) -> anyhow::Result<()> {
        self.line("[ami] (closed)")?;
        self.finish()
    }

    fn set_loading_message(&self, message: &str) -> anyhow::Result<()> {
        self.line(&format!("[ami] {message}..."))
    }

    fn set_human_message(&self, text: &str) -> anyhow::Result<()> {
        self.line(&format!("you: {text}"))
    }

    fn set_response(&self, text: &str) -> anyhow::Result<()> {
        self.line(&format!("ami: {text}"))?;
        self.finish()
    }

    fn reload_module(&self, module: &str) -> anyhow::Result<()> {
        self.line(&format!("[ami] reloaded {module}"))
    }

    fn run(&self) -> anyhow::Result<()> {
        let mut stopped = self.stopped_flag();
        while !*stopped {
            stopped = self
                .wake
                .wait(stopped)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    fn stop(&self) {
        *self.stopped_flag() = true;
        self.wake.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn surface() -> (ConsoleSurface, SharedBuf, Arc<AtomicUsize>) {
        let bus = EventBus::new();
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&finished);
        bus.subscribe(EventKind::InteractionFinished, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let buf = SharedBuf::default();
        (ConsoleSurface::with_writer(bus, buf.clone()), buf, finished)
    }

    #[test]
    fn answered_interaction_prints_and_finishes() {
        let (surface, buf, finished) = surface();
        surface.open_interaction().unwrap();
        surface.set_human_message("what time is it").unwrap();
        surface.set_loading_message("Thinking").unwrap();
        surface.set_response("It is noon").unwrap();

        assert_eq!(
            buf.text(),
            "[ami] listening...\nyou: what time is it\n[ami] Thinking...\nami: It is noon\n"
        );
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closing_finishes_the_interaction() {
        let (surface, buf, finished) = surface();
        surface.close_interaction().unwrap();
        assert!(buf.text().contains("closed"));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reload_is_announced_without_finishing() {
        let (surface, buf, finished) = surface();
        surface.reload_module("calendar").unwrap();
        assert_eq!(buf.text(), "[ami] reloaded calendar\n");
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn run_blocks_until_stopped() {
        let (surface, _buf, _) = surface();
        let surface = Arc::new(surface);
        let runner = {
            let surface = Arc::clone(&surface);
            std::thread::spawn(move || surface.run())
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!runner.is_finished());

        surface.stop();
        runner.join().unwrap().unwrap();
    }

    #[test]
    fn stop_before_run_returns_immediately() {
        let (surface, _buf, _) = surface();
        surface.stop();
        surface.run().unwrap();
    }
}
