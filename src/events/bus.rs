//! Synchronous publish/subscribe dispatcher.
//!
//! [`EventBus::publish`] runs every listener registered for the event's kind
//! on the caller's thread, in registration order.  A listener that publishes
//! another event runs that dispatch nested inside its own call; nothing is
//! queued.  This keeps ordering obvious (the inner event is fully handled
//! before the outer publish continues) at the price of deeper stacks under
//! long publish chains.
//!
//! Listener errors are not swallowed: the first `Err` stops the dispatch and
//! is returned to the publisher, which decides what to do with it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::{Event, EventKind};

/// A registered callback.
pub type Listener = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

/// Cheap-to-clone handle to a shared subscriber table.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<EventKind, Vec<Listener>>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<&'static str, usize> =
            table.iter().map(|(k, v)| (k.name(), v.len())).collect();
        f.debug_struct("EventBus").field("subscribers", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `kind`.
    ///
    /// Registering the same callback twice is allowed; it then runs twice.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut table = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        table.entry(kind).or_default().push(Arc::new(listener));
        log::debug!("events: subscribed to `{kind}`");
    }

    /// Invoke every listener for `event.kind()` in registration order.
    ///
    /// A no-op when nothing is subscribed.  The subscriber list is copied
    /// out of the table before dispatch, so listeners may subscribe or
    /// publish without deadlocking.
    pub fn publish(&self, event: Event) -> anyhow::Result<()> {
        let listeners: Vec<Listener> = {
            let table = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match table.get(&event.kind()) {
                Some(list) => list.clone(),
                None => return Ok(()),
            }
        };

        for listener in &listeners {
            listener(&event)?;
        }
        Ok(())
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
