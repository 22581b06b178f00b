//! Typed event bus
//!
//! Listeners subscribe per [`CacheEventKind`]. Handler errors and panics are
//! caught and logged; they never reach the code that emitted the event.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::domain::events::{CacheEvent, CacheEventKind};

/// Event handler
pub type EventHandler = Arc<dyn Fn(&CacheEvent) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as an [`EventHandler`]
pub fn event_handler<F>(f: F) -> EventHandler
where
    F: Fn(&CacheEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Subscription handle returned by [`EventBus::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observer registry for cache events
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<CacheEventKind, Vec<(ListenerId, EventHandler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one kind of event
    pub fn on(&self, kind: CacheEventKind, handler: EventHandler) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, handler));
        id
    }

    /// Unsubscribe; returns false if the listener was not registered for `kind`
    pub fn off(&self, kind: CacheEventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(handlers) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(lid, _)| *lid != id);
        before != handlers.len()
    }

    /// Number of listeners for `kind`
    pub fn listener_count(&self, kind: CacheEventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }

    /// True if anyone listens to `kind` (lets emitters skip building payloads)
    pub fn has_listeners(&self, kind: CacheEventKind) -> bool {
        self.listener_count(kind) > 0
    }

    /// Deliver an event; returns how many handlers completed successfully
    pub fn emit(&self, event: &CacheEvent) -> usize {
        let handlers: Vec<(ListenerId, EventHandler)> =
            match self.listeners.read().get(&event.kind()) {
                Some(h) if !h.is_empty() => h.clone(),
                _ => return 0,
            };

        let mut delivered = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(
                        component = "events",
                        listener = %id,
                        event = event.event_type(),
                        key = event.key().unwrap_or_default(),
                        error = %e,
                        "event handler failed"
                    );
                }
                Err(_) => {
                    warn!(
                        component = "events",
                        listener = %id,
                        event = event.event_type(),
                        "event handler panicked"
                    );
                }
            }
        }
        delivered
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        f.debug_struct("EventBus")
            .field(
                "listeners",
                &listeners
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.len()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::CacheLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_handler(counter: Arc<AtomicUsize>) -> EventHandler {
        event_handler(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_on_and_emit_by_kind() {
        let bus = EventBus::new();
        let sets = Arc::new(AtomicUsize::new(0));
        bus.on(CacheEventKind::Set, counter_handler(sets.clone()));

        bus.emit(&CacheEvent::set("k", serde_json::json!(1), CacheLevel::All));
        bus.emit(&CacheEvent::delete("k"));

        assert_eq!(sets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_listener() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = bus.on(CacheEventKind::Delete, counter_handler(count.clone()));

        assert!(!bus.off(CacheEventKind::Set, id));
        assert!(bus.off(CacheEventKind::Delete, id));
        assert!(!bus.off(CacheEventKind::Delete, id));

        assert_eq!(bus.emit(&CacheEvent::delete("k")), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failing_handlers_do_not_escape() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.on(CacheEventKind::Clear, event_handler(|_| anyhow::bail!("boom")));
        bus.on(CacheEventKind::Clear, event_handler(|_| panic!("handler panic")));
        bus.on(CacheEventKind::Clear, counter_handler(count.clone()));

        let delivered = bus.emit(&CacheEvent::clear(CacheLevel::All));
        assert_eq!(delivered, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_count() {
        let bus = EventBus::new();
        assert!(!bus.has_listeners(CacheEventKind::Invalidate));
        bus.on(CacheEventKind::Invalidate, event_handler(|_| Ok(())));
        assert_eq!(bus.listener_count(CacheEventKind::Invalidate), 1);
    }
}
