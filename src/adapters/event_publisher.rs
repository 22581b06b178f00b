//! Event listener adapters
//!
//! Ready-made subscribers for the cache event bus.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::events::{event_handler, EventHandler};
use crate::domain::events::{CacheEvent, CacheEventKind};

/// Writes every event it receives to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventListener {
    /// Log at info level (true) or debug level (false)
    info_level: bool,
}

impl LoggingEventListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info_level() -> Self {
        Self { info_level: true }
    }

    pub fn debug_level() -> Self {
        Self { info_level: false }
    }

    pub fn log(&self, event: &CacheEvent) {
        let json = serde_json::to_string(event).unwrap_or_else(|_| format!("{:?}", event));
        let key = event.key().unwrap_or_default();
        if self.info_level {
            info!(
                component = "events",
                event_type = event.event_type(),
                key,
                event = %json,
                "cache event"
            );
        } else {
            debug!(
                component = "events",
                event_type = event.event_type(),
                key,
                event = %json,
                "cache event"
            );
        }
    }

    pub fn handler(self) -> EventHandler {
        event_handler(move |event| {
            self.log(event);
            Ok(())
        })
    }
}

/// Collects events in memory for later inspection.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: parking_lot::RwLock<Vec<CacheEvent>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Handler that appends to this collector
    pub fn handler(self: &Arc<Self>) -> EventHandler {
        let collector = Arc::clone(self);
        event_handler(move |event| {
            collector.events.write().push(event.clone());
            Ok(())
        })
    }

    pub fn events(&self) -> Vec<CacheEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }

    pub fn events_of_kind(&self, kind: CacheEventKind) -> Vec<CacheEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    /// Keys of collected events, in arrival order
    pub fn keys(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter_map(|e| e.key().map(str::to_string))
            .collect()
    }
}
