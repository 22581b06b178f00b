//! Cache Events
//!
//! Closed set of notifications emitted by the coordinator. Listeners
//! subscribe per [`CacheEventKind`] through the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ports::CacheLevel;
use crate::cache::policy::DataType;

/// Why an entry was invalidated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum InvalidationReason {
    /// Key matched a regular expression
    Pattern(String),
    /// Entry carried this data type
    Type(DataType),
    /// Entry depended on this upstream identifier
    Dependency(String),
}

/// Event kind, used as the subscription key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventKind {
    Set,
    Delete,
    Clear,
    Invalidate,
}

impl CacheEventKind {
    /// All kinds
    pub const ALL: [CacheEventKind; 4] = [
        CacheEventKind::Set,
        CacheEventKind::Delete,
        CacheEventKind::Clear,
        CacheEventKind::Invalidate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheEventKind::Set => "set",
            CacheEventKind::Delete => "delete",
            CacheEventKind::Clear => "clear",
            CacheEventKind::Invalidate => "invalidate",
        }
    }
}

/// Cache notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEvent {
    // =========================================================================
    // Write Events
    // =========================================================================
    /// A value was written
    Set {
        key: String,
        value: serde_json::Value,
        level: CacheLevel,
        timestamp: DateTime<Utc>,
    },

    /// A key was deleted from every tier
    Delete {
        key: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Bulk Events
    // =========================================================================
    /// One tier (or all of them) was emptied
    Clear {
        level: CacheLevel,
        timestamp: DateTime<Utc>,
    },

    /// A key was removed by the invalidation engine
    Invalidate {
        key: String,
        reason: InvalidationReason,
        timestamp: DateTime<Utc>,
    },
}

impl CacheEvent {
    /// Subscription kind of this event
    pub fn kind(&self) -> CacheEventKind {
        match self {
            CacheEvent::Set { .. } => CacheEventKind::Set,
            CacheEvent::Delete { .. } => CacheEventKind::Delete,
            CacheEvent::Clear { .. } => CacheEventKind::Clear,
            CacheEvent::Invalidate { .. } => CacheEventKind::Invalidate,
        }
    }

    /// Event type name
    pub fn event_type(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Key affected, if the event is about a single key
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::Set { key, .. }
            | CacheEvent::Delete { key, .. }
            | CacheEvent::Invalidate { key, .. } => Some(key),
            CacheEvent::Clear { .. } => None,
        }
    }

    /// Value carried by the event (only for writes)
    pub fn value(&self) -> Option<&serde_json::Value> {
        match self {
            CacheEvent::Set { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CacheEvent::Set { timestamp, .. }
            | CacheEvent::Delete { timestamp, .. }
            | CacheEvent::Clear { timestamp, .. }
            | CacheEvent::Invalidate { timestamp, .. } => *timestamp,
        }
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl CacheEvent {
    pub fn set(key: impl Into<String>, value: serde_json::Value, level: CacheLevel) -> Self {
        CacheEvent::Set {
            key: key.into(),
            value,
            level,
            timestamp: Utc::now(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        CacheEvent::Delete {
            key: key.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn clear(level: CacheLevel) -> Self {
        CacheEvent::Clear {
            level,
            timestamp: Utc::now(),
        }
    }

    pub fn invalidate(key: impl Into<String>, reason: InvalidationReason) -> Self {
        CacheEvent::Invalidate {
            key: key.into(),
            reason,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_key() {
        let event = CacheEvent::set("order:1", serde_json::json!({"qty": 2}), CacheLevel::All);
        assert_eq!(event.kind(), CacheEventKind::Set);
        assert_eq!(event.key(), Some("order:1"));
        assert_eq!(event.value().unwrap()["qty"], 2);

        let event = CacheEvent::clear(CacheLevel::L1);
        assert_eq!(event.event_type(), "clear");
        assert_eq!(event.key(), None);
    }

    #[test]
    fn test_serialized_form_is_tagged() {
        let event = CacheEvent::invalidate(
            "pattern:BTCUSDT",
            InvalidationReason::Dependency("BTCUSDT".into()),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "invalidate");
        assert_eq!(json["reason"]["by"], "dependency");
        assert_eq!(json["reason"]["value"], "BTCUSDT");

        let back: CacheEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
