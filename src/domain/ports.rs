//! Domain Ports (Port/Adapter Pattern)
//!
//! Abstractions the cache core consumes from its collaborators. Adapters in
//! [`crate::adapters`] provide the concrete implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Cache Core                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  RemoteBackend │ MetricsSink │ CapabilityProbe       │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Adapters (Impls)                         │
//! │  InMemoryBackend │ RedisBackend │ PrometheusMetricsSink      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::metrics::MetricsSnapshot;
use crate::error::{Error, Result};

// =============================================================================
// Value Objects
// =============================================================================

/// Cache tier selector for writes and clears
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CacheLevel {
    /// Fast in-process tier
    L1,
    /// Larger in-process tier
    L2,
    /// Remote tier
    L3,
    /// Every configured tier
    #[default]
    #[serde(rename = "all")]
    All,
}

impl CacheLevel {
    /// True if a write at this level touches `tier`
    pub fn includes(&self, tier: CacheLevel) -> bool {
        *self == CacheLevel::All || *self == tier
    }

    /// Short label
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheLevel::L1 => "L1",
            CacheLevel::L2 => "L2",
            CacheLevel::L3 => "L3",
            CacheLevel::All => "all",
        }
    }
}

impl fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "L1" | "l1" => Ok(CacheLevel::L1),
            "L2" | "l2" => Ok(CacheLevel::L2),
            "L3" | "l3" => Ok(CacheLevel::L3),
            "all" | "ALL" => Ok(CacheLevel::All),
            other => Err(Error::Config(format!("unknown cache level: {}", other))),
        }
    }
}

/// Remote connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Closed,
}

impl ConnectionState {
    /// Short label
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Periodic telemetry report handed to a [`MetricsSink`]
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryReport {
    /// Counter snapshot
    pub metrics: MetricsSnapshot,
    /// Entries held in Tier-1
    pub l1_entries: usize,
    /// Entries held in Tier-2 (0 when disabled)
    pub l2_entries: usize,
    /// Estimated bytes across the in-process tiers
    pub memory_bytes: u64,
    /// Remote connection state, `None` when no remote tier is configured
    pub remote_state: Option<ConnectionState>,
    /// When the report was taken
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Remote Backend Port
// =============================================================================

/// Out-of-process key/value store behind the remote façade.
///
/// Values are opaque envelope bytes. TTLs are whole seconds, the native
/// granularity of typical remote stores.
///
/// # Example
///
/// ```ignore
/// #[async_trait]
/// impl RemoteBackend for MyStore {
///     async fn get(&self, key: &str) -> Result<Option<Bytes>> {
///         // fetch from the store
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Establish (or verify) the connection
    async fn connect(&self) -> Result<()>;

    /// Fetch one value
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store one value with a TTL in seconds
    async fn set(&self, key: &str, value: Bytes, ttl_secs: u64) -> Result<()>;

    /// Store one value only if the key is absent, returning whether it was
    /// written; the check and the write are a single backend operation
    async fn set_if_absent(&self, key: &str, value: Bytes, ttl_secs: u64) -> Result<bool>;

    /// Remove one key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Fetch many values in one round trip (positional results)
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>>;

    /// Store many values in one round trip
    async fn mset(&self, items: Vec<(String, Bytes, u64)>) -> Result<()>;

    /// List keys starting with `prefix`
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove every key starting with `prefix`, returning how many went
    async fn flush(&self, prefix: &str) -> Result<u64>;

    /// Release the connection
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Telemetry Port
// =============================================================================

/// Receives the periodic metrics export.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Publish one report
    async fn export(&self, report: &TelemetryReport) -> Result<()>;
}

// =============================================================================
// Capability Probe Port
// =============================================================================

/// Tells the remote façade whether connection attempts are permitted in the
/// current runtime context (e.g. disabled during build/test runs).
pub trait CapabilityProbe: Send + Sync {
    fn remote_connections_permitted(&self) -> bool;
}

/// Capability fixed by configuration
#[derive(Debug, Clone, Copy)]
pub struct StaticCapability(pub bool);

impl CapabilityProbe for StaticCapability {
    fn remote_connections_permitted(&self) -> bool {
        self.0
    }
}
