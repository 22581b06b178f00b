//! Remote Backend Façade (Tier-3)
//!
//! Wraps a [`RemoteBackend`] in a connection state machine:
//!
//! ```text
//! DISCONNECTED ──connect──▶ CONNECTING ──ok──▶ CONNECTED
//!      ▲                        │                  │
//!      │                      fail            loss / close
//!      │                        ▼                  ▼
//!      └──────────────── ERROR | CLOSED ◀──────────┘
//!                  (one reconnect timer after a fixed backoff)
//! ```
//!
//! While not connected every operation is a miss or a no-op. Backend errors
//! and command timeouts are counted in the error metric and never returned
//! to the caller.
//!
//! Entries travel as a JSON envelope `{data, createdAt, ttlMs, ...}` passed
//! through the configured [`ValueCodec`]. The backend expires keys in whole
//! seconds, so expiry is re-checked here with millisecond precision.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::codec::{CodecKind, ValueCodec};
use super::entry::{to_delta, CacheEntry, EntryMetadata};
use super::metrics::CacheMetrics;
use super::policy::DataType;
use crate::domain::ports::{CapabilityProbe, ConnectionState, RemoteBackend};
use crate::error::{Error, Result};

/// Keys fetched per `mget` during scans
const SCAN_BATCH: usize = 100;

// =============================================================================
// Configuration
// =============================================================================

/// Remote tier configuration
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Attach a remote tier at all
    pub enabled: bool,
    /// Backend URL (used by the Redis adapter)
    pub url: String,
    /// Namespace prepended to every key
    pub key_prefix: String,
    /// Deadline for establishing a connection
    pub connect_timeout: Duration,
    /// Deadline for any single command
    pub command_timeout: Duration,
    /// Fixed delay before the single reconnect attempt
    pub reconnect_backoff: Duration,
    /// Envelope codec
    pub codec: CodecKind,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "tradecache:".to_string(),
            connect_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_millis(500),
            reconnect_backoff: Duration::from_secs(5),
            codec: CodecKind::None,
        }
    }
}

impl RemoteConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() || self.command_timeout.is_zero() {
            return Err(Error::Config("remote timeouts must be greater than zero".into()));
        }
        if self.reconnect_backoff.is_zero() {
            return Err(Error::Config("remote reconnect backoff must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Remote TTL in whole seconds: ceil(ms / 1000), at least one second
pub fn remote_ttl_secs(remaining: Duration) -> u64 {
    let ms = remaining.as_millis() as u64;
    ms.div_ceil(1000).max(1)
}

// =============================================================================
// Envelope
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    data: String,
    created_at: i64,
    ttl_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_type: Option<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    warmup: bool,
}

impl Envelope {
    fn from_entry(entry: &CacheEntry) -> Result<Self> {
        let data = String::from_utf8(entry.value().to_vec())
            .map_err(|e| Error::Internal(format!("non-UTF-8 payload for {}: {}", entry.key(), e)))?;
        let ttl_ms = (entry.expires_at() - entry.created_at())
            .num_milliseconds()
            .max(1) as u64;
        Ok(Self {
            data,
            created_at: entry.created_at().timestamp_millis(),
            ttl_ms,
            data_type: entry.metadata.data_type,
            source: entry.metadata.source.clone(),
            dependencies: entry.metadata.dependencies.iter().cloned().collect(),
            warmup: entry.metadata.warmup,
        })
    }

    fn created(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.created_at)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn expires(&self) -> DateTime<Utc> {
        self.created() + to_delta(Duration::from_millis(self.ttl_ms))
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires()
    }

    fn into_entry(self, key: &str) -> CacheEntry {
        let created = self.created();
        let expires = self.expires();
        let metadata = EntryMetadata {
            data_type: self.data_type,
            source: self.source,
            size_bytes: 0,
            dependencies: self.dependencies.into_iter().collect(),
            warmup: self.warmup,
        };
        CacheEntry::with_expiry(key, Bytes::from(self.data), created, expires, metadata)
    }
}

// =============================================================================
// Façade
// =============================================================================

/// Remote tier statistics
#[derive(Debug, Clone, Serialize)]
pub struct RemoteStats {
    pub backend: String,
    pub state: ConnectionState,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub reconnect_attempts: u64,
    /// Operations skipped because the façade was not connected
    pub skipped: u64,
}

/// Remote backend façade
pub struct RemoteFacade {
    me: Weak<RemoteFacade>,
    backend: Arc<dyn RemoteBackend>,
    config: RemoteConfig,
    codec: Arc<dyn ValueCodec>,
    capability: Arc<dyn CapabilityProbe>,
    metrics: Arc<CacheMetrics>,
    state: RwLock<ConnectionState>,
    reconnect_pending: AtomicBool,
    shutdown: CancellationToken,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    reconnect_attempts: AtomicU64,
    skipped: AtomicU64,
}

impl RemoteFacade {
    /// Build a façade (starts `DISCONNECTED`; call [`connect`](Self::connect))
    pub fn new(
        backend: Arc<dyn RemoteBackend>,
        config: RemoteConfig,
        capability: Arc<dyn CapabilityProbe>,
        metrics: Arc<CacheMetrics>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let codec = config.codec.build();
        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            backend,
            config,
            codec,
            capability,
            metrics,
            state: RwLock::new(ConnectionState::Disconnected),
            reconnect_pending: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    // =========================================================================
    // Connection state machine
    // =========================================================================

    /// Try to connect; returns whether the façade ended up connected
    #[instrument(skip(self), fields(component = "remote", backend = %self.backend.name()))]
    pub async fn connect(&self) -> bool {
        if !self.capability.remote_connections_permitted() {
            debug!("remote connections not permitted in this runtime, skipping");
            return false;
        }
        if self.shutdown.is_cancelled() {
            return false;
        }

        {
            let mut state = self.state.write();
            match *state {
                ConnectionState::Connected => return true,
                ConnectionState::Connecting => return false,
                _ => *state = ConnectionState::Connecting,
            }
        }

        let outcome =
            tokio::time::timeout(self.config.connect_timeout, self.backend.connect()).await;
        match outcome {
            Ok(Ok(())) => {
                *self.state.write() = ConnectionState::Connected;
                info!("remote tier connected");
                true
            }
            Ok(Err(e)) => {
                self.connection_lost("connect", &e);
                false
            }
            Err(_) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                let e = Error::timeout("connect", self.config.connect_timeout);
                self.connection_lost("connect", &e);
                false
            }
        }
    }

    /// Drop the connection without scheduling a reconnect
    pub fn disconnect(&self) {
        *self.state.write() = ConnectionState::Disconnected;
    }

    /// Stop reconnecting and release the backend; terminal
    pub async fn close(&self) {
        self.shutdown.cancel();
        *self.state.write() = ConnectionState::Closed;
        if let Err(e) = self.backend.close().await {
            warn!(component = "remote", error = %e, "error closing remote backend");
        }
        info!(component = "remote", "remote tier closed");
    }

    fn connection_lost(&self, op: &str, error: &Error) {
        self.record_error();
        {
            let mut state = self.state.write();
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Error;
        }
        warn!(component = "remote", op, error = %error, "remote connection lost");
        *self.state.write() = ConnectionState::Disconnected;
        self.schedule_reconnect();
    }

    /// Arm the reconnect timer unless one is already pending
    fn schedule_reconnect(&self) {
        if self.shutdown.is_cancelled() || !self.capability.remote_connections_permitted() {
            return;
        }
        if self.reconnect_pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(facade) = self.me.upgrade() else {
            self.reconnect_pending.store(false, Ordering::SeqCst);
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.reconnect_pending.store(false, Ordering::SeqCst);
            return;
        };

        let backoff = self.config.reconnect_backoff;
        let shutdown = self.shutdown.clone();
        debug!(component = "remote", ?backoff, "reconnect scheduled");
        handle.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.cancelled() => {
                    facade.reconnect_pending.store(false, Ordering::SeqCst);
                    return;
                }
            }
            facade.reconnect_pending.store(false, Ordering::SeqCst);
            facade.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
            facade.connect().await;
        });
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_error();
    }

    /// Run one backend command under the command deadline
    async fn call<T, F>(&self, op: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        if !self.is_connected() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        match tokio::time::timeout(self.config.command_timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) if e.is_connection_loss() => {
                self.connection_lost(op, &e);
                None
            }
            Ok(Err(e)) => {
                self.record_error();
                warn!(component = "remote", op, error = %e, "remote command failed");
                None
            }
            Err(_) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                self.record_error();
                warn!(
                    component = "remote",
                    op,
                    after = ?self.config.command_timeout,
                    "remote command timed out"
                );
                None
            }
        }
    }

    // =========================================================================
    // Envelope handling
    // =========================================================================

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn strip_key<'a>(&self, full: &'a str) -> &'a str {
        full.strip_prefix(self.config.key_prefix.as_str()).unwrap_or(full)
    }

    fn encode(&self, entry: &CacheEntry) -> Result<Bytes> {
        let envelope = Envelope::from_entry(entry)?;
        let json = serde_json::to_vec(&envelope)?;
        self.codec.encode(&json)
    }

    fn decode(&self, key: &str, raw: &[u8]) -> Option<Envelope> {
        let decoded = self
            .codec
            .decode(raw)
            .and_then(|bytes| serde_json::from_slice::<Envelope>(&bytes).map_err(Error::from));
        match decoded {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                self.record_error();
                warn!(component = "remote", key, error = %e, "undecodable remote envelope");
                None
            }
        }
    }

    fn live_entry(&self, key: &str, raw: Option<Bytes>) -> Option<CacheEntry> {
        let entry = raw
            .and_then(|raw| self.decode(key, &raw))
            .filter(|env| !env.is_expired_at(Utc::now()))
            .map(|env| env.into_entry(key));
        match entry {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        entry
    }

    /// Encoded value plus remote TTL, `None` if the entry is already expired
    fn prepare(&self, entry: &CacheEntry) -> Option<(Bytes, u64)> {
        let remaining = entry.remaining_ttl(Utc::now())?;
        match self.encode(entry) {
            Ok(bytes) => Some((bytes, remote_ttl_secs(remaining))),
            Err(e) => {
                self.record_error();
                warn!(
                    component = "remote",
                    key = entry.key(),
                    error = %e,
                    "cannot encode entry for remote tier"
                );
                None
            }
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Fetch a live entry
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let full = self.full_key(key);
        let raw = self.call("get", self.backend.get(&full)).await.flatten();
        self.live_entry(key, raw)
    }

    /// Store an entry for its remaining lifetime; returns whether it was written
    pub async fn set(&self, entry: &CacheEntry) -> bool {
        if !self.is_connected() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let Some((bytes, ttl_secs)) = self.prepare(entry) else {
            return false;
        };
        let full = self.full_key(entry.key());
        self.call("set", self.backend.set(&full, bytes, ttl_secs))
            .await
            .is_some()
    }

    /// Store an entry only if no key holds it remotely. `None` when the call
    /// was skipped or failed, otherwise whether the entry was written.
    pub async fn set_if_absent(&self, entry: &CacheEntry) -> Option<bool> {
        if !self.is_connected() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let (bytes, ttl_secs) = self.prepare(entry)?;
        let full = self.full_key(entry.key());
        self.call("set_if_absent", self.backend.set_if_absent(&full, bytes, ttl_secs))
            .await
    }

    pub async fn delete(&self, key: &str) -> bool {
        let full = self.full_key(key);
        self.call("delete", self.backend.delete(&full))
            .await
            .unwrap_or(false)
    }

    pub async fn has(&self, key: &str) -> bool {
        let full = self.full_key(key);
        let raw = self.call("has", self.backend.get(&full)).await.flatten();
        raw.and_then(|raw| self.decode(key, &raw))
            .is_some_and(|env| !env.is_expired_at(Utc::now()))
    }

    /// Fetch many entries in one round trip (positional results)
    pub async fn mget(&self, keys: &[String]) -> Vec<Option<CacheEntry>> {
        if keys.is_empty() {
            return Vec::new();
        }
        let full: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();
        match self.call("mget", self.backend.mget(&full)).await {
            Some(values) if values.len() == keys.len() => keys
                .iter()
                .zip(values)
                .map(|(key, raw)| self.live_entry(key, raw))
                .collect(),
            Some(_) => {
                self.record_error();
                warn!(component = "remote", "mget returned a mismatched result count");
                vec![None; keys.len()]
            }
            None => {
                self.misses.fetch_add(keys.len() as u64, Ordering::Relaxed);
                vec![None; keys.len()]
            }
        }
    }

    /// Store many entries in one round trip; returns how many were sent
    pub async fn mset(&self, entries: &[CacheEntry]) -> usize {
        if !self.is_connected() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return 0;
        }
        let items: Vec<(String, Bytes, u64)> = entries
            .iter()
            .filter_map(|e| {
                self.prepare(e)
                    .map(|(bytes, ttl)| (self.full_key(e.key()), bytes, ttl))
            })
            .collect();
        if items.is_empty() {
            return 0;
        }
        let count = items.len();
        match self.call("mset", self.backend.mset(items)).await {
            Some(()) => count,
            None => 0,
        }
    }

    /// Keys held remotely (namespace stripped)
    pub async fn keys(&self) -> Vec<String> {
        let prefix = self.config.key_prefix.clone();
        self.call("scan", self.backend.scan_keys(&prefix))
            .await
            .unwrap_or_default()
            .iter()
            .map(|k| self.strip_key(k).to_string())
            .collect()
    }

    /// Every live remote entry, fetched in batches
    pub async fn entries(&self) -> Vec<CacheEntry> {
        let now = Utc::now();
        let mut out = Vec::new();
        for (key, envelope) in self.scan_envelopes().await {
            if !envelope.is_expired_at(now) {
                out.push(envelope.into_entry(&key));
            }
        }
        out
    }

    /// Entries stored under `keys`, each paired with whether it is still
    /// live; no hit or miss accounting
    pub async fn inspect(&self, keys: &[String]) -> Vec<(CacheEntry, bool)> {
        let now = Utc::now();
        self.fetch_envelopes(keys)
            .await
            .into_iter()
            .map(|(key, envelope)| {
                let live = !envelope.is_expired_at(now);
                (envelope.into_entry(&key), live)
            })
            .collect()
    }

    async fn scan_envelopes(&self) -> Vec<(String, Envelope)> {
        let keys = self.keys().await;
        self.fetch_envelopes(&keys).await
    }

    async fn fetch_envelopes(&self, keys: &[String]) -> Vec<(String, Envelope)> {
        let mut out = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(SCAN_BATCH) {
            let full: Vec<String> = chunk.iter().map(|k| self.full_key(k)).collect();
            let Some(values) = self.call("mget", self.backend.mget(&full)).await else {
                break;
            };
            for (key, raw) in chunk.iter().zip(values) {
                if let Some(envelope) = raw.and_then(|raw| self.decode(key, &raw)) {
                    out.push((key.clone(), envelope));
                }
            }
        }
        out
    }

    /// Delete envelopes whose client-side expiry has passed
    pub async fn purge_expired(&self) -> usize {
        if !self.is_connected() {
            return 0;
        }
        let now = Utc::now();
        let mut removed = 0;
        for (key, envelope) in self.scan_envelopes().await {
            if envelope.is_expired_at(now) && self.delete(&key).await {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(component = "remote", removed, "purged expired remote entries");
        }
        removed
    }

    /// Delete every key in this cache's namespace
    pub async fn clear(&self) -> u64 {
        let prefix = self.config.key_prefix.clone();
        self.call("flush", self.backend.flush(&prefix))
            .await
            .unwrap_or(0)
    }

    pub fn stats(&self) -> RemoteStats {
        RemoteStats {
            backend: self.backend.name().to_string(),
            state: self.state(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for RemoteFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFacade")
            .field("backend", &self.backend.name())
            .field("state", &self.state())
            .field("codec", &self.codec.kind())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
