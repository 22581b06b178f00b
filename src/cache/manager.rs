//! Cache Manager - Tiered Cache Coordinator
//!
//! Orchestrates Tier-1 and Tier-2 (in-process stores) and the optional
//! Tier-3 remote façade.
//!
//! Read path: L1, then L2 (a hit is promoted into L1 with its remaining
//! lifetime), then L3 (a hit is promoted into L2 and L1). Promotion is a
//! sequence of independently locked writes; concurrent promotions of the
//! same key just overwrite each other.
//!
//! Write path: TTL resolves as explicit > per-type policy > global default.
//! `CacheLevel::All` writes every tier; a narrower level writes one tier.
//! A failure in one tier is logged and never aborts the others.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::analytics::AnalyticsConfig;
use super::entry::{CacheEntry, EntryMetadata};
use super::events::{EventBus, EventHandler, ListenerId};
use super::metrics::{CacheMetrics, LatencyTracker, MetricsSnapshot};
use super::optimizer::OptimizerConfig;
use super::policy::{DataType, TtlPolicy};
use super::remote::{RemoteConfig, RemoteFacade};
use super::store::{
    EntryStore, Lookup, StoreConfig, DEFAULT_L1_MAX_ENTRIES, DEFAULT_L2_MAX_ENTRIES,
};
use super::warming::WarmingConfig;
use crate::domain::events::{CacheEvent, CacheEventKind};
use crate::domain::ports::{CacheLevel, RemoteBackend, StaticCapability};
use crate::error::{Error, Result};

/// Tier that served a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CacheTier {
    /// In-process, small
    L1,
    /// In-process, large
    L2,
    /// Remote
    L3,
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTier::L1 => write!(f, "L1"),
            CacheTier::L2 => write!(f, "L2"),
            CacheTier::L3 => write!(f, "L3"),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Tier-1 store
    pub l1: StoreConfig,
    /// Tier-2 store
    pub l2: StoreConfig,
    /// Keep a second in-process tier
    pub l2_enabled: bool,
    /// Lifetime policy
    pub ttl: TtlPolicy,
    /// Remote tier
    pub remote: RemoteConfig,
    /// Whether remote connections may be attempted in this runtime
    pub remote_connections_permitted: bool,
    /// Expired-entry sweep period
    pub cleanup_interval: Duration,
    /// Analytics thresholds
    pub analytics: AnalyticsConfig,
    /// Warming scheduler
    pub warming: WarmingConfig,
    /// Adaptive optimizer
    pub optimizer: OptimizerConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1: StoreConfig::with_capacity(DEFAULT_L1_MAX_ENTRIES),
            l2: StoreConfig::with_capacity(DEFAULT_L2_MAX_ENTRIES),
            l2_enabled: true,
            ttl: TtlPolicy::default(),
            remote: RemoteConfig::default(),
            remote_connections_permitted: true,
            cleanup_interval: Duration::from_secs(60),
            analytics: AnalyticsConfig::default(),
            warming: WarmingConfig::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Reject sizes, TTLs and limits that cannot work
    pub fn validate(&self) -> Result<()> {
        self.l1.validate("L1")?;
        if self.l2_enabled {
            self.l2.validate("L2")?;
        }
        self.ttl.validate()?;
        if self.remote.enabled {
            self.remote.validate()?;
        }
        if self.cleanup_interval.is_zero() {
            return Err(Error::Config("cleanup interval must be greater than zero".into()));
        }
        self.analytics.validate()?;
        self.warming.validate()?;
        self.optimizer.validate()?;
        Ok(())
    }
}

// =============================================================================
// Requests and results
// =============================================================================

/// Options for a write
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Payload kind (falls back to `metadata.data_type`)
    pub data_type: Option<DataType>,
    /// Explicit lifetime, overrides the policy
    pub ttl: Option<Duration>,
    /// Tier(s) to write
    pub level: CacheLevel,
    /// Extra metadata
    pub metadata: EntryMetadata,
}

impl SetOptions {
    pub fn typed(data_type: DataType) -> Self {
        Self {
            data_type: Some(data_type),
            ..Default::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn at_level(mut self, level: CacheLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.metadata.dependencies.insert(dependency.into());
        self
    }
}

/// Cache lookup result
#[derive(Debug, Clone)]
pub struct CacheResult {
    /// The cached entry
    pub entry: CacheEntry,
    /// Which tier the entry was found in
    pub tier: CacheTier,
    /// Lookup latency
    pub latency: Duration,
}

/// Expired entries removed by [`CacheManager::cleanup`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    #[serde(rename = "L1")]
    pub l1: usize,
    #[serde(rename = "L2")]
    pub l2: usize,
    #[serde(rename = "L3")]
    pub l3: usize,
    pub total: usize,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Tiered cache coordinator
pub struct CacheManager {
    pub(super) l1: EntryStore,
    pub(super) l2: Option<EntryStore>,
    pub(super) remote: Option<Arc<RemoteFacade>>,
    config: CacheConfig,
    pub(super) metrics: Arc<CacheMetrics>,
    pub(super) events: EventBus,
}

impl CacheManager {
    /// Create a coordinator with in-process tiers only
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_backend(config, None)
    }

    /// Create a coordinator, attaching `backend` as Tier-3 when the remote
    /// tier is enabled
    pub fn with_backend(
        config: CacheConfig,
        backend: Option<Arc<dyn RemoteBackend>>,
    ) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(CacheMetrics::new());

        let remote = match (config.remote.enabled, backend) {
            (true, Some(backend)) => Some(RemoteFacade::new(
                backend,
                config.remote.clone(),
                Arc::new(StaticCapability(config.remote_connections_permitted)),
                Arc::clone(&metrics),
            )?),
            (true, None) => {
                return Err(Error::Config("remote tier enabled but no backend supplied".into()));
            }
            (false, _) => None,
        };

        info!(
            component = "coordinator",
            l1_capacity = config.l1.max_entries,
            l2_enabled = config.l2_enabled,
            remote = remote.as_ref().map(|r| r.backend_name()).unwrap_or("none"),
            "cache coordinator created"
        );

        Ok(Self {
            l1: EntryStore::new("L1", config.l1.clone()),
            l2: config
                .l2_enabled
                .then(|| EntryStore::new("L2", config.l2.clone())),
            remote,
            config,
            metrics,
            events: EventBus::new(),
        })
    }

    /// Coordinator over an in-memory remote tier (single node, tests)
    pub fn in_memory(mut config: CacheConfig) -> Result<Self> {
        config.remote.enabled = true;
        let backend: Arc<dyn RemoteBackend> =
            Arc::new(crate::adapters::memory_backend::InMemoryBackend::new());
        Self::with_backend(config, Some(backend))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Typed read; `None` on miss or when the stored value does not decode as `T`
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let result = self.get_with_tier(key).await?;
        self.decode(&result.entry)
    }

    /// Decode an entry's value as `T`, counting a failure as an error
    pub(super) fn decode<T: DeserializeOwned>(&self, entry: &CacheEntry) -> Option<T> {
        match serde_json::from_slice(entry.value()) {
            Ok(value) => Some(value),
            Err(e) => {
                self.metrics.record_error();
                warn!(
                    component = "coordinator",
                    key = entry.key(),
                    error = %e,
                    "cached value does not decode"
                );
                None
            }
        }
    }

    /// Read through every tier, promoting lower-tier hits
    pub async fn get_with_tier(&self, key: &str) -> Option<CacheResult> {
        let tracker = LatencyTracker::start();

        let mut expired_type = match self.l1.lookup(key) {
            Lookup::Hit(entry) => return Some(self.hit(entry, CacheTier::L1, &tracker)),
            Lookup::Expired(t) => t,
            Lookup::Missing => None,
        };

        if let Some(l2) = &self.l2 {
            match l2.lookup(key) {
                Lookup::Hit(entry) => {
                    self.promote_to_l1(&entry);
                    self.metrics.record_promotion_l2_to_l1();
                    return Some(self.hit(entry, CacheTier::L2, &tracker));
                }
                Lookup::Expired(t) => expired_type = expired_type.or(t),
                Lookup::Missing => {}
            }
        }

        if let Some(remote) = &self.remote {
            if let Some(entry) = remote.get(key).await {
                self.promote_from_l3(&entry);
                return Some(self.hit(entry, CacheTier::L3, &tracker));
            }
        }

        self.metrics.record_miss();
        self.metrics.record_type_miss(expired_type);
        self.metrics.record_access_latency(tracker.elapsed());
        None
    }

    /// Batch typed read; Tier-3 misses are fetched in one round trip
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[String]) -> Vec<Option<T>> {
        let mut found: Vec<Option<CacheEntry>> = vec![None; keys.len()];
        let mut pending: Vec<usize> = Vec::new();
        let mut expired_types: Vec<Option<DataType>> = vec![None; keys.len()];

        for (i, key) in keys.iter().enumerate() {
            let tracker = LatencyTracker::start();
            match self.l1.lookup(key) {
                Lookup::Hit(entry) => {
                    found[i] = Some(self.hit(entry, CacheTier::L1, &tracker).entry);
                    continue;
                }
                Lookup::Expired(t) => expired_types[i] = t,
                Lookup::Missing => {}
            }
            if let Some(l2) = &self.l2 {
                match l2.lookup(key) {
                    Lookup::Hit(entry) => {
                        self.promote_to_l1(&entry);
                        self.metrics.record_promotion_l2_to_l1();
                        found[i] = Some(self.hit(entry, CacheTier::L2, &tracker).entry);
                        continue;
                    }
                    Lookup::Expired(t) => expired_types[i] = expired_types[i].or(t),
                    Lookup::Missing => {}
                }
            }
            pending.push(i);
        }

        if let (Some(remote), false) = (&self.remote, pending.is_empty()) {
            let tracker = LatencyTracker::start();
            let remote_keys: Vec<String> = pending.iter().map(|&i| keys[i].clone()).collect();
            let results = remote.mget(&remote_keys).await;
            let mut still_missing = Vec::new();
            for (&i, entry) in pending.iter().zip(results) {
                match entry {
                    Some(entry) => {
                        self.promote_from_l3(&entry);
                        found[i] = Some(self.hit(entry, CacheTier::L3, &tracker).entry);
                    }
                    None => still_missing.push(i),
                }
            }
            pending = still_missing;
        }

        for &i in &pending {
            self.metrics.record_miss();
            self.metrics.record_type_miss(expired_types[i]);
        }

        found
            .into_iter()
            .map(|entry| self.decode(&entry?))
            .collect()
    }

    /// Pull `key` into Tier-1 from a lower tier without counting a read.
    /// Returns the tier the entry was found in.
    pub async fn promote(&self, key: &str) -> Option<CacheTier> {
        if self.l1.has(key) {
            return Some(CacheTier::L1);
        }
        let (entry, tier) = self.find_below_l1(key).await?;
        self.install_promoted(&entry, tier);
        Some(tier)
    }

    /// Look `key` up in Tier-2 then Tier-3 without counting a read or
    /// copying anything upward
    pub(super) async fn find_below_l1(&self, key: &str) -> Option<(CacheEntry, CacheTier)> {
        if let Some(entry) = self.l2.as_ref().and_then(|l2| l2.get(key)) {
            return Some((entry, CacheTier::L2));
        }
        let entry = self.remote.as_ref()?.get(key).await?;
        Some((entry, CacheTier::L3))
    }

    /// Copy an entry found in `tier` into every faster tier
    pub(super) fn install_promoted(&self, entry: &CacheEntry, tier: CacheTier) {
        match tier {
            CacheTier::L1 => {}
            CacheTier::L2 => {
                self.promote_to_l1(entry);
                self.metrics.record_promotion_l2_to_l1();
            }
            CacheTier::L3 => self.promote_from_l3(entry),
        }
    }

    fn hit(&self, entry: CacheEntry, tier: CacheTier, tracker: &LatencyTracker) -> CacheResult {
        self.metrics.record_hit();
        match tier {
            CacheTier::L1 => self.metrics.record_l1_hit(),
            CacheTier::L2 => self.metrics.record_l2_hit(),
            CacheTier::L3 => self.metrics.record_l3_hit(),
        }
        self.metrics.record_type_hit(entry.metadata.data_type);
        let latency = tracker.elapsed();
        self.metrics.record_access_latency(latency);
        CacheResult {
            entry,
            tier,
            latency,
        }
    }

    fn promote_to_l1(&self, entry: &CacheEntry) {
        let evicted = self.l1.insert(entry.promoted_copy());
        self.metrics.record_evictions(evicted.len() as u64);
    }

    fn promote_from_l3(&self, entry: &CacheEntry) {
        if let Some(l2) = &self.l2 {
            let evicted = l2.insert(entry.promoted_copy());
            self.metrics.record_evictions(evicted.len() as u64);
            self.metrics.record_promotion_l3_to_l2();
        }
        self.promote_to_l1(entry);
        self.metrics.record_promotion_l2_to_l1();
        debug!(component = "coordinator", key = entry.key(), "promoted from remote tier");
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write a value. Serialization failures are logged and the write is dropped.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: SetOptions) {
        let Some((json, bytes)) = self.serialize(key, value) else {
            return;
        };
        let level = options.level;
        let entry = self.build_entry(key, bytes, options);
        self.store_entry(entry, level).await;
        self.metrics.record_set();

        if self.events.has_listeners(CacheEventKind::Set) {
            self.events.emit(&CacheEvent::set(key, json, level));
        }
    }

    /// Write a value only where no live entry exists for `key`, returning
    /// whether it was written. Each tier is claimed with a single atomic
    /// operation, so a concurrent [`set`](Self::set) is never overwritten.
    pub async fn set_if_absent<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> bool {
        let level = options.level;
        if self.l1.has(key) || self.l2.as_ref().is_some_and(|l2| l2.has(key)) {
            return false;
        }
        let Some((json, bytes)) = self.serialize(key, value) else {
            return false;
        };
        let entry = self.build_entry(key, bytes, options);

        if let Some(remote) = &self.remote {
            let claimed = if level.includes(CacheLevel::L3) {
                remote.set_if_absent(&entry).await
            } else {
                Some(!remote.has(key).await)
            };
            // A failed remote call degrades to the local tiers
            if claimed == Some(false) {
                return false;
            }
        }

        let mut written = false;
        if level.includes(CacheLevel::L1) {
            match self.l1.insert_if_absent(entry.clone()) {
                Some(evicted) => {
                    self.metrics.record_evictions(evicted.len() as u64);
                    written = true;
                }
                None => return false,
            }
        }
        if level.includes(CacheLevel::L2) {
            if let Some(l2) = &self.l2 {
                if let Some(evicted) = l2.insert_if_absent(entry) {
                    self.metrics.record_evictions(evicted.len() as u64);
                    written = true;
                }
            }
        }
        if !written && !level.includes(CacheLevel::L3) {
            return false;
        }

        self.metrics.record_set();
        if self.events.has_listeners(CacheEventKind::Set) {
            self.events.emit(&CacheEvent::set(key, json, level));
        }
        true
    }

    /// Batch write; Tier-3 receives one pipelined call
    pub async fn mset<T: Serialize>(&self, items: &[(String, T)], options: SetOptions) {
        let level = options.level;
        let mut remote_batch = Vec::new();
        let mut written = Vec::new();

        for (key, value) in items {
            let Some((json, bytes)) = self.serialize(key, value) else {
                continue;
            };
            let entry = self.build_entry(key, bytes, options.clone());
            self.store_local(&entry, level);
            if level.includes(CacheLevel::L3) {
                remote_batch.push(entry);
            }
            self.metrics.record_set();
            written.push((key.clone(), json));
        }

        if let Some(remote) = &self.remote {
            if !remote_batch.is_empty() {
                remote.mset(&remote_batch).await;
            }
        }

        if self.events.has_listeners(CacheEventKind::Set) {
            for (key, json) in written {
                self.events.emit(&CacheEvent::set(key, json, level));
            }
        }
    }

    fn serialize<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Option<(serde_json::Value, Bytes)> {
        let encoded = serde_json::to_value(value)
            .and_then(|json| serde_json::to_vec(&json).map(|bytes| (json, Bytes::from(bytes))));
        match encoded {
            Ok(pair) => Some(pair),
            Err(e) => {
                self.metrics.record_error();
                warn!(component = "coordinator", key, error = %Error::from(e), "value rejected");
                None
            }
        }
    }

    fn build_entry(&self, key: &str, bytes: Bytes, options: SetOptions) -> CacheEntry {
        let mut metadata = options.metadata;
        metadata.data_type = options.data_type.or(metadata.data_type);
        let ttl = self.config.ttl.resolve(options.ttl, metadata.data_type);
        CacheEntry::new(key, bytes, ttl, metadata)
    }

    /// Write a prepared entry to the tiers selected by `level`
    pub(super) async fn store_entry(&self, entry: CacheEntry, level: CacheLevel) {
        self.store_local(&entry, level);
        if level.includes(CacheLevel::L3) {
            if let Some(remote) = &self.remote {
                remote.set(&entry).await;
            }
        }
    }

    fn store_local(&self, entry: &CacheEntry, level: CacheLevel) {
        if level.includes(CacheLevel::L1) {
            let evicted = self.l1.insert(entry.clone());
            self.metrics.record_evictions(evicted.len() as u64);
        }
        if level.includes(CacheLevel::L2) {
            if let Some(l2) = &self.l2 {
                let evicted = l2.insert(entry.clone());
                self.metrics.record_evictions(evicted.len() as u64);
            }
        }
    }

    // =========================================================================
    // Deletes, existence, clear
    // =========================================================================

    /// Remove `key` from every tier
    pub async fn delete(&self, key: &str) -> bool {
        let mut deleted = self.l1.delete(key);
        if let Some(l2) = &self.l2 {
            deleted |= l2.delete(key);
        }
        if let Some(remote) = &self.remote {
            deleted |= remote.delete(key).await;
        }

        self.metrics.record_delete();
        if self.events.has_listeners(CacheEventKind::Delete) {
            self.events.emit(&CacheEvent::delete(key));
        }
        deleted
    }

    /// True if any tier holds a live entry for `key` (no promotion)
    pub async fn has(&self, key: &str) -> bool {
        if self.l1.has(key) {
            return true;
        }
        if self.l2.as_ref().is_some_and(|l2| l2.has(key)) {
            return true;
        }
        match &self.remote {
            Some(remote) => remote.has(key).await,
            None => false,
        }
    }

    /// Empty one tier, or all of them (which also resets metrics)
    pub async fn clear(&self, level: Option<CacheLevel>) {
        let level = level.unwrap_or_default();
        if level.includes(CacheLevel::L1) {
            self.l1.clear();
        }
        if level.includes(CacheLevel::L2) {
            if let Some(l2) = &self.l2 {
                l2.clear();
            }
        }
        if level.includes(CacheLevel::L3) {
            if let Some(remote) = &self.remote {
                remote.clear().await;
            }
        }
        if level == CacheLevel::All {
            self.metrics.reset();
        }

        info!(component = "coordinator", %level, "cache cleared");
        if self.events.has_listeners(CacheEventKind::Clear) {
            self.events.emit(&CacheEvent::clear(level));
        }
    }

    /// Sweep expired entries from every tier
    pub async fn cleanup(&self) -> CleanupReport {
        let l1 = self.l1.cleanup();
        let l2 = self.l2.as_ref().map_or(0, EntryStore::cleanup);
        let l3 = match &self.remote {
            Some(remote) => remote.purge_expired().await,
            None => 0,
        };
        let report = CleanupReport {
            l1,
            l2,
            l3,
            total: l1 + l2 + l3,
        };
        if report.total > 0 {
            debug!(component = "coordinator", l1, l2, l3, "expired entries removed");
        }
        report
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Subscribe to notifications of one kind
    pub fn on(&self, kind: CacheEventKind, handler: EventHandler) -> ListenerId {
        self.events.on(kind, handler)
    }

    /// Unsubscribe
    pub fn off(&self, kind: CacheEventKind, id: ListenerId) -> bool {
        self.events.off(kind, id)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Shared metrics collector
    pub fn metrics_handle(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    pub fn l1(&self) -> &EntryStore {
        &self.l1
    }

    pub fn l2(&self) -> Option<&EntryStore> {
        self.l2.as_ref()
    }

    pub fn remote(&self) -> Option<&Arc<RemoteFacade>> {
        self.remote.as_ref()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.config.ttl
    }

    /// Estimated bytes held by the in-process tiers
    pub fn memory_bytes(&self) -> u64 {
        self.l1.size_bytes() + self.l2.as_ref().map_or(0, EntryStore::size_bytes)
    }

    /// Entries held by the in-process tiers
    pub fn total_cached_entries(&self) -> usize {
        self.l1.len() + self.l2.as_ref().map_or(0, EntryStore::len)
    }

    /// Live entries of the in-process tiers, one per key (Tier-1 copy wins)
    pub fn local_entries(&self) -> Vec<CacheEntry> {
        let mut entries = self.l1.entries();
        if let Some(l2) = &self.l2 {
            let seen: std::collections::HashSet<String> =
                entries.iter().map(|e| e.key().to_string()).collect();
            entries.extend(l2.entries().into_iter().filter(|e| !seen.contains(e.key())));
        }
        entries
    }

    /// Seconds until the next entry in Tier-1 expires (diagnostics)
    pub fn next_expiry_in(&self) -> Option<Duration> {
        let now = Utc::now();
        self.l1
            .entries()
            .iter()
            .filter_map(|e| e.remaining_ttl(now))
            .min()
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("l1_entries", &self.l1.len())
            .field("l2_entries", &self.l2.as_ref().map(EntryStore::len))
            .field("remote", &self.remote)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
