//! Adaptive Optimizer
//!
//! Wraps the coordinator's `get`/`set` to learn per-key usage:
//! - adaptive TTL: the policy TTL is stretched for hot keys and shortened for
//!   cold ones
//! - prefetch: a hit pulls related keys into Tier-1 through a bounded pool of
//!   fire-and-forget workers
//! - pruning: idle, rarely used patterns are dropped periodically
//!
//! The optimizer never touches entries directly; everything goes through
//! the coordinator.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::entry::to_delta;
use super::manager::{CacheManager, SetOptions};
use super::metrics::LatencyTracker;
use super::policy::DataType;
use super::warming::{UsageObservation, UsageSource};
use crate::error::{Error, Result};

/// Weight of the newest sample in the latency moving average
const LATENCY_ALPHA: f64 = 0.1;

/// Access timestamps kept per key
const MAX_RECENT_ACCESSES: usize = 256;

// =============================================================================
// Configuration
// =============================================================================

/// Optimizer configuration
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Learn from accesses; when off, reads and writes pass straight through
    /// with no tracking, adaptive TTL or prefetch
    pub enabled: bool,
    /// Prefetch workers allowed at once
    pub prefetch_concurrency: usize,
    /// Candidates per triggering hit
    pub max_prefetch: usize,
    /// Keys accessed this recently are prefetch candidates
    pub recent_window: Duration,
    /// Window over which access frequency is measured
    pub frequency_window: Duration,
    /// Accesses per second above which a key is hot
    pub high_frequency: f64,
    /// Accesses per second below which a key is cold
    pub low_frequency: f64,
    /// TTL multiplier for hot keys
    pub extend_factor: f64,
    /// TTL multiplier for cold keys
    pub shrink_factor: f64,
    /// Pruning period
    pub prune_interval: Duration,
    /// Idle time after which a pattern may be pruned
    pub inactivity_window: Duration,
    /// Patterns with at most this many accesses are prunable
    pub prune_max_access: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefetch_concurrency: 4,
            max_prefetch: 5,
            recent_window: Duration::from_secs(5),
            frequency_window: Duration::from_secs(10),
            high_frequency: 1.0,
            low_frequency: 0.1,
            extend_factor: 1.5,
            shrink_factor: 0.5,
            prune_interval: Duration::from_secs(5 * 60),
            inactivity_window: Duration::from_secs(30 * 60),
            prune_max_access: 5,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.prefetch_concurrency == 0 {
            return Err(Error::Config("prefetch concurrency must be greater than zero".into()));
        }
        if self.frequency_window.is_zero() || self.prune_interval.is_zero() {
            return Err(Error::Config("optimizer windows must be greater than zero".into()));
        }
        if !(self.extend_factor > 0.0 && self.shrink_factor > 0.0) {
            return Err(Error::Config("TTL factors must be positive".into()));
        }
        if self.low_frequency > self.high_frequency {
            return Err(Error::Config(format!(
                "low frequency {} exceeds high frequency {}",
                self.low_frequency, self.high_frequency
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Usage patterns
// =============================================================================

/// Importance of a key, derived from its access count
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn from_access_count(count: u64) -> Self {
        match count {
            c if c > 50 => Priority::Critical,
            c if c > 20 => Priority::High,
            c if c > 5 => Priority::Medium,
            _ => Priority::Low,
        }
    }
}

/// Observed usage of one key
#[derive(Debug, Clone)]
pub struct UsagePattern {
    pub key: String,
    pub access_count: u64,
    /// Moving average of read latency in microseconds
    pub avg_latency_us: f64,
    pub first_accessed_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub predicted_next_access_at: Option<DateTime<Utc>>,
    pub data_type: Option<DataType>,
    pub priority: Priority,
    recent: VecDeque<DateTime<Utc>>,
}

impl UsagePattern {
    fn new(key: &str, now: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            access_count: 0,
            avg_latency_us: 0.0,
            first_accessed_at: now,
            last_accessed_at: now,
            predicted_next_access_at: None,
            data_type: None,
            priority: Priority::Low,
            recent: VecDeque::new(),
        }
    }

    fn record(&mut self, now: DateTime<Utc>, latency: Option<Duration>, window: Duration) {
        self.access_count += 1;
        self.last_accessed_at = now;
        self.priority = Priority::from_access_count(self.access_count);

        if let Some(latency) = latency {
            let sample = latency.as_micros() as f64;
            self.avg_latency_us = if self.access_count == 1 {
                sample
            } else {
                LATENCY_ALPHA * sample + (1.0 - LATENCY_ALPHA) * self.avg_latency_us
            };
        }

        if self.access_count > 1 {
            let span = now - self.first_accessed_at;
            let gap = span / i32::try_from(self.access_count - 1).unwrap_or(i32::MAX);
            self.predicted_next_access_at = Some(now + gap);
        }

        self.recent.push_back(now);
        let cutoff = now - to_delta(window);
        while self.recent.len() > MAX_RECENT_ACCESSES
            || self.recent.front().is_some_and(|t| *t < cutoff)
        {
            self.recent.pop_front();
        }
    }

    /// Accesses per second within `window`; the elapsed span is floored at
    /// one second so a burst of fresh accesses is not over-weighted
    pub fn frequency(&self, now: DateTime<Utc>, window: Duration) -> f64 {
        let cutoff = now - to_delta(window);
        let recent = self.recent.iter().filter(|t| **t >= cutoff).count() as f64;
        let span = (now - self.first_accessed_at)
            .to_std()
            .unwrap_or_default()
            .min(window)
            .as_secs_f64()
            .max(1.0);
        recent / span
    }

    /// Time since the last access
    pub fn idle(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_accessed_at).to_std().unwrap_or_default()
    }
}

// =============================================================================
// Optimizer
// =============================================================================

/// Optimizer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OptimizerStats {
    pub patterns_tracked: usize,
    pub prefetches_launched: u64,
    pub prefetches_deduplicated: u64,
    pub prefetches_completed: u64,
    pub patterns_pruned: u64,
}

/// Usage-driven wrapper around the coordinator
pub struct AdaptiveOptimizer {
    cache: Arc<CacheManager>,
    config: OptimizerConfig,
    patterns: DashMap<String, UsagePattern>,
    in_flight: Arc<DashSet<String>>,
    prefetch_permits: Arc<Semaphore>,
    stopped: CancellationToken,
    prefetches_launched: AtomicU64,
    prefetches_deduplicated: AtomicU64,
    prefetches_completed: Arc<AtomicU64>,
    patterns_pruned: AtomicU64,
}

impl AdaptiveOptimizer {
    pub fn new(cache: Arc<CacheManager>, config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cache,
            prefetch_permits: Arc::new(Semaphore::new(config.prefetch_concurrency)),
            config,
            patterns: DashMap::new(),
            in_flight: Arc::new(DashSet::new()),
            stopped: CancellationToken::new(),
            prefetches_launched: AtomicU64::new(0),
            prefetches_deduplicated: AtomicU64::new(0),
            prefetches_completed: Arc::new(AtomicU64::new(0)),
            patterns_pruned: AtomicU64::new(0),
        })
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Read through the coordinator, learning from the access and
    /// prefetching related keys on a hit
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.config.enabled {
            return self.cache.get(key).await;
        }
        let tracker = LatencyTracker::start();
        let result = self.cache.get_with_tier(key).await;
        let latency = tracker.elapsed();

        let data_type = result.as_ref().and_then(|r| r.entry.metadata.data_type);
        self.record_access(key, Some(latency), data_type);

        let result = result?;
        self.prefetch_related(key);
        self.cache.decode(&result.entry)
    }

    /// Write through the coordinator with an adaptive TTL when no explicit
    /// TTL is given
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        mut options: SetOptions,
    ) {
        if !self.config.enabled {
            return self.cache.set(key, value, options).await;
        }
        let data_type = options.data_type.or(options.metadata.data_type);
        if options.ttl.is_none() {
            let base = self.cache.ttl_policy().ttl_for(data_type);
            options.ttl = Some(self.adaptive_ttl(key, base));
        }
        if let Some(data_type) = data_type {
            self.patterns
                .entry(key.to_string())
                .or_insert_with(|| UsagePattern::new(key, Utc::now()))
                .data_type = Some(data_type);
        }
        self.cache.set(key, value, options).await;
    }

    /// Scale `base` by how often `key` has been read recently
    pub fn adaptive_ttl(&self, key: &str, base: Duration) -> Duration {
        let Some(pattern) = self.patterns.get(key) else {
            return base;
        };
        let frequency = pattern.frequency(Utc::now(), self.config.frequency_window);
        if frequency > self.config.high_frequency {
            base.mul_f64(self.config.extend_factor)
        } else if frequency < self.config.low_frequency {
            base.mul_f64(self.config.shrink_factor)
        } else {
            base
        }
    }

    fn record_access(&self, key: &str, latency: Option<Duration>, data_type: Option<DataType>) {
        let now = Utc::now();
        let mut pattern = self
            .patterns
            .entry(key.to_string())
            .or_insert_with(|| UsagePattern::new(key, now));
        pattern.record(now, latency, self.config.frequency_window);
        if data_type.is_some() {
            pattern.data_type = data_type;
        }
    }

    /// Keys worth prefetching after a hit on `key`: same data type, recently
    /// used, or historically hot. Most important first, capped.
    pub fn prefetch_candidates(&self, key: &str) -> Vec<String> {
        let now = Utc::now();
        let data_type = self.patterns.get(key).and_then(|p| p.data_type);

        let mut candidates: Vec<(Priority, u64, String)> = self
            .patterns
            .iter()
            .filter(|p| p.key != key)
            .filter(|p| {
                (data_type.is_some() && p.data_type == data_type)
                    || p.idle(now) <= self.config.recent_window
                    || p.frequency(now, self.config.frequency_window) > self.config.high_frequency
            })
            .map(|p| (p.priority, p.access_count, p.key.clone()))
            .collect();

        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        candidates
            .into_iter()
            .map(|(_, _, k)| k)
            .filter(|k| !self.cache.l1().has(k))
            .take(self.config.max_prefetch)
            .collect()
    }

    fn prefetch_related(&self, key: &str) {
        if self.stopped.is_cancelled() {
            return;
        }
        for candidate in self.prefetch_candidates(key) {
            self.launch_prefetch(candidate);
        }
    }

    /// Spawn one prefetch worker unless the key is already in flight
    fn launch_prefetch(&self, key: String) -> bool {
        if !self.in_flight.insert(key.clone()) {
            self.prefetches_deduplicated.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.prefetches_launched.fetch_add(1, Ordering::Relaxed);

        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);
        let permits = Arc::clone(&self.prefetch_permits);
        let completed = Arc::clone(&self.prefetches_completed);
        let stopped = self.stopped.clone();

        tokio::spawn(async move {
            if let Ok(_permit) = permits.acquire_owned().await {
                if !stopped.is_cancelled() && !cache.l1().has(&key) {
                    // nothing is written until the lookup is back and the
                    // optimizer is still running
                    let found = cache.find_below_l1(&key).await;
                    if stopped.is_cancelled() {
                        debug!(component = "optimizer", key = %key, "prefetch discarded");
                    } else {
                        let tier = found.map(|(entry, tier)| {
                            cache.install_promoted(&entry, tier);
                            tier
                        });
                        completed.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            component = "optimizer",
                            key = %key,
                            tier = ?tier,
                            "prefetch finished"
                        );
                    }
                }
            }
            in_flight.remove(&key);
        });
        true
    }

    /// Drop patterns idle beyond the inactivity window with few accesses
    pub fn prune(&self) -> usize {
        let now = Utc::now();
        let before = self.patterns.len();
        self.patterns.retain(|_, p| {
            p.idle(now) <= self.config.inactivity_window
                || p.access_count > self.config.prune_max_access
        });
        let pruned = before.saturating_sub(self.patterns.len());
        if pruned > 0 {
            self.patterns_pruned.fetch_add(pruned as u64, Ordering::Relaxed);
            info!(
                component = "optimizer",
                pruned,
                remaining = self.patterns.len(),
                "usage patterns pruned"
            );
        }
        pruned
    }

    pub fn pattern(&self, key: &str) -> Option<UsagePattern> {
        self.patterns.get(key).map(|p| p.clone())
    }

    pub fn patterns(&self) -> Vec<UsagePattern> {
        self.patterns.iter().map(|p| p.clone()).collect()
    }

    pub fn stats(&self) -> OptimizerStats {
        OptimizerStats {
            patterns_tracked: self.patterns.len(),
            prefetches_launched: self.prefetches_launched.load(Ordering::Relaxed),
            prefetches_deduplicated: self.prefetches_deduplicated.load(Ordering::Relaxed),
            prefetches_completed: self.prefetches_completed.load(Ordering::Relaxed),
            patterns_pruned: self.patterns_pruned.load(Ordering::Relaxed),
        }
    }

    /// Stop launching prefetches; workers already running finish their
    /// lookup but write nothing
    pub fn stop(&self) {
        self.stopped.cancel();
    }

    /// Run the pruning job until `shutdown` fires
    #[instrument(skip_all, fields(component = "optimizer"))]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(interval = ?self.config.prune_interval, "starting usage pattern pruning");
        let mut tick = interval(self.config.prune_interval);
        // the first tick fires immediately
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.prune();
                }
                _ = shutdown.cancelled() => {
                    info!("optimizer shutting down");
                    self.stop();
                    break;
                }
            }
        }
    }
}

impl UsageSource for AdaptiveOptimizer {
    fn observations(&self) -> Vec<UsageObservation> {
        let now = Utc::now();
        self.patterns
            .iter()
            .map(|p| UsageObservation {
                key: p.key.clone(),
                frequency: p.frequency(now, self.config.frequency_window),
                last_used_at: p.last_accessed_at,
                data_type: p.data_type,
            })
            .collect()
    }
}

impl std::fmt::Debug for AdaptiveOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveOptimizer")
            .field("patterns", &self.patterns.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_backend::InMemoryBackend;
    use crate::cache::manager::CacheConfig;
    use crate::domain::ports::{CacheLevel, RemoteBackend};

    fn optimizer(config: OptimizerConfig) -> AdaptiveOptimizer {
        let cache = Arc::new(CacheManager::new(CacheConfig::default()).unwrap());
        AdaptiveOptimizer::new(cache, config).unwrap()
    }

    fn age(optimizer: &AdaptiveOptimizer, key: &str, by: chrono::Duration) {
        let mut p = optimizer.patterns.get_mut(key).unwrap();
        p.first_accessed_at = p.first_accessed_at - by;
        p.last_accessed_at = p.last_accessed_at - by;
        for t in p.recent.iter_mut() {
            *t = *t - by;
        }
    }

    #[test]
    fn test_priority_thresholds() {
        assert_eq!(Priority::from_access_count(5), Priority::Low);
        assert_eq!(Priority::from_access_count(6), Priority::Medium);
        assert_eq!(Priority::from_access_count(21), Priority::High);
        assert_eq!(Priority::from_access_count(51), Priority::Critical);
    }

    #[tokio::test]
    async fn test_pattern_tracks_accesses() {
        let opt = optimizer(OptimizerConfig::default());
        opt.cache()
            .set("k", &1, SetOptions::typed(DataType::QueryResult))
            .await;

        for _ in 0..7 {
            assert_eq!(opt.get::<u32>("k").await, Some(1));
        }
        let pattern = opt.pattern("k").unwrap();
        assert_eq!(pattern.access_count, 7);
        assert_eq!(pattern.priority, Priority::Medium);
        assert_eq!(pattern.data_type, Some(DataType::QueryResult));
        assert!(pattern.predicted_next_access_at.is_some());
    }

    #[tokio::test]
    async fn test_adaptive_ttl() {
        let opt = optimizer(OptimizerConfig::default());
        let base = Duration::from_secs(300);

        // hot: five reads within the first second
        for _ in 0..5 {
            opt.get::<u32>("hot").await;
        }
        assert_eq!(opt.adaptive_ttl("hot", base), Duration::from_secs(450));

        // one read just now is exactly 1/s: unchanged
        opt.get::<u32>("warm").await;
        assert_eq!(opt.adaptive_ttl("warm", base), base);

        // one read long ago
        opt.get::<u32>("cold").await;
        age(&opt, "cold", chrono::Duration::seconds(60));
        assert_eq!(opt.adaptive_ttl("cold", base), Duration::from_secs(150));

        assert_eq!(opt.adaptive_ttl("unknown", base), base);
    }

    #[tokio::test]
    async fn test_set_applies_adaptive_ttl_unless_explicit() {
        let opt = optimizer(OptimizerConfig::default());
        for _ in 0..5 {
            opt.get::<u32>("hot").await;
        }
        opt.set("hot", &1, SetOptions::typed(DataType::ApiResponse)).await;
        let entry = opt.cache().l1().get("hot").unwrap();
        assert_eq!((entry.expires_at() - entry.created_at()).num_seconds(), 90);

        let explicit = SetOptions::typed(DataType::ApiResponse).with_ttl(Duration::from_secs(10));
        opt.set("hot", &1, explicit).await;
        let entry = opt.cache().l1().get("hot").unwrap();
        assert_eq!((entry.expires_at() - entry.created_at()).num_seconds(), 10);
    }

    #[tokio::test]
    async fn test_hit_prefetches_related_keys() {
        let opt = optimizer(OptimizerConfig::default());
        let cache = Arc::clone(opt.cache());
        for key in ["a", "b"] {
            cache
                .set(key, &1, SetOptions::typed(DataType::AgentResponse).at_level(CacheLevel::L2))
                .await;
        }
        opt.get::<u32>("b").await;
        cache.l1().delete("b");

        opt.get::<u32>("a").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(cache.l1().has("b"));
        let stats = opt.stats();
        assert_eq!(stats.prefetches_launched, 1);
        assert_eq!(stats.prefetches_completed, 1);
    }

    #[tokio::test]
    async fn test_candidates_capped_and_exclude_trigger() {
        let opt = optimizer(OptimizerConfig::default());
        for i in 0..10 {
            opt.get::<u32>(&format!("k{}", i)).await;
        }
        let candidates = opt.prefetch_candidates("k0");
        assert_eq!(candidates.len(), 5);
        assert!(!candidates.contains(&"k0".to_string()));
    }

    #[tokio::test]
    async fn test_in_flight_prefetch_is_deduplicated() {
        let opt = optimizer(OptimizerConfig::default());
        opt.in_flight.insert("busy".to_string());

        assert!(!opt.launch_prefetch("busy".to_string()));
        assert_eq!(opt.stats().prefetches_deduplicated, 1);
        assert_eq!(opt.stats().prefetches_launched, 0);
    }

    #[tokio::test]
    async fn test_stopped_optimizer_launches_nothing() {
        let opt = optimizer(OptimizerConfig::default());
        opt.get::<u32>("x").await;
        opt.stop();
        opt.cache().set("y", &1, SetOptions::default()).await;
        opt.get::<u32>("y").await;
        assert_eq!(opt.stats().prefetches_launched, 0);
    }

    #[tokio::test]
    async fn test_prefetch_in_flight_at_stop_writes_nothing() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut config = CacheConfig::default();
        config.remote.enabled = true;
        let remote: Arc<dyn RemoteBackend> = backend.clone();
        let cache = Arc::new(CacheManager::with_backend(config, Some(remote)).unwrap());
        cache.remote().unwrap().connect().await;
        let opt = AdaptiveOptimizer::new(Arc::clone(&cache), OptimizerConfig::default()).unwrap();

        let typed = SetOptions::typed(DataType::AgentResponse);
        opt.set("remote-only", &1, typed.clone().at_level(CacheLevel::L3)).await;
        opt.set("trigger", &1, typed.at_level(CacheLevel::L1)).await;
        backend.set_latency(Some(Duration::from_millis(50)));

        opt.get::<u32>("trigger").await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        opt.stop();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!cache.l1().has("remote-only"));
        assert!(cache.l2().map_or(true, |l2| !l2.has("remote-only")));
        let stats = opt.stats();
        assert_eq!(stats.prefetches_launched, 1);
        assert_eq!(stats.prefetches_completed, 0);
        assert_eq!(cache.metrics().promotions_l3_to_l2, 0);
    }

    #[tokio::test]
    async fn test_disabled_optimizer_tracks_nothing() {
        let opt = optimizer(OptimizerConfig {
            enabled: false,
            ..Default::default()
        });
        opt.set("k", &1, SetOptions::typed(DataType::ApiResponse)).await;
        assert_eq!(opt.get::<u32>("k").await, Some(1));
        assert_eq!(opt.get::<u32>("missing").await, None);

        assert!(opt.patterns().is_empty());
        assert_eq!(opt.stats().prefetches_launched, 0);
    }

    #[test]
    fn test_prediction_survives_huge_access_counts() {
        let now = Utc::now();
        let mut pattern = UsagePattern::new("k", now - chrono::Duration::hours(1));
        pattern.access_count = u64::from(u32::MAX) + 1;
        pattern.record(now, None, Duration::from_secs(10));
        assert!(pattern.predicted_next_access_at.unwrap() >= now);
    }

    #[tokio::test]
    async fn test_prune_removes_idle_low_count_patterns() {
        let opt = optimizer(OptimizerConfig::default());
        opt.get::<u32>("idle").await;
        for _ in 0..10 {
            opt.get::<u32>("busy").await;
        }
        opt.get::<u32>("fresh").await;
        age(&opt, "idle", chrono::Duration::hours(1));
        age(&opt, "busy", chrono::Duration::hours(1));

        assert_eq!(opt.prune(), 1);
        assert!(opt.pattern("idle").is_none());
        assert!(opt.pattern("busy").is_some());
        assert!(opt.pattern("fresh").is_some());
        assert_eq!(opt.stats().patterns_pruned, 1);
    }

    #[tokio::test]
    async fn test_observations_feed_warming() {
        let opt = optimizer(OptimizerConfig::default());
        opt.get::<u32>("k").await;
        let observations = opt.observations();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].key, "k");
        assert!(observations[0].frequency > 0.0);
    }

    #[test]
    fn test_invalid_config() {
        let config = OptimizerConfig {
            prefetch_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
