//! Warming Scheduler
//!
//! Pre-populates known or likely keys. For each target whose key is absent
//! a short-lived placeholder tagged `warmup` is written, so that a producer
//! racing on a cold start overwrites it instead of several producers
//! recomputing the same value at once.
//!
//! Three entry points:
//! - periodic cycle over the configured targets ([`CacheWarmer::run`])
//! - adaptive ranking of observed usage ([`CacheWarmer::warm_adaptive`])
//! - bulk batches with an inter-batch delay ([`CacheWarmer::warm_bulk`])

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::entry::EntryMetadata;
use super::manager::{CacheManager, SetOptions};
use super::policy::DataType;
use crate::domain::ports::CacheLevel;
use crate::error::{Error, Result};

/// Source tag on placeholder entries
pub const WARMUP_SOURCE: &str = "warmup";

// =============================================================================
// Configuration
// =============================================================================

/// Something worth warming
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupTarget {
    /// Agent id or key pattern; the cache key is `key_prefix + target`
    pub target: String,
    /// Higher runs first
    #[serde(default)]
    pub priority: u8,
    /// Overrides the configured batch size for the batch this target opens
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Tag placed on the placeholder
    #[serde(default)]
    pub data_type: Option<DataType>,
}

impl WarmupTarget {
    pub fn new(target: impl Into<String>, priority: u8) -> Self {
        Self {
            target: target.into(),
            priority,
            batch_size: None,
            data_type: None,
        }
    }
}

/// File format for statically configured targets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarmupFile {
    #[serde(default)]
    pub targets: Vec<WarmupTarget>,
}

impl WarmupFile {
    /// Parse a YAML target list
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("invalid warmup file: {}", e)))
    }
}

/// Warming configuration
#[derive(Debug, Clone)]
pub struct WarmingConfig {
    /// Run the periodic cycle
    pub enabled: bool,
    /// Cycle period
    pub interval: Duration,
    /// Lifetime of placeholder entries
    pub placeholder_ttl: Duration,
    /// Tier(s) placeholders are written to
    pub placeholder_level: CacheLevel,
    /// Targets per batch
    pub batch_size: usize,
    /// Pause between batches
    pub batch_delay: Duration,
    /// Keys warmed per adaptive pass
    pub adaptive_top_n: usize,
    /// Prefix turning a target into a cache key
    pub key_prefix: String,
    /// Static targets
    pub targets: Vec<WarmupTarget>,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(30 * 60),
            placeholder_ttl: Duration::from_secs(30),
            placeholder_level: CacheLevel::L1,
            batch_size: 10,
            batch_delay: Duration::from_millis(100),
            adaptive_top_n: 20,
            key_prefix: String::new(),
            targets: Vec::new(),
        }
    }
}

impl WarmingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("warming batch size must be greater than zero".into()));
        }
        if self.placeholder_ttl.is_zero() {
            return Err(Error::Config("warming placeholder TTL must be greater than zero".into()));
        }
        if self.interval.is_zero() {
            return Err(Error::Config("warming interval must be greater than zero".into()));
        }
        if self.targets.iter().any(|t| t.batch_size == Some(0)) {
            return Err(Error::Config("target batch size must be greater than zero".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Adaptive input
// =============================================================================

/// Observed usage of one key
#[derive(Debug, Clone, PartialEq)]
pub struct UsageObservation {
    pub key: String,
    /// Accesses per second
    pub frequency: f64,
    pub last_used_at: DateTime<Utc>,
    pub data_type: Option<DataType>,
}

impl UsageObservation {
    /// frequency / (ms since last use + 1)
    pub fn score(&self, now: DateTime<Utc>) -> f64 {
        let idle_ms = (now - self.last_used_at).num_milliseconds().max(0) as f64;
        self.frequency / (idle_ms + 1.0)
    }
}

/// Supplies usage observations for adaptive warming
pub trait UsageSource: Send + Sync {
    fn observations(&self) -> Vec<UsageObservation>;
}

/// Rank observations by score, highest first, keeping `n`
pub fn rank_observations(
    mut observations: Vec<UsageObservation>,
    now: DateTime<Utc>,
    n: usize,
) -> Vec<UsageObservation> {
    observations.sort_by(|a, b| b.score(now).total_cmp(&a.score(now)));
    observations.truncate(n);
    observations
}

// =============================================================================
// Warmer
// =============================================================================

/// Outcome of one warming pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    /// Keys examined
    pub considered: usize,
    /// Placeholders written
    pub written: usize,
    /// Keys already present
    pub skipped: usize,
}

impl WarmReport {
    fn merge(&mut self, other: WarmReport) {
        self.considered += other.considered;
        self.written += other.written;
        self.skipped += other.skipped;
    }
}

/// Cumulative warming statistics
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WarmingStats {
    pub cycles: u64,
    pub adaptive_passes: u64,
    pub placeholders_written: u64,
    pub skipped_present: u64,
}

/// Warming scheduler
pub struct CacheWarmer {
    cache: Arc<CacheManager>,
    config: WarmingConfig,
    targets: RwLock<Vec<WarmupTarget>>,
    usage: RwLock<Option<Arc<dyn UsageSource>>>,
    cycles: AtomicU64,
    adaptive_passes: AtomicU64,
    written: AtomicU64,
    skipped: AtomicU64,
}

impl CacheWarmer {
    pub fn new(cache: Arc<CacheManager>, config: WarmingConfig) -> Result<Self> {
        config.validate()?;
        let warmer = Self {
            cache,
            targets: RwLock::new(Vec::new()),
            config,
            usage: RwLock::new(None),
            cycles: AtomicU64::new(0),
            adaptive_passes: AtomicU64::new(0),
            written: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        };
        warmer.set_targets(warmer.config.targets.clone());
        Ok(warmer)
    }

    /// Feed adaptive passes from `source` on every cycle
    pub fn attach_usage_source(&self, source: Arc<dyn UsageSource>) {
        *self.usage.write() = Some(source);
    }

    /// Replace the target set
    pub fn set_targets(&self, mut targets: Vec<WarmupTarget>) {
        targets.sort_by(|a, b| b.priority.cmp(&a.priority));
        *self.targets.write() = targets;
    }

    /// Add one target, keeping priority order
    pub fn add_target(&self, target: WarmupTarget) {
        let mut targets = self.targets.write();
        let pos = targets
            .iter()
            .position(|t| t.priority < target.priority)
            .unwrap_or(targets.len());
        targets.insert(pos, target);
    }

    pub fn targets(&self) -> Vec<WarmupTarget> {
        self.targets.read().clone()
    }

    /// Cache key for a target
    pub fn key_for(&self, target: &WarmupTarget) -> String {
        format!("{}{}", self.config.key_prefix, target.target)
    }

    pub fn stats(&self) -> WarmingStats {
        WarmingStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            adaptive_passes: self.adaptive_passes.load(Ordering::Relaxed),
            placeholders_written: self.written.load(Ordering::Relaxed),
            skipped_present: self.skipped.load(Ordering::Relaxed),
        }
    }

    /// Write a placeholder under `key` unless something is already there.
    /// A producer writing concurrently always keeps its value.
    async fn warm_key(&self, key: &str, data_type: Option<DataType>) -> bool {
        let metadata = EntryMetadata {
            data_type,
            warmup: true,
            ..Default::default()
        }
        .with_source(WARMUP_SOURCE);
        let options = SetOptions {
            data_type,
            ttl: Some(self.config.placeholder_ttl),
            level: self.config.placeholder_level,
            metadata,
        };
        let placeholder = serde_json::json!({ "status": "warming" });
        if !self.cache.set_if_absent(key, &placeholder, options).await {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.written.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Process targets in batches, pausing `batch_delay` between batches
    pub async fn warm_bulk(&self, targets: &[WarmupTarget]) -> WarmReport {
        let mut report = WarmReport::default();
        let mut rest = targets;
        let mut first = true;

        while !rest.is_empty() {
            if !first && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }
            first = false;

            let size = rest[0]
                .batch_size
                .unwrap_or(self.config.batch_size)
                .clamp(1, rest.len());
            let (batch, tail) = rest.split_at(size);
            rest = tail;

            let outcomes = join_all(batch.iter().map(|target| {
                let key = self.key_for(target);
                async move { self.warm_key(&key, target.data_type).await }
            }))
            .await;
            for written in outcomes {
                report.considered += 1;
                if written {
                    report.written += 1;
                } else {
                    report.skipped += 1;
                }
            }
            debug!(component = "warming", batch = batch.len(), "warming batch done");
        }
        report
    }

    /// Warm the top-N observed keys by score
    pub async fn warm_adaptive(&self, observations: Vec<UsageObservation>) -> WarmReport {
        let ranked = rank_observations(observations, Utc::now(), self.config.adaptive_top_n);
        let mut report = WarmReport::default();
        for obs in &ranked {
            report.considered += 1;
            if self.warm_key(&obs.key, obs.data_type).await {
                report.written += 1;
            } else {
                report.skipped += 1;
            }
        }
        self.adaptive_passes.fetch_add(1, Ordering::Relaxed);
        report
    }

    /// One scheduled cycle: static targets, then adaptive candidates
    pub async fn run_cycle(&self) -> WarmReport {
        let targets = self.targets();
        let mut report = self.warm_bulk(&targets).await;

        let source = self.usage.read().clone();
        if let Some(source) = source {
            report.merge(self.warm_adaptive(source.observations()).await);
        }

        self.cycles.fetch_add(1, Ordering::Relaxed);
        info!(
            component = "warming",
            considered = report.considered,
            written = report.written,
            skipped = report.skipped,
            "warming cycle complete"
        );
        report
    }

    /// Run the periodic cycle until `shutdown` fires
    #[instrument(skip_all, fields(component = "warming"))]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval = ?self.config.interval,
            targets = self.targets.read().len(),
            "starting warming scheduler"
        );
        let mut tick = interval(self.config.interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.cancelled() => {
                    info!("warming scheduler shutting down");
                    break;
                }
            }
        }
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
    use crate::domain::ports::RemoteBackend;

    fn warmer(config: WarmingConfig) -> (Arc<CacheManager>, CacheWarmer) {
        let cache = Arc::new(CacheManager::new(CacheConfig::default()).unwrap());
        let warmer = CacheWarmer::new(Arc::clone(&cache), config).unwrap();
        (cache, warmer)
    }

    #[tokio::test]
    async fn test_placeholder_only_when_absent() {
        let (cache, warmer) = warmer(WarmingConfig {
            key_prefix: "agent:".into(),
            ..Default::default()
        });
        cache.set("agent:present", &1, SetOptions::default()).await;

        let report = warmer
            .warm_bulk(&[WarmupTarget::new("present", 1), WarmupTarget::new("cold", 1)])
            .await;
        assert_eq!(report, WarmReport { considered: 2, written: 1, skipped: 1 });

        let placeholder = cache.l1().get("agent:cold").unwrap();
        assert!(placeholder.metadata.warmup);
        assert_eq!(placeholder.metadata.source.as_deref(), Some(WARMUP_SOURCE));
        assert!(placeholder.remaining_ttl(Utc::now()).unwrap() <= Duration::from_secs(30));
        assert_eq!(cache.get::<u32>("agent:present").await, Some(1));
    }

    #[tokio::test]
    async fn test_producer_overwrites_placeholder() {
        let (cache, warmer) = warmer(WarmingConfig::default());
        warmer.warm_bulk(&[WarmupTarget::new("k", 1)]).await;

        cache.set("k", &42, SetOptions::default()).await;
        let entry = cache.l1().get("k").unwrap();
        assert!(!entry.metadata.warmup);
        assert_eq!(cache.get::<u32>("k").await, Some(42));
    }

    #[tokio::test]
    async fn test_concurrent_producer_write_is_kept() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut config = CacheConfig::default();
        config.remote.enabled = true;
        let remote: Arc<dyn RemoteBackend> = backend.clone();
        let cache = Arc::new(CacheManager::with_backend(config, Some(remote)).unwrap());
        cache.remote().unwrap().connect().await;
        backend.set_latency(Some(Duration::from_millis(50)));

        let warmer = CacheWarmer::new(
            Arc::clone(&cache),
            WarmingConfig {
                placeholder_level: CacheLevel::All,
                ..Default::default()
            },
        )
        .unwrap();
        let warmer = Arc::new(warmer);

        let warming = tokio::spawn({
            let warmer = Arc::clone(&warmer);
            async move { warmer.warm_bulk(&[WarmupTarget::new("k", 1)]).await }
        });
        // the placeholder's remote claim is in flight while the producer writes
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.set("k", &42, SetOptions::default()).await;
        let report = warming.await.unwrap();

        assert_eq!(report.written, 0);
        assert!(!cache.l1().get("k").unwrap().metadata.warmup);
        assert_eq!(cache.get::<u32>("k").await, Some(42));
    }

    #[tokio::test]
    async fn test_bulk_batches_pause_between_batches() {
        let (_, warmer) = warmer(WarmingConfig {
            batch_size: 2,
            batch_delay: Duration::from_millis(40),
            ..Default::default()
        });
        let targets: Vec<_> = (0..5).map(|i| WarmupTarget::new(format!("t{}", i), 0)).collect();

        let start = std::time::Instant::now();
        let report = warmer.warm_bulk(&targets).await;
        assert_eq!(report.written, 5);
        // three batches, two pauses
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn test_adaptive_ranking() {
        let now = Utc::now();
        let obs = |key: &str, frequency: f64, idle_ms: i64| UsageObservation {
            key: key.into(),
            frequency,
            last_used_at: now - chrono::Duration::milliseconds(idle_ms),
            data_type: None,
        };

        let ranked = rank_observations(
            vec![obs("stale-hot", 10.0, 100_000), obs("fresh", 2.0, 10), obs("cold", 0.1, 10)],
            now,
            2,
        );
        let keys: Vec<&str> = ranked.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["fresh", "cold"]);
    }

    #[tokio::test]
    async fn test_adaptive_respects_top_n() {
        let (cache, warmer) = warmer(WarmingConfig {
            adaptive_top_n: 3,
            ..Default::default()
        });
        let now = Utc::now();
        let observations = (0..10)
            .map(|i| UsageObservation {
                key: format!("k{}", i),
                frequency: i as f64,
                last_used_at: now,
                data_type: Some(DataType::AgentResponse),
            })
            .collect();

        let report = warmer.warm_adaptive(observations).await;
        assert_eq!(report.written, 3);
        assert!(cache.l1().has("k9"));
        assert!(!cache.l1().has("k0"));
    }

    #[tokio::test]
    async fn test_targets_kept_in_priority_order() {
        let (_, warmer) = warmer(WarmingConfig {
            targets: vec![WarmupTarget::new("low", 1), WarmupTarget::new("high", 9)],
            ..Default::default()
        });
        warmer.add_target(WarmupTarget::new("mid", 5));

        let order: Vec<String> = warmer.targets().into_iter().map(|t| t.target).collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_periodic_run_stops_on_shutdown() {
        let (_, warmer) = warmer(WarmingConfig {
            interval: Duration::from_millis(20),
            targets: vec![WarmupTarget::new("t", 1)],
            ..Default::default()
        });
        let warmer = Arc::new(warmer);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&warmer).run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(70)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let stats = warmer.stats();
        assert!(stats.cycles >= 2);
        assert_eq!(stats.placeholders_written, 1);
    }

    #[test]
    fn test_yaml_targets() {
        let yaml = "\
targets:
  - target: momentum-agent
    priority: 5
    batch_size: 4
    data_type: agent-response
  - target: depth
";
        let file = WarmupFile::from_yaml(yaml).unwrap();
        assert_eq!(file.targets.len(), 2);
        assert_eq!(file.targets[0].batch_size, Some(4));
        assert_eq!(file.targets[0].data_type, Some(DataType::AgentResponse));
        assert_eq!(file.targets[1].priority, 0);
    }

    #[test]
    fn test_invalid_config() {
        let cache = Arc::new(CacheManager::new(CacheConfig::default()).unwrap());
        let config = WarmingConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(CacheWarmer::new(cache, config).is_err());
    }
}
