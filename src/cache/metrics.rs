//! Cache Metrics Collection
//!
//! Process-wide counters shared by every tier. Incremented on every
//! operation, reset only by an explicit clear of all tiers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use super::policy::DataType;

#[derive(Debug, Default)]
struct TypeCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // Process-wide counters
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,

    // Which tier served the hit
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    l3_hits: AtomicU64,

    // Promotion tracking
    promotions_l2_to_l1: AtomicU64,
    promotions_l3_to_l2: AtomicU64,

    // Access latency (microseconds, exponential moving average)
    access_latency_us: AtomicU64,

    per_type: DashMap<DataType, TypeCounters>,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    // Tier hits
    pub fn record_l1_hit(&self) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_hit(&self) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l3_hit(&self) {
        self.l3_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_promotion_l2_to_l1(&self) {
        self.promotions_l2_to_l1.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_promotion_l3_to_l2(&self) {
        self.promotions_l3_to_l2.fetch_add(1, Ordering::Relaxed);
    }

    /// Per-type hit (type taken from the served entry)
    pub fn record_type_hit(&self, data_type: Option<DataType>) {
        if let Some(t) = data_type {
            self.per_type
                .entry(t)
                .or_default()
                .hits
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Per-type miss (only known when an expired entry of that type was found)
    pub fn record_type_miss(&self, data_type: Option<DataType>) {
        if let Some(t) = data_type {
            self.per_type
                .entry(t)
                .or_default()
                .misses
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_access_latency(&self, duration: Duration) {
        let new_us = duration.as_micros() as u64;
        let alpha = 0.1; // EMA smoothing factor

        loop {
            let current = self.access_latency_us.load(Ordering::Relaxed);
            let updated = if current == 0 {
                new_us.max(1)
            } else {
                ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
            };

            if self
                .access_latency_us
                .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn access_latency(&self) -> Duration {
        Duration::from_micros(self.access_latency_us.load(Ordering::Relaxed))
    }

    /// Hit rate in percent (0 when nothing has been read)
    pub fn hit_rate(&self) -> f64 {
        hit_rate_percent(self.hits(), self.misses())
    }

    /// Per-type hit statistics
    pub fn type_stats(&self) -> BTreeMap<DataType, TypeHitStats> {
        self.per_type
            .iter()
            .map(|e| {
                (
                    *e.key(),
                    TypeHitStats {
                        hits: e.value().hits.load(Ordering::Relaxed),
                        misses: e.value().misses.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.hits();
        let misses = self.misses();
        MetricsSnapshot {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            errors: self.errors(),
            hit_rate: hit_rate_percent(hits, misses),
            avg_access_latency_us: self.access_latency_us.load(Ordering::Relaxed),
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            l3_hits: self.l3_hits.load(Ordering::Relaxed),
            promotions_l2_to_l1: self.promotions_l2_to_l1.load(Ordering::Relaxed),
            promotions_l3_to_l2: self.promotions_l3_to_l2.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.sets,
            &self.deletes,
            &self.evictions,
            &self.errors,
            &self.l1_hits,
            &self.l2_hits,
            &self.l3_hits,
            &self.promotions_l2_to_l1,
            &self.promotions_l3_to_l2,
            &self.access_latency_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.per_type.clear();
    }
}

fn hit_rate_percent(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64 * 100.0
    }
}

/// Hits and misses attributed to one data type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeHitStats {
    pub hits: u64,
    pub misses: u64,
}

impl TypeHitStats {
    /// Hit rate in percent, `None` when the type has not been read
    pub fn hit_rate(&self) -> Option<f64> {
        if self.hits + self.misses == 0 {
            None
        } else {
            Some(hit_rate_percent(self.hits, self.misses))
        }
    }
}

/// Snapshot of all cache metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub evictions: u64,
    pub errors: u64,
    /// hits / (hits + misses), percent
    pub hit_rate: f64,
    pub avg_access_latency_us: u64,

    // Tier breakdown
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub l3_hits: u64,
    pub promotions_l2_to_l1: u64,
    pub promotions_l3_to_l2: u64,
}

impl MetricsSnapshot {
    /// Total reads observed
    pub fn reads(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Latency tracker helper
pub struct LatencyTracker {
    start: Instant,
}

impl LatencyTracker {
    /// Start tracking latency
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

// =============================================================================
// Tests
// =============================================================================
