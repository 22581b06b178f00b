//! Analytics Engine
//!
//! Aggregates metrics, ranks hot keys, buckets entries by data type and
//! derives rule-based tuning recommendations.
//!
//! Rules run in a fixed order and each fires at most once:
//!
//! 1. hit rate below `low_hit_rate` - suggest longer TTLs
//! 2. hit rate above `optimal_hit_rate` - report optimal
//! 3. estimated memory above the budget - suggest shrinking size or TTL
//! 4. any data type below `low_type_hit_rate` - flag those types
//!
//! When nothing fires a single "performance is optimal" message is emitted.
//! Rules 1 and 2 are skipped until at least one read has happened.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::entry::CacheEntry;
use super::manager::CacheManager;
use super::metrics::{MetricsSnapshot, TypeHitStats};
use super::policy::DataType;
use crate::error::{Error, Result};

/// Analytics thresholds
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Number of hot keys reported
    pub top_n: usize,
    /// Memory budget for the in-process tiers
    pub memory_budget_bytes: u64,
    /// Below this hit rate (percent) longer TTLs are suggested
    pub low_hit_rate: f64,
    /// Above this hit rate (percent) the cache is reported optimal
    pub optimal_hit_rate: f64,
    /// Below this per-type hit rate (percent) the type is flagged
    pub low_type_hit_rate: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            memory_budget_bytes: 64 * 1024 * 1024,
            low_hit_rate: 60.0,
            optimal_hit_rate: 90.0,
            low_type_hit_rate: 50.0,
        }
    }
}

impl AnalyticsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(Error::Config("analytics top_n must be greater than zero".into()));
        }
        if self.low_hit_rate > self.optimal_hit_rate {
            return Err(Error::Config(
                "low hit rate threshold must not exceed the optimal threshold".into(),
            ));
        }
        Ok(())
    }
}

/// One hot key
#[derive(Debug, Clone, Serialize)]
pub struct KeyStats {
    pub key: String,
    pub access_count: u64,
    pub last_accessed_at: DateTime<Utc>,
    pub data_type: Option<DataType>,
    pub size_bytes: u64,
    pub expires_at: DateTime<Utc>,
}

impl From<&CacheEntry> for KeyStats {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key().to_string(),
            access_count: entry.access_count(),
            last_accessed_at: entry.last_accessed_at(),
            data_type: entry.metadata.data_type,
            size_bytes: entry.size(),
            expires_at: entry.expires_at(),
        }
    }
}

/// Per-type bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeBreakdown {
    pub data_type: DataType,
    pub entries: usize,
    pub size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    /// Percent, `None` until the type has been read
    pub hit_rate: Option<f64>,
}

/// Tuning recommendation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    /// Hit rate is low; longer TTLs would help
    IncreaseTtl { hit_rate: f64 },
    /// Hit rate is already high
    Optimal { hit_rate: f64 },
    /// Estimated memory is over budget
    ReduceMemory { memory_bytes: u64, budget_bytes: u64 },
    /// These types are hit less than they miss
    LowTypeHitRate { types: Vec<DataType> },
    /// No rule fired
    PerformanceOptimal,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::IncreaseTtl { hit_rate } => write!(
                f,
                "Low hit rate ({:.1}%): consider increasing TTL for frequently read data",
                hit_rate
            ),
            Recommendation::Optimal { hit_rate } => {
                write!(f, "Hit rate is optimal ({:.1}%)", hit_rate)
            }
            Recommendation::ReduceMemory {
                memory_bytes,
                budget_bytes,
            } => write!(
                f,
                "Memory usage {} bytes exceeds budget of {} bytes: reduce cache size or TTL",
                memory_bytes, budget_bytes
            ),
            Recommendation::LowTypeHitRate { types } => {
                let names: Vec<&str> = types.iter().map(DataType::name).collect();
                write!(f, "Low hit rate for data types: {}", names.join(", "))
            }
            Recommendation::PerformanceOptimal => f.write_str("Cache performance is optimal"),
        }
    }
}

/// Full analytics report
#[derive(Debug, Clone, Serialize)]
pub struct CacheAnalytics {
    pub metrics: MetricsSnapshot,
    pub top_keys: Vec<KeyStats>,
    pub type_breakdown: Vec<TypeBreakdown>,
    pub recommendations: Vec<Recommendation>,
    pub memory_bytes: u64,
    pub generated_at: DateTime<Utc>,
}

/// Rank entries by access count, most recently accessed first on ties
pub fn top_keys(entries: &[CacheEntry], n: usize) -> Vec<KeyStats> {
    let mut ranked: Vec<&CacheEntry> = entries.iter().collect();
    ranked.sort_by(|a, b| {
        b.access_count()
            .cmp(&a.access_count())
            .then_with(|| b.last_accessed_at().cmp(&a.last_accessed_at()))
    });
    ranked.into_iter().take(n).map(KeyStats::from).collect()
}

/// Bucket entries and per-type hit statistics by data type
pub fn type_breakdown(
    entries: &[CacheEntry],
    type_stats: &BTreeMap<DataType, TypeHitStats>,
) -> Vec<TypeBreakdown> {
    let mut buckets: BTreeMap<DataType, (usize, u64)> = BTreeMap::new();
    for entry in entries {
        if let Some(t) = entry.metadata.data_type {
            let bucket = buckets.entry(t).or_default();
            bucket.0 += 1;
            bucket.1 += entry.size();
        }
    }
    for t in type_stats.keys() {
        buckets.entry(*t).or_default();
    }

    buckets
        .into_iter()
        .map(|(data_type, (entries, size_bytes))| {
            let stats = type_stats.get(&data_type).copied().unwrap_or_default();
            TypeBreakdown {
                data_type,
                entries,
                size_bytes,
                hits: stats.hits,
                misses: stats.misses,
                hit_rate: stats.hit_rate(),
            }
        })
        .collect()
}

/// Evaluate the recommendation rules
pub fn recommend(
    metrics: &MetricsSnapshot,
    breakdown: &[TypeBreakdown],
    memory_bytes: u64,
    config: &AnalyticsConfig,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if metrics.reads() > 0 {
        if metrics.hit_rate < config.low_hit_rate {
            out.push(Recommendation::IncreaseTtl {
                hit_rate: metrics.hit_rate,
            });
        }
        if metrics.hit_rate > config.optimal_hit_rate {
            out.push(Recommendation::Optimal {
                hit_rate: metrics.hit_rate,
            });
        }
    }

    if memory_bytes > config.memory_budget_bytes {
        out.push(Recommendation::ReduceMemory {
            memory_bytes,
            budget_bytes: config.memory_budget_bytes,
        });
    }

    let low_types: Vec<DataType> = breakdown
        .iter()
        .filter(|b| b.hit_rate.is_some_and(|r| r < config.low_type_hit_rate))
        .map(|b| b.data_type)
        .collect();
    if !low_types.is_empty() {
        out.push(Recommendation::LowTypeHitRate { types: low_types });
    }

    if out.is_empty() {
        out.push(Recommendation::PerformanceOptimal);
    }
    out
}

impl CacheManager {
    /// Metrics, hot keys, per-type breakdown and recommendations.
    ///
    /// Hot keys and type buckets cover the in-process tiers; remote envelopes
    /// carry no access bookkeeping.
    pub fn analytics(&self) -> CacheAnalytics {
        let config = &self.config().analytics;
        let metrics = self.metrics.snapshot();
        let entries = self.local_entries();
        let memory_bytes = self.memory_bytes();

        let top_keys = top_keys(&entries, config.top_n);
        let type_breakdown = type_breakdown(&entries, &self.metrics.type_stats());
        let recommendations = recommend(&metrics, &type_breakdown, memory_bytes, config);

        CacheAnalytics {
            metrics,
            top_keys,
            type_breakdown,
            recommendations,
            memory_bytes,
            generated_at: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::EntryMetadata;
    use crate::cache::manager::{CacheConfig, SetOptions};
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use std::time::Duration;

    fn snapshot(hits: u64, misses: u64) -> MetricsSnapshot {
        let reads = hits + misses;
        MetricsSnapshot {
            hits,
            misses,
            hit_rate: if reads == 0 { 0.0 } else { hits as f64 / reads as f64 * 100.0 },
            ..Default::default()
        }
    }

    #[test]
    fn test_low_hit_rate() {
        let recs = recommend(&snapshot(40, 60), &[], 0, &AnalyticsConfig::default());
        assert_eq!(recs.len(), 1);
        assert_matches!(
            recs[0],
            Recommendation::IncreaseTtl { hit_rate } if (hit_rate - 40.0).abs() < 1e-9
        );
        assert!(recs[0].to_string().starts_with("Low hit rate"));
    }

    #[test]
    fn test_optimal_hit_rate() {
        let recs = recommend(&snapshot(95, 5), &[], 0, &AnalyticsConfig::default());
        assert_eq!(recs.len(), 1);
        assert_matches!(recs[0], Recommendation::Optimal { .. });
    }

    #[test]
    fn test_middle_band_is_performance_optimal() {
        let recs = recommend(&snapshot(75, 25), &[], 0, &AnalyticsConfig::default());
        assert_eq!(recs, vec![Recommendation::PerformanceOptimal]);
    }

    #[test]
    fn test_no_reads_skips_hit_rate_rules() {
        let recs = recommend(&snapshot(0, 0), &[], 0, &AnalyticsConfig::default());
        assert_eq!(recs, vec![Recommendation::PerformanceOptimal]);
    }

    #[test]
    fn test_rules_fire_in_order_without_duplicates() {
        let breakdown = vec![
            TypeBreakdown {
                data_type: DataType::ApiResponse,
                entries: 1,
                size_bytes: 10,
                hits: 1,
                misses: 3,
                hit_rate: Some(25.0),
            },
            TypeBreakdown {
                data_type: DataType::QueryResult,
                entries: 1,
                size_bytes: 10,
                hits: 0,
                misses: 2,
                hit_rate: Some(0.0),
            },
        ];
        let config = AnalyticsConfig {
            memory_budget_bytes: 100,
            ..Default::default()
        };

        let recs = recommend(&snapshot(10, 90), &breakdown, 1_000, &config);
        assert_eq!(recs.len(), 3);
        assert_matches!(recs[0], Recommendation::IncreaseTtl { .. });
        assert_matches!(
            recs[1],
            Recommendation::ReduceMemory { memory_bytes: 1_000, budget_bytes: 100 }
        );
        assert_eq!(
            recs[2],
            Recommendation::LowTypeHitRate {
                types: vec![DataType::ApiResponse, DataType::QueryResult]
            }
        );
        assert!(recs[2].to_string().contains("api-response"));
    }

    #[test]
    fn test_top_keys_ordering() {
        let now = Utc::now();
        let entry = |key: &str| {
            let ttl = Duration::from_secs(60);
            CacheEntry::new(key, Bytes::from_static(b"1"), ttl, EntryMetadata::default())
        };
        let mut a = entry("a");
        let mut b = entry("b");
        let mut c = entry("c");
        a.record_access(now);
        b.record_access(now);
        b.record_access(now);
        c.record_access(now + chrono::Duration::seconds(1));

        let ranked = top_keys(&[a, b, c], 2);
        let keys: Vec<&str> = ranked.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_analytics_report() {
        let manager = CacheManager::new(CacheConfig::default()).unwrap();
        manager
            .set("api:1", &1, SetOptions::typed(DataType::ApiResponse))
            .await;
        manager
            .set("sess:1", &1, SetOptions::typed(DataType::SessionData))
            .await;
        for _ in 0..3 {
            manager.get::<u32>("api:1").await;
        }

        let report = manager.analytics();
        assert_eq!(report.top_keys[0].key, "api:1");
        assert_eq!(report.top_keys[0].access_count, 3);

        let api = report
            .type_breakdown
            .iter()
            .find(|b| b.data_type == DataType::ApiResponse)
            .unwrap();
        assert_eq!(api.entries, 1);
        assert_eq!(api.hits, 3);
        assert_eq!(report.recommendations.len(), 1);
        assert_matches!(report.recommendations[0], Recommendation::Optimal { .. });

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["recommendations"][0]["kind"], "optimal");
    }
}
