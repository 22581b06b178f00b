//! TradeCache integration tests
//!
//! Exercised through the public API only:
//! - Feature 1: tiered reads and writes
//! - Feature 2: invalidation
//! - Feature 3: remote tier degradation
//! - Feature 4: analytics
//! - Feature 5: warming and the adaptive optimizer
//! - Feature 6: system lifecycle and observability

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tradecache::adapters::{InMemoryBackend, InMemoryEventCollector, PrometheusMetricsSink};
use tradecache::cache::{CacheConfig, CacheManager, CacheTier, DataType, SetOptions};
use tradecache::domain::ports::{ConnectionState, RemoteBackend};
use tradecache::CacheLevel;

async fn with_remote() -> (Arc<InMemoryBackend>, CacheManager) {
    let backend = Arc::new(InMemoryBackend::new());
    let mut config = CacheConfig::default();
    config.remote.enabled = true;
    let dyn_backend: Arc<dyn RemoteBackend> = backend.clone();
    let cache = CacheManager::with_backend(config, Some(dyn_backend)).unwrap();
    assert!(cache.remote().unwrap().connect().await);
    (backend, cache)
}

// =============================================================================
// Feature 1: Tiered reads and writes
// =============================================================================

mod tiering_tests {
    use super::*;
    use proptest::prelude::*;
    use tradecache::cache::store::{EntryStore, StoreConfig};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_set_then_get_returns_value(
            key in "[a-z:0-9]{1,24}",
            value in any::<i64>(),
            text in ".{0,32}",
        ) {
            tokio_test::block_on(async {
                let cache = CacheManager::new(CacheConfig::default()).unwrap();
                let stored = json!({ "n": value, "s": text });
                cache.set(&key, &stored, SetOptions::default()).await;
                let got: Option<serde_json::Value> = cache.get(&key).await;
                prop_assert_eq!(got, Some(stored));
                Ok(())
            })?;
        }
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = CacheManager::new(CacheConfig::default()).unwrap();
        cache
            .set("k", &"v", SetOptions::default().with_ttl(Duration::from_millis(50)))
            .await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(cache.get::<String>("k").await, None);
        assert_eq!(cache.metrics().misses, 1);
    }

    #[tokio::test]
    async fn test_remote_only_entry_is_promoted() {
        let (_, cache) = with_remote().await;
        cache
            .set("k", &7, SetOptions::default().at_level(CacheLevel::L3))
            .await;
        assert!(!cache.l1().has("k"));

        let result = cache.get_with_tier("k").await.unwrap();
        assert_eq!(result.tier, CacheTier::L3);
        assert!(cache.l1().has("k"));
        assert_eq!(cache.get::<u32>("k").await, Some(7));
    }

    #[test]
    fn test_capacity_evicts_earliest_inserted() {
        let store = EntryStore::new("L1", StoreConfig::with_capacity(3));
        for key in ["a", "b", "c", "d"] {
            let value = bytes::Bytes::from_static(b"1");
            store.set(key, value, Duration::from_secs(60), Default::default());
        }
        assert_eq!(store.len(), 3);
        assert!(!store.has("a"));
        assert_eq!(store.keys(), vec!["b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_end_to_end_agent_response() {
        let cache = CacheManager::new(CacheConfig::default()).unwrap();
        cache
            .set(
                "agent:x:1",
                &json!({"a": 1}),
                SetOptions::typed(DataType::AgentResponse).with_ttl(Duration::from_millis(1000)),
            )
            .await;

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(cache.get::<serde_json::Value>("agent:x:1").await, Some(json!({"a": 1})));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(cache.get::<serde_json::Value>("agent:x:1").await, None);

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
    }

    #[tokio::test]
    async fn test_events_reach_collector() {
        let cache = CacheManager::new(CacheConfig::default()).unwrap();
        let collector = InMemoryEventCollector::new();
        for kind in tradecache::CacheEventKind::ALL {
            cache.on(kind, collector.handler());
        }

        cache.set("order:1", &1, SetOptions::default()).await;
        cache.delete("order:1").await;
        cache.set("order:2", &1, SetOptions::default()).await;
        cache.invalidate_by_pattern("^order:").await;
        cache.clear(None).await;

        let kinds: Vec<&str> = collector.events().iter().map(|e| e.event_type()).collect();
        assert_eq!(kinds, vec!["set", "delete", "set", "invalidate", "clear"]);
    }
}

// =============================================================================
// Feature 2: Invalidation
// =============================================================================

mod invalidation_tests {
    use super::*;

    #[tokio::test]
    async fn test_pattern_invalidation_counts_matches() {
        let (_, cache) = with_remote().await;
        for key in ["order:1", "order:2", "order:3", "trade:1"] {
            cache.set(key, &key, SetOptions::default()).await;
        }

        assert_eq!(cache.invalidate_by_pattern("^order:").await, 3);
        assert_eq!(cache.get::<String>("trade:1").await.as_deref(), Some("trade:1"));
        assert!(!cache.has("order:1").await);
    }

    #[tokio::test]
    async fn test_expired_entries_are_not_counted() {
        let (_, cache) = with_remote().await;
        for key in ["order:1", "order:2", "order:3"] {
            cache
                .set(key, &1, SetOptions::default().with_ttl(Duration::from_millis(20)))
                .await;
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!cache.has("order:1").await);

        assert_eq!(cache.invalidate_by_pattern("^order:").await, 0);
    }

    #[tokio::test]
    async fn test_dependency_invalidation() {
        let (_, cache) = with_remote().await;
        cache
            .set("signal:btc", &1, SetOptions::default().depends_on("BTCUSDT"))
            .await;
        cache.set("signal:plain", &1, SetOptions::default()).await;

        assert_eq!(cache.invalidate_by_dependency("BTCUSDT").await, 1);
        assert!(!cache.has("signal:btc").await);
        assert!(cache.has("signal:plain").await);
    }

    #[tokio::test]
    async fn test_type_invalidation() {
        let cache = CacheManager::new(CacheConfig::default()).unwrap();
        cache
            .set("h1", &1, SetOptions::typed(DataType::HealthStatus))
            .await;
        cache
            .set("q1", &1, SetOptions::typed(DataType::QueryResult))
            .await;

        assert_eq!(cache.invalidate_by_type(DataType::HealthStatus).await, 1);
        assert!(cache.has("q1").await);
    }
}

// =============================================================================
// Feature 3: Remote tier degradation
// =============================================================================

mod degradation_tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnected_remote_behaves_as_miss() {
        let backend: Arc<dyn RemoteBackend> = Arc::new(InMemoryBackend::new());
        let mut config = CacheConfig::default();
        config.remote.enabled = true;
        let cache = CacheManager::with_backend(config, Some(backend)).unwrap();
        assert_eq!(cache.remote().unwrap().state(), ConnectionState::Disconnected);

        cache
            .set("remote-only", &1, SetOptions::default().at_level(CacheLevel::L3))
            .await;
        assert_eq!(cache.get::<u32>("remote-only").await, None);
        assert!(!cache.delete("remote-only").await);

        // local tiers keep working
        cache.set("local", &2, SetOptions::default()).await;
        assert_eq!(cache.get::<u32>("local").await, Some(2));
    }

    #[tokio::test]
    async fn test_backend_outage_is_swallowed() {
        let (backend, cache) = with_remote().await;
        cache.set("k", &1, SetOptions::default()).await;
        backend.set_available(false);

        cache
            .set("lost", &1, SetOptions::default().at_level(CacheLevel::L3))
            .await;
        assert_eq!(cache.get::<u32>("lost").await, None);
        assert_eq!(cache.get::<u32>("k").await, Some(1));
        assert!(cache.metrics().errors >= 1);
        assert_ne!(cache.remote().unwrap().state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_remote_ttl_is_rechecked_client_side() {
        let (backend, cache) = with_remote().await;
        cache
            .set(
                "short",
                &1,
                SetOptions::default()
                    .at_level(CacheLevel::L3)
                    .with_ttl(Duration::from_millis(100)),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        // the backend still holds it at second granularity
        assert!(backend.raw("tradecache:short").is_some());
        assert_eq!(cache.get::<u32>("short").await, None);
    }
}

// =============================================================================
// Feature 4: Analytics
// =============================================================================

mod analytics_tests {
    use super::*;
    use tradecache::cache::analytics::{recommend, AnalyticsConfig, Recommendation};
    use tradecache::cache::MetricsSnapshot;

    fn snapshot(hits: u64, misses: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            hits,
            misses,
            hit_rate: hits as f64 * 100.0 / (hits + misses) as f64,
            ..Default::default()
        }
    }

    #[test]
    fn test_low_hit_rate_recommendation() {
        let recs = recommend(&snapshot(40, 60), &[], 0, &AnalyticsConfig::default());
        assert_eq!(recs, vec![Recommendation::IncreaseTtl { hit_rate: 40.0 }]);
        assert!(recs[0].to_string().starts_with("Low hit rate"));
    }

    #[test]
    fn test_optimal_hit_rate_recommendation() {
        let recs = recommend(&snapshot(95, 5), &[], 0, &AnalyticsConfig::default());
        assert_eq!(recs, vec![Recommendation::Optimal { hit_rate: 95.0 }]);
    }

    #[tokio::test]
    async fn test_report_from_live_cache() {
        let cache = CacheManager::new(CacheConfig::default()).unwrap();
        cache
            .set("hot", &1, SetOptions::typed(DataType::ApiResponse))
            .await;
        cache
            .set("cold", &1, SetOptions::typed(DataType::ApiResponse))
            .await;
        for _ in 0..3 {
            cache.get::<u32>("hot").await;
        }

        let report = cache.analytics();
        assert_eq!(report.top_keys[0].key, "hot");
        let api = report
            .type_breakdown
            .iter()
            .find(|b| b.data_type == DataType::ApiResponse)
            .unwrap();
        assert_eq!(api.hits, 3);
        assert_eq!(report.recommendations, vec![Recommendation::Optimal { hit_rate: 100.0 }]);
    }
}

// =============================================================================
// Feature 5: Warming and adaptive optimizer
// =============================================================================

mod adaptive_tests {
    use super::*;
    use tradecache::cache::{
        AdaptiveOptimizer, CacheWarmer, OptimizerConfig, WarmingConfig, WarmupTarget,
    };

    #[tokio::test]
    async fn test_warming_writes_placeholders_for_absent_keys() {
        let cache = Arc::new(CacheManager::new(CacheConfig::default()).unwrap());
        cache.set("agent:present", &1, SetOptions::default()).await;

        let warmer = CacheWarmer::new(
            Arc::clone(&cache),
            WarmingConfig {
                key_prefix: "agent:".into(),
                ..Default::default()
            },
        )
        .unwrap();
        warmer.add_target(WarmupTarget::new("present", 1));
        warmer.add_target(WarmupTarget::new("absent", 2));

        let report = warmer.run_cycle().await;
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped, 1);
        assert!(cache.l1().get("agent:absent").unwrap().metadata.warmup);
    }

    #[tokio::test]
    async fn test_optimizer_warms_from_observed_usage() {
        let cache = Arc::new(CacheManager::new(CacheConfig::default()).unwrap());
        let optimizer =
            AdaptiveOptimizer::new(Arc::clone(&cache), OptimizerConfig::default()).unwrap();
        let optimizer = Arc::new(optimizer);
        let warmer = CacheWarmer::new(Arc::clone(&cache), WarmingConfig::default()).unwrap();
        warmer.attach_usage_source(optimizer.clone());

        // misses still teach the optimizer which keys matter
        for _ in 0..3 {
            optimizer.get::<u32>("agent:hot").await;
        }
        let report = warmer.run_cycle().await;
        assert_eq!(report.written, 1);
        assert!(cache.l1().has("agent:hot"));
    }
}

// =============================================================================
// Feature 6: System lifecycle and observability
// =============================================================================

mod system_tests {
    use super::*;
    use tradecache::monitoring::CacheHealth;
    use tradecache::CacheSystem;

    #[tokio::test]
    async fn test_system_exports_metrics_and_shuts_down() {
        let sink = Arc::new(PrometheusMetricsSink::new().unwrap());
        let system = CacheSystem::new(CacheConfig::default(), None)
            .unwrap()
            .with_metrics_sink(sink.clone(), Duration::from_millis(10));

        system.start();
        system.cache().set("k", &1, SetOptions::default()).await;
        system.cache().get::<u32>("k").await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let text = sink.encode().unwrap();
        assert!(text.contains("tradecache_hits 1"));
        assert_eq!(system.health().status, CacheHealth::Healthy);

        system.shutdown().await;
        assert_eq!(system.health().status, CacheHealth::Unhealthy);
    }
}
