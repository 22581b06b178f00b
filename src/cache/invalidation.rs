//! Invalidation Engine
//!
//! Pattern, type and dependency driven removal across every tier. Each call
//! scans the tiers one after another and deletes matches tier by tier; it is
//! best effort, not atomic across tiers. The returned count is the number of
//! distinct live keys removed from at least one tier; expired matches are
//! purged along the way but not counted.

use std::collections::BTreeSet;

use regex::Regex;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, EntryMetadata};
use super::manager::CacheManager;
use super::policy::DataType;
use crate::domain::events::{CacheEvent, CacheEventKind, InvalidationReason};
use crate::error::Error;

/// What a remote scan has to fetch to evaluate a predicate
#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Filter on keys, then fetch only the matching envelopes
    Keys,
    /// Fetch every envelope and filter on its metadata
    Entries,
}

impl CacheManager {
    /// Remove every key matching `pattern` (a regular expression).
    /// A malformed pattern is logged and removes nothing.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> usize {
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                self.metrics.record_error();
                warn!(
                    component = "invalidation",
                    pattern,
                    error = %Error::from(e),
                    "rejected invalidation pattern"
                );
                return 0;
            }
        };
        self.invalidate_where(
            InvalidationReason::Pattern(pattern.to_string()),
            Scan::Keys,
            |key, _| regex.is_match(key),
        )
        .await
    }

    /// Remove every entry tagged with `data_type`
    pub async fn invalidate_by_type(&self, data_type: DataType) -> usize {
        self.invalidate_where(
            InvalidationReason::Type(data_type),
            Scan::Entries,
            |_, meta| meta.data_type == Some(data_type),
        )
        .await
    }

    /// Remove every entry derived from `dependency`
    pub async fn invalidate_by_dependency(&self, dependency: &str) -> usize {
        self.invalidate_where(
            InvalidationReason::Dependency(dependency.to_string()),
            Scan::Entries,
            |_, meta| meta.depends_on(dependency),
        )
        .await
    }

    async fn invalidate_where<F>(
        &self,
        reason: InvalidationReason,
        scan: Scan,
        predicate: F,
    ) -> usize
    where
        F: Fn(&str, &EntryMetadata) -> bool,
    {
        let matches = |entry: &CacheEntry| predicate(entry.key(), &entry.metadata);
        let mut removed: BTreeSet<String> = BTreeSet::new();

        let l1 = self.l1.remove_where(matches);
        debug!(component = "invalidation", tier = "L1", removed = l1.len());
        removed.extend(l1);

        if let Some(l2) = &self.l2 {
            let l2 = l2.remove_where(matches);
            debug!(component = "invalidation", tier = "L2", removed = l2.len());
            removed.extend(l2);
        }

        if let Some(remote) = &self.remote {
            let candidates = match scan {
                Scan::Keys => {
                    let none = EntryMetadata::default();
                    let keys: Vec<String> = remote
                        .keys()
                        .await
                        .into_iter()
                        .filter(|k| predicate(k, &none))
                        .collect();
                    remote.inspect(&keys).await
                }
                Scan::Entries => {
                    let keys = remote.keys().await;
                    let mut entries = remote.inspect(&keys).await;
                    entries.retain(|(entry, _)| matches(entry));
                    entries
                }
            };
            let mut remote_removed = 0usize;
            for (entry, live) in candidates {
                if remote.delete(entry.key()).await && live {
                    remote_removed += 1;
                    removed.insert(entry.key().to_string());
                }
            }
            debug!(component = "invalidation", tier = "L3", removed = remote_removed);
        }

        if !removed.is_empty() {
            info!(
                component = "invalidation",
                reason = ?reason,
                count = removed.len(),
                "entries invalidated"
            );
        }

        if self.events.has_listeners(CacheEventKind::Invalidate) {
            for key in &removed {
                self.events
                    .emit(&CacheEvent::invalidate(key.clone(), reason.clone()));
            }
        }
        removed.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::manager::{CacheConfig, SetOptions};
    use crate::domain::ports::CacheLevel;

    async fn manager() -> CacheManager {
        let manager = CacheManager::in_memory(CacheConfig::default()).unwrap();
        manager.remote().unwrap().connect().await;
        manager
    }

    #[tokio::test]
    async fn test_pattern_counts_distinct_keys() {
        let manager = manager().await;
        for key in ["order:1", "order:2", "order:3", "position:1"] {
            manager.set(key, &key, SetOptions::default()).await;
        }

        assert_eq!(manager.invalidate_by_pattern("^order:").await, 3);
        assert!(!manager.has("order:2").await);
        assert_eq!(manager.get::<String>("position:1").await.as_deref(), Some("position:1"));
    }

    #[tokio::test]
    async fn test_pattern_reaches_remote_only_entries() {
        let manager = manager().await;
        manager
            .set("order:9", &1, SetOptions::default().at_level(CacheLevel::L3))
            .await;

        assert_eq!(manager.invalidate_by_pattern("^order:").await, 1);
        assert!(!manager.has("order:9").await);
    }

    #[tokio::test]
    async fn test_expired_entries_are_purged_but_not_counted() {
        let manager = manager().await;
        for key in ["order:1", "order:2", "order:3"] {
            manager
                .set(key, &1, SetOptions::default().with_ttl(Duration::from_millis(20)))
                .await;
        }
        manager.set("order:4", &4, SetOptions::default()).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!manager.has("order:1").await);

        assert_eq!(manager.invalidate_by_pattern("^order:").await, 1);
        assert!(manager.remote().unwrap().keys().await.is_empty());
        assert_eq!(manager.l1().len(), 0);
    }

    #[tokio::test]
    async fn test_expired_remote_entries_not_counted_by_type() {
        let manager = manager().await;
        let short = SetOptions::typed(DataType::ApiResponse)
            .with_ttl(Duration::from_millis(20))
            .at_level(CacheLevel::L3);
        manager.set("quote:1", &1, short).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(manager.invalidate_by_type(DataType::ApiResponse).await, 0);
        assert!(manager.remote().unwrap().keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_bad_pattern_removes_nothing() {
        let manager = manager().await;
        manager.set("order:1", &1, SetOptions::default()).await;

        assert_eq!(manager.invalidate_by_pattern("(unclosed").await, 0);
        assert!(manager.has("order:1").await);
        assert_eq!(manager.metrics().errors, 1);
    }

    #[tokio::test]
    async fn test_by_type() {
        let manager = manager().await;
        manager
            .set("a", &1, SetOptions::typed(DataType::ApiResponse))
            .await;
        manager
            .set("b", &2, SetOptions::typed(DataType::ApiResponse).at_level(CacheLevel::L3))
            .await;
        manager
            .set("c", &3, SetOptions::typed(DataType::SessionData))
            .await;

        assert_eq!(manager.invalidate_by_type(DataType::ApiResponse).await, 2);
        assert!(manager.has("c").await);
        assert!(!manager.has("b").await);
    }

    #[tokio::test]
    async fn test_by_dependency_leaves_untagged_entries() {
        let manager = manager().await;
        manager
            .set("pattern:btc", &1, SetOptions::default().depends_on("BTCUSDT"))
            .await;
        manager
            .set("pattern:eth", &1, SetOptions::default().depends_on("ETHUSDT"))
            .await;
        manager.set("plain", &1, SetOptions::default()).await;

        assert_eq!(manager.invalidate_by_dependency("BTCUSDT").await, 1);
        assert!(!manager.has("pattern:btc").await);
        assert!(manager.has("pattern:eth").await);
        assert!(manager.has("plain").await);
    }

    #[tokio::test]
    async fn test_remote_outage_does_not_abort_local_tiers() {
        let manager = CacheManager::in_memory(CacheConfig::default()).unwrap();
        // never connected: remote scan yields nothing
        manager.set("order:1", &1, SetOptions::default()).await;
        assert_eq!(manager.invalidate_by_pattern("^order:").await, 1);
        assert!(!manager.l1().has("order:1"));
    }
}
