//! Entry Store - bounded in-process tier
//!
//! Insertion-ordered key/value store with per-entry expiry and access
//! bookkeeping. Used for Tier-1 and Tier-2.
//!
//! # Eviction policy
//!
//! Insertion-order eviction with re-insertion on access: every live hit moves
//! the entry to the tail of the order, and a write of a new key at capacity
//! evicts the head. This approximates recency without maintaining a strict
//! recency list.
//!
//! # Design
//!
//! - One `parking_lot::Mutex` per store; the coordinator never locks two
//!   stores at once
//! - Expiry is checked lazily on read; `cleanup()` sweeps the rest

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::entry::{CacheEntry, EntryMetadata};
use super::policy::DataType;
use crate::error::{Error, Result};

/// Default Tier-1 capacity (entries)
pub const DEFAULT_L1_MAX_ENTRIES: usize = 1_000;

/// Default Tier-2 capacity (entries)
pub const DEFAULT_L2_MAX_ENTRIES: usize = 10_000;

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of live entries
    pub max_entries: usize,
}

impl StoreConfig {
    /// Store bounded to `max_entries`
    pub fn with_capacity(max_entries: usize) -> Self {
        Self { max_entries }
    }

    /// Reject a zero capacity
    pub fn validate(&self, tier: &str) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::Config(format!(
                "{} max_entries must be greater than zero",
                tier
            )));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_L1_MAX_ENTRIES)
    }
}

/// Outcome of a store lookup
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Live entry (access already recorded)
    Hit(CacheEntry),
    /// Entry existed but had expired; it has been purged
    Expired(Option<DataType>),
    /// No entry under this key
    Missing,
}

impl Lookup {
    /// Convert into the hit entry, if any
    pub fn into_hit(self) -> Option<CacheEntry> {
        match self {
            Lookup::Hit(entry) => Some(entry),
            _ => None,
        }
    }
}

struct Slot {
    entry: CacheEntry,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Slot>,
    /// seq -> key, ascending = oldest insertion first
    order: BTreeMap<u64, String>,
    next_seq: u64,
    size_bytes: u64,
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.seq);
        self.size_bytes = self.size_bytes.saturating_sub(slot.entry.size());
        Some(slot.entry)
    }

    fn pop_oldest(&mut self) -> Option<CacheEntry> {
        let (_, key) = self.order.pop_first()?;
        let slot = self.entries.remove(&key)?;
        self.size_bytes = self.size_bytes.saturating_sub(slot.entry.size());
        Some(slot.entry)
    }

    fn touch(&mut self, key: &str) -> Option<&mut Slot> {
        let seq = self.next_seq();
        let slot = self.entries.get_mut(key)?;
        self.order.remove(&slot.seq);
        slot.seq = seq;
        self.order.insert(seq, key.to_string());
        Some(slot)
    }
}

/// Bounded, insertion-ordered entry store
pub struct EntryStore {
    /// Tier label for logs
    tier: &'static str,
    config: StoreConfig,
    inner: Mutex<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl EntryStore {
    /// Create a new store
    pub fn new(tier: &'static str, config: StoreConfig) -> Self {
        Self {
            tier,
            config,
            inner: Mutex::new(Inner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Tier label
    pub fn tier(&self) -> &'static str {
        self.tier
    }

    /// Look up a key, distinguishing expired entries from absent ones
    pub fn lookup(&self, key: &str) -> Lookup {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            None => {
                drop(inner);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Lookup::Missing;
            }
            Some(slot) => slot.entry.is_expired_at(now),
        };

        if expired {
            let data_type = inner.remove(key).and_then(|e| e.metadata.data_type);
            drop(inner);
            self.misses.fetch_add(1, Ordering::Relaxed);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            trace!(component = "store", tier = self.tier, key, "expired on read");
            return Lookup::Expired(data_type);
        }

        let entry = match inner.touch(key) {
            Some(slot) => {
                slot.entry.record_access(now);
                slot.entry.clone()
            }
            None => return Lookup::Missing,
        };
        drop(inner);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Lookup::Hit(entry)
    }

    /// Get a live entry
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.lookup(key).into_hit()
    }

    /// Store a value under `key` for `ttl`
    ///
    /// Returns the keys evicted to make room.
    pub fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
        metadata: EntryMetadata,
    ) -> Vec<String> {
        self.insert(CacheEntry::new(key, value, ttl, metadata))
    }

    /// Insert a prepared entry (replaces any entry under the same key)
    pub fn insert(&self, entry: CacheEntry) -> Vec<String> {
        let mut inner = self.inner.lock();
        let evicted = self.insert_locked(&mut inner, entry);
        drop(inner);
        self.record_evictions(&evicted);
        evicted
    }

    /// Insert `entry` only if no live entry holds its key; the check and the
    /// write happen under one lock. Returns the evicted keys, or `None` when
    /// a live entry was already present.
    pub fn insert_if_absent(&self, entry: CacheEntry) -> Option<Vec<String>> {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let occupied = inner
            .entries
            .get(entry.key())
            .is_some_and(|slot| !slot.entry.is_expired_at(now));
        if occupied {
            return None;
        }
        let evicted = self.insert_locked(&mut inner, entry);
        drop(inner);
        self.record_evictions(&evicted);
        Some(evicted)
    }

    fn insert_locked(&self, inner: &mut Inner, entry: CacheEntry) -> Vec<String> {
        let key = entry.key().to_string();
        let size = entry.size();
        let mut evicted = Vec::new();

        if inner.remove(&key).is_none() {
            while inner.entries.len() >= self.config.max_entries {
                match inner.pop_oldest() {
                    Some(old) => evicted.push(old.key().to_string()),
                    None => break,
                }
            }
        }

        let seq = inner.next_seq();
        inner.order.insert(seq, key.clone());
        inner.entries.insert(key, Slot { entry, seq });
        inner.size_bytes += size;
        evicted
    }

    fn record_evictions(&self, evicted: &[String]) {
        if !evicted.is_empty() {
            self.evictions
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
            debug!(component = "store", tier = self.tier, evicted = ?evicted, "capacity eviction");
        }
    }

    /// Remove a key
    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// True if a live entry exists (expired entries are purged)
    pub fn has(&self, key: &str) -> bool {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            None => return false,
            Some(slot) => slot.entry.is_expired_at(now),
        };
        if expired {
            inner.remove(key);
            return false;
        }
        true
    }

    /// Remove every expired entry, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        drop(inner);

        if !expired.is_empty() {
            self.expirations
                .fetch_add(expired.len() as u64, Ordering::Relaxed);
            debug!(component = "store", tier = self.tier, removed = expired.len(), "expiry sweep");
        }
        expired.len()
    }

    /// Remove every live entry matching `predicate`, returning the removed keys.
    /// Expired matches are purged too but not reported.
    pub fn remove_where<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(&CacheEntry) -> bool,
    {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let (live, expired): (Vec<_>, Vec<_>) = inner
            .entries
            .values()
            .filter(|slot| predicate(&slot.entry))
            .map(|slot| (slot.entry.key().to_string(), slot.entry.is_expired_at(now)))
            .partition(|(_, expired)| !expired);
        for (key, _) in live.iter().chain(&expired) {
            inner.remove(key);
        }
        drop(inner);

        if !expired.is_empty() {
            self.expirations
                .fetch_add(expired.len() as u64, Ordering::Relaxed);
        }
        live.into_iter().map(|(key, _)| key).collect()
    }

    /// Snapshot of live entries (no access bookkeeping)
    pub fn entries(&self) -> Vec<CacheEntry> {
        let now = Utc::now();
        self.inner
            .lock()
            .entries
            .values()
            .filter(|slot| !slot.entry.is_expired_at(now))
            .map(|slot| slot.entry.clone())
            .collect()
    }

    /// Keys in eviction order (oldest first)
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().order.values().cloned().collect()
    }

    /// Remove everything, returning how many entries were dropped
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.entries.len();
        *inner = Inner::default();
        count
    }

    /// Number of physically stored entries (may include not-yet-swept expired ones)
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Estimated bytes held
    pub fn size_bytes(&self) -> u64 {
        self.inner.lock().size_bytes
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.config.max_entries
    }

    /// Store statistics
    pub fn stats(&self) -> StoreStats {
        let (entries, size_bytes) = {
            let inner = self.inner.lock();
            (inner.entries.len(), inner.size_bytes)
        };
        StoreStats {
            tier: self.tier,
            entries,
            capacity: self.config.max_entries,
            size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

/// Per-store statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Tier label
    pub tier: &'static str,
    /// Stored entries
    pub entries: usize,
    /// Capacity in entries
    pub capacity: usize,
    /// Estimated bytes
    pub size_bytes: u64,
    /// Live hits
    pub hits: u64,
    /// Misses (absent or expired)
    pub misses: u64,
    /// Capacity evictions
    pub evictions: u64,
    /// Entries dropped because they expired
    pub expirations: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store(capacity: usize) -> EntryStore {
        EntryStore::new("L1", StoreConfig::with_capacity(capacity))
    }

    fn put(store: &EntryStore, key: &str) -> Vec<String> {
        store.set(
            key,
            Bytes::from(format!("\"{}\"", key)),
            Duration::from_secs(60),
            EntryMetadata::default(),
        )
    }

    #[test]
    fn test_set_get() {
        let store = store(10);
        put(&store, "order:1");

        let entry = store.get("order:1").unwrap();
        assert_eq!(entry.value().as_ref(), b"\"order:1\"");
        assert_eq!(entry.access_count(), 1);
        assert_eq!(store.stats().hits, 1);
    }

    #[test]
    fn test_miss_is_counted() {
        let store = store(10);
        assert!(store.get("nope").is_none());
        assert!(matches!(store.lookup("nope"), Lookup::Missing));
        assert_eq!(store.stats().misses, 2);
    }

    #[test]
    fn test_oldest_insertion_evicted_first() {
        let store = store(3);
        put(&store, "a");
        put(&store, "b");
        put(&store, "c");

        let evicted = put(&store, "d");
        assert_eq!(evicted, vec!["a".to_string()]);
        assert!(!store.has("a"));
        assert_eq!(store.len(), 3);
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_access_moves_entry_to_tail() {
        let store = store(3);
        put(&store, "a");
        put(&store, "b");
        put(&store, "c");

        store.get("a");
        assert_eq!(store.keys(), vec!["b", "c", "a"]);

        let evicted = put(&store, "d");
        assert_eq!(evicted, vec!["b".to_string()]);
        assert!(store.has("a"));
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let store = store(2);
        put(&store, "a");
        put(&store, "b");

        let evicted = put(&store, "a");
        assert!(evicted.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_lazy_expiry_reports_type() {
        let store = store(10);
        store.set(
            "agent:x",
            Bytes::from_static(b"1"),
            Duration::from_millis(20),
            EntryMetadata::typed(DataType::AgentResponse),
        );
        std::thread::sleep(Duration::from_millis(40));

        match store.lookup("agent:x") {
            Lookup::Expired(t) => assert_eq!(t, Some(DataType::AgentResponse)),
            other => panic!("expected expired, got {:?}", other),
        }
        assert_eq!(store.len(), 0);
        assert!(matches!(store.lookup("agent:x"), Lookup::Missing));
    }

    #[test]
    fn test_cleanup_sweeps_expired_only() {
        let store = store(10);
        store.set(
            "short",
            Bytes::from_static(b"1"),
            Duration::from_millis(10),
            EntryMetadata::default(),
        );
        put(&store, "long");
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(store.cleanup(), 1);
        assert!(store.has("long"));
        assert_eq!(store.cleanup(), 0);
    }

    #[test]
    fn test_delete_and_size_accounting() {
        let store = store(10);
        put(&store, "k");
        assert!(store.size_bytes() > 0);

        assert!(store.delete("k"));
        assert!(!store.delete("k"));
        assert_eq!(store.size_bytes(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_where() {
        let store = store(10);
        store.set(
            "a",
            Bytes::from_static(b"1"),
            Duration::from_secs(60),
            EntryMetadata::default().with_dependency("BTCUSDT"),
        );
        put(&store, "b");

        let removed = store.remove_where(|e| e.metadata.depends_on("BTCUSDT"));
        assert_eq!(removed, vec!["a".to_string()]);
        assert!(store.has("b"));
    }

    #[test]
    fn test_remove_where_skips_expired_matches() {
        let store = store(10);
        for key in ["order:1", "order:2"] {
            let ttl = Duration::from_millis(10);
            store.set(key, Bytes::from_static(b"1"), ttl, EntryMetadata::default());
        }
        put(&store, "order:3");
        std::thread::sleep(Duration::from_millis(30));

        let removed = store.remove_where(|e| e.key().starts_with("order:"));
        assert_eq!(removed, vec!["order:3".to_string()]);
        assert!(store.is_empty());
        assert_eq!(store.stats().expirations, 2);
    }

    #[test]
    fn test_insert_if_absent() {
        let store = store(10);
        let entry = |key: &str, value: &'static [u8], ttl| {
            CacheEntry::new(key, Bytes::from_static(value), ttl, EntryMetadata::default())
        };
        let minute = Duration::from_secs(60);

        assert!(store.insert_if_absent(entry("k", b"0", minute)).is_some());
        put(&store, "k");
        assert!(store.insert_if_absent(entry("k", b"0", minute)).is_none());
        assert_eq!(store.get("k").unwrap().value().as_ref(), b"\"k\"");

        store.insert(entry("e", b"1", Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(30));
        assert!(store.insert_if_absent(entry("e", b"2", minute)).is_some());
        assert_eq!(store.get("e").unwrap().value().as_ref(), b"2");
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(StoreConfig::with_capacity(0).validate("L1").is_err());
        assert!(StoreConfig::default().validate("L1").is_ok());
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(store(100_000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..500 {
                        let key = format!("obj-{}-{}", t, i);
                        put(&store, &key);
                        assert!(store.get(&key).is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 4000);
    }
}
