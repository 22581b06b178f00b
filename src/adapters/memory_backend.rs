//! In-memory remote backend
//!
//! DashMap-backed implementation of [`RemoteBackend`] with second-granularity
//! expiry, like a real remote store. Used for single-node deployments and
//! tests; availability and latency can be toggled to exercise the façade's
//! degradation paths.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::domain::ports::RemoteBackend;
use crate::error::{Error, Result};

struct Stored {
    data: Bytes,
    expires: Instant,
}

/// In-memory remote backend
pub struct InMemoryBackend {
    storage: DashMap<String, Stored>,
    available: AtomicBool,
    latency: RwLock<Option<Duration>>,
    // Statistics
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    round_trips: AtomicU64,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self {
            storage: DashMap::new(),
            available: AtomicBool::new(true),
            latency: RwLock::new(None),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            round_trips: AtomicU64::new(0),
        }
    }
}

impl InMemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage (`false`) or recovery (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Add artificial latency to every call
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Keys currently stored (expired ones included until touched)
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Raw stored bytes, bypassing availability checks
    pub fn raw(&self, key: &str) -> Option<Bytes> {
        self.storage.get(key).map(|s| s.data.clone())
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Number of calls made (a batch counts once)
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }

    async fn round_trip(&self) -> Result<()> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::BackendUnavailable("connection refused".into()));
        }
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn read(&self, key: &str) -> Option<Bytes> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let expired = match self.storage.get(key) {
            Some(stored) if stored.expires > now => return Some(stored.data.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.storage.remove(key);
        }
        None
    }

    fn write(&self, key: &str, data: Bytes, ttl_secs: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let expires = Instant::now() + Duration::from_secs(ttl_secs.max(1));
        self.storage.insert(key.to_string(), Stored { data, expires });
    }
}

#[async_trait]
impl RemoteBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self) -> Result<()> {
        self.round_trip().await
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.round_trip().await?;
        Ok(self.read(key))
    }

    async fn set(&self, key: &str, value: Bytes, ttl_secs: u64) -> Result<()> {
        self.round_trip().await?;
        self.write(key, value, ttl_secs);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Bytes, ttl_secs: u64) -> Result<bool> {
        self.round_trip().await?;
        let now = Instant::now();
        let stored = Stored {
            data: value,
            expires: now + Duration::from_secs(ttl_secs.max(1)),
        };
        let written = match self.storage.entry(key.to_string()) {
            Entry::Occupied(mut slot) if slot.get().expires <= now => {
                slot.insert(stored);
                true
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(stored);
                true
            }
        };
        if written {
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(written)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.round_trip().await?;
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(self.storage.remove(key).is_some())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>> {
        self.round_trip().await?;
        Ok(keys.iter().map(|k| self.read(k)).collect())
    }

    async fn mset(&self, items: Vec<(String, Bytes, u64)>) -> Result<()> {
        self.round_trip().await?;
        for (key, value, ttl_secs) in items {
            self.write(&key, value, ttl_secs);
        }
        Ok(())
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.round_trip().await?;
        let now = Instant::now();
        Ok(self
            .storage
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().expires > now)
            .map(|e| e.key().clone())
            .collect())
    }

    async fn flush(&self, prefix: &str) -> Result<u64> {
        self.round_trip().await?;
        let before = self.storage.len();
        self.storage.retain(|k, _| !k.starts_with(prefix));
        Ok((before - self.storage.len()) as u64)
    }
}
