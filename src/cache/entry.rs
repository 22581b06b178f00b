//! Cache Entry Types
//!
//! An entry is logically absent once `now > expires_at`, whether or not a
//! sweep has physically removed it yet.

use std::collections::BTreeSet;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::policy::DataType;

/// Longest lifetime an entry can carry (100 years)
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Convert a std duration into a chrono delta, clamped to [`MAX_TTL`]
pub(crate) fn to_delta(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl.min(MAX_TTL)).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

/// Descriptive metadata attached to an entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Payload kind, drives TTL policy and analytics bucketing
    pub data_type: Option<DataType>,
    /// Producer of the value (agent id, exchange, "warmup", ...)
    pub source: Option<String>,
    /// Estimated footprint in bytes (key + payload when left at 0)
    pub size_bytes: u64,
    /// Upstream identifiers this value was derived from
    pub dependencies: BTreeSet<String>,
    /// Short-lived placeholder written by the warming scheduler
    pub warmup: bool,
}

impl EntryMetadata {
    /// Metadata tagged with a data type
    pub fn typed(data_type: DataType) -> Self {
        Self {
            data_type: Some(data_type),
            ..Default::default()
        }
    }

    /// Add an upstream dependency
    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.insert(dependency.into());
        self
    }

    /// Set the producer
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// True if this entry was derived from `dependency`
    pub fn depends_on(&self, dependency: &str) -> bool {
        self.dependencies.contains(dependency)
    }
}

/// A cached value with expiry and access bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: String,
    value: Bytes,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    access_count: u64,
    last_accessed_at: DateTime<Utc>,
    /// Entry metadata
    pub metadata: EntryMetadata,
}

impl CacheEntry {
    /// Create an entry that expires `ttl` from now
    ///
    /// A zero TTL is bumped to one millisecond so `expires_at > created_at`
    /// always holds.
    pub fn new(
        key: impl Into<String>,
        value: Bytes,
        ttl: Duration,
        metadata: EntryMetadata,
    ) -> Self {
        let now = Utc::now();
        let ttl = ttl.max(Duration::from_millis(1));
        Self::with_expiry(key, value, now, now + to_delta(ttl), metadata)
    }

    /// Create an entry with explicit timestamps (tier transfers)
    pub fn with_expiry(
        key: impl Into<String>,
        value: Bytes,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        mut metadata: EntryMetadata,
    ) -> Self {
        let key = key.into();
        if metadata.size_bytes == 0 {
            metadata.size_bytes = (key.len() + value.len()) as u64;
        }
        let expires_at = if expires_at > created_at {
            expires_at
        } else {
            created_at + chrono::Duration::milliseconds(1)
        };
        Self {
            key,
            value,
            created_at,
            expires_at,
            access_count: 0,
            last_accessed_at: created_at,
            metadata,
        }
    }

    /// Cache key
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Serialized payload (zero-copy clone)
    #[inline]
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Creation timestamp
    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Expiry timestamp
    #[inline]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Number of hits served from this entry
    #[inline]
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Time of the most recent hit (creation time if never read)
    #[inline]
    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    /// Estimated footprint in bytes
    #[inline]
    pub fn size(&self) -> u64 {
        self.metadata.size_bytes
    }

    /// Expiry check against a supplied clock reading
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Expiry check against the wall clock
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Remaining lifetime, `None` once expired
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.is_expired_at(now) {
            return None;
        }
        (self.expires_at - now).to_std().ok().filter(|d| !d.is_zero())
    }

    /// Record a hit
    pub fn record_access(&mut self, now: DateTime<Utc>) -> u64 {
        self.access_count += 1;
        self.last_accessed_at = now;
        self.access_count
    }

    /// Copy with the same value/expiry but fresh access bookkeeping
    pub fn promoted_copy(&self) -> Self {
        Self::with_expiry(
            self.key.clone(),
            self.value.clone(),
            self.created_at,
            self.expires_at,
            self.metadata.clone(),
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
