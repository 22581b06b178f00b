//! TradeCache - Tiered Adaptive Cache
//!
//! The caching core of a trading-automation backend. Expensive results
//! (agent inference, exchange queries, workflow output) are kept behind
//! several tiers with type-aware expiry.
//!
//! # Architecture
//!
//! ```text
//!            get/set                     get/set (adaptive TTL, prefetch)
//!   caller ─────────▶ CacheManager ◀──── AdaptiveOptimizer
//!                      │   │   │
//!             ┌────────┘   │   └─────────┐
//!             ▼            ▼             ▼
//!        L1 EntryStore  L2 EntryStore  RemoteFacade ──▶ RemoteBackend
//!
//!   CacheWarmer ── placeholders ──▶ CacheManager
//!   MetricsExporter ── snapshots ──▶ MetricsSink
//! ```
//!
//! # Modules
//!
//! - [`cache`] - stores, coordinator, invalidation, analytics, warming, optimizer
//! - [`domain`] - ports and events
//! - [`adapters`] - remote backends, Prometheus sink, event listeners
//! - [`monitoring`] - health and metrics export
//! - [`system`] - composition and background job lifecycle
//! - [`error`] - error types

pub mod adapters;
pub mod cache;
pub mod domain;
pub mod error;
pub mod monitoring;
pub mod system;

pub use cache::{CacheConfig, CacheManager, CacheResult, CacheTier, DataType, SetOptions};
pub use domain::{CacheEvent, CacheEventKind, CacheLevel};
pub use error::{Error, Result};
pub use system::CacheSystem;
