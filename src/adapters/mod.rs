//! Infrastructure Adapters
//!
//! Implementations of the domain ports.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Domain Ports                           │
//! │      RemoteBackend  │  MetricsSink  │  CacheEvent listeners   │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (This Module)                     │
//! │  InMemoryBackend │ RedisBackend │ PrometheusMetricsSink       │
//! │  LoggingEventListener │ InMemoryEventCollector                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tradecache::adapters::InMemoryBackend;
//! use tradecache::cache::{CacheConfig, CacheManager};
//!
//! let mut config = CacheConfig::default();
//! config.remote.enabled = true;
//! let cache = CacheManager::with_backend(config, Some(Arc::new(InMemoryBackend::new())))?;
//! ```

pub mod event_publisher;
pub mod memory_backend;
pub mod prometheus;
#[cfg(feature = "redis-backend")]
pub mod redis_backend;

pub use event_publisher::{InMemoryEventCollector, LoggingEventListener};
pub use memory_backend::InMemoryBackend;
pub use prometheus::PrometheusMetricsSink;
#[cfg(feature = "redis-backend")]
pub use redis_backend::RedisBackend;
