//! Tiered adaptive cache
//!
//! - `store`: bounded in-process entry store (Tier-1 and Tier-2)
//! - `remote`: façade over the remote tier with reconnect/degrade handling
//! - `manager`: the tiered coordinator
//! - `invalidation`, `analytics`: operations over every tier
//! - `warming`, `optimizer`: proactive and usage-driven behavior

pub mod analytics;
pub mod codec;
pub mod entry;
pub mod events;
pub mod invalidation;
pub mod manager;
pub mod metrics;
pub mod optimizer;
pub mod policy;
pub mod remote;
pub mod store;
pub mod warming;

pub use analytics::{AnalyticsConfig, CacheAnalytics, KeyStats, Recommendation, TypeBreakdown};
pub use codec::{CodecKind, ValueCodec};
pub use entry::{CacheEntry, EntryMetadata};
pub use events::{event_handler, EventBus, EventHandler, ListenerId};
pub use manager::{CacheConfig, CacheManager, CacheResult, CacheTier, CleanupReport, SetOptions};
pub use metrics::{CacheMetrics, MetricsSnapshot, TypeHitStats};
pub use optimizer::{AdaptiveOptimizer, OptimizerConfig, OptimizerStats, Priority, UsagePattern};
pub use policy::{DataType, TtlPolicy, DEFAULT_TTL};
pub use remote::{RemoteConfig, RemoteFacade, RemoteStats};
pub use store::{EntryStore, StoreConfig};
pub use warming::{
    CacheWarmer, UsageObservation, UsageSource, WarmReport, WarmingConfig, WarmingStats, WarmupFile,
    WarmupTarget,
};
