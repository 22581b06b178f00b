//! Domain Layer
//!
//! - **Ports** (`ports.rs`) - trait abstractions for external collaborators
//!   (remote store, telemetry sink, capability probe) plus shared value objects
//! - **Events** (`events.rs`) - closed set of cache notifications
//!
//! # Usage
//!
//! ```ignore
//! use tradecache::domain::ports::RemoteBackend;
//!
//! async fn warm<B: RemoteBackend>(backend: &B) -> Result<()> {
//!     backend.connect().await?;
//!     // ...
//! }
//! ```

pub mod events;
pub mod ports;

pub use events::{CacheEvent, CacheEventKind, InvalidationReason};
pub use ports::{
    CacheLevel, CapabilityProbe, ConnectionState, MetricsSink, RemoteBackend, StaticCapability,
    TelemetryReport,
};
