//! Health reporting and periodic metrics export

pub mod exporter;
pub mod health;

pub use exporter::{telemetry_report, MetricsExporter, DEFAULT_EXPORT_INTERVAL};
pub use health::{check, CacheHealth, HealthReport};
