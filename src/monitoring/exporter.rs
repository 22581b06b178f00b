//! Periodic metrics export
//!
//! Snapshots the coordinator and hands the report to a [`MetricsSink`]. Sink
//! failures are logged and the next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::cache::manager::CacheManager;
use crate::domain::ports::{MetricsSink, TelemetryReport};

/// Default export period
pub const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_secs(15);

/// Snapshot the coordinator for export
pub fn telemetry_report(cache: &CacheManager) -> TelemetryReport {
    TelemetryReport {
        metrics: cache.metrics(),
        l1_entries: cache.l1().len(),
        l2_entries: cache.l2().map_or(0, |l2| l2.len()),
        memory_bytes: cache.memory_bytes(),
        remote_state: cache.remote().map(|r| r.state()),
        timestamp: Utc::now(),
    }
}

pub struct MetricsExporter {
    cache: Arc<CacheManager>,
    sink: Arc<dyn MetricsSink>,
    interval: Duration,
}

impl MetricsExporter {
    pub fn new(cache: Arc<CacheManager>, sink: Arc<dyn MetricsSink>, interval: Duration) -> Self {
        Self { cache, sink, interval }
    }

    /// Export once; returns whether the sink accepted the report
    pub async fn export_once(&self) -> bool {
        let report = telemetry_report(&self.cache);
        match self.sink.export(&report).await {
            Ok(()) => true,
            Err(e) => {
                warn!(component = "exporter", error = %e, "metrics export failed");
                false
            }
        }
    }

    #[instrument(skip_all, fields(component = "exporter"))]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval = ?self.interval, "starting metrics exporter");
        let mut tick = interval(self.interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.export_once().await;
                }
                _ = shutdown.cancelled() => {
                    // final report so the sink reflects the last state
                    self.export_once().await;
                    info!("metrics exporter shutting down");
                    break;
                }
            }
        }
    }
}
