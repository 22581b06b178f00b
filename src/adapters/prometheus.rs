//! Prometheus Metrics Sink
//!
//! Implements the `MetricsSink` port by publishing each telemetry report as
//! gauges in a dedicated registry. The binary serves the registry on
//! `/metrics`.

use async_trait::async_trait;
use prometheus::{Encoder, Gauge, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::domain::ports::{ConnectionState, MetricsSink, TelemetryReport};
use crate::error::{Error, Result};

const NAMESPACE: &str = "tradecache";

/// Gauges mirroring the latest telemetry report
pub struct PrometheusMetricsSink {
    registry: Registry,
    hits: IntGauge,
    misses: IntGauge,
    sets: IntGauge,
    deletes: IntGauge,
    evictions: IntGauge,
    errors: IntGauge,
    hit_rate: Gauge,
    access_latency_us: Gauge,
    tier_hits: IntGaugeVec,
    promotions: IntGaugeVec,
    entries: IntGaugeVec,
    memory_bytes: IntGauge,
    remote_connected: IntGauge,
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let gauge =
        IntGauge::with_opts(Opts::new(name, help).namespace(NAMESPACE)).map_err(metrics_error)?;
    registry.register(Box::new(gauge.clone())).map_err(metrics_error)?;
    Ok(gauge)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge> {
    let gauge =
        Gauge::with_opts(Opts::new(name, help).namespace(NAMESPACE)).map_err(metrics_error)?;
    registry.register(Box::new(gauge.clone())).map_err(metrics_error)?;
    Ok(gauge)
}

fn int_gauge_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntGaugeVec> {
    let opts = Opts::new(name, help).namespace(NAMESPACE);
    let gauge = IntGaugeVec::new(opts, labels).map_err(metrics_error)?;
    registry.register(Box::new(gauge.clone())).map_err(metrics_error)?;
    Ok(gauge)
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("prometheus: {}", e))
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl PrometheusMetricsSink {
    /// Create a sink with its own registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            hits: int_gauge(&registry, "hits", "Reads served by any tier")?,
            misses: int_gauge(&registry, "misses", "Reads served by no tier")?,
            sets: int_gauge(&registry, "sets", "Accepted writes")?,
            deletes: int_gauge(&registry, "deletes", "Delete calls")?,
            evictions: int_gauge(&registry, "evictions", "Capacity evictions")?,
            errors: int_gauge(&registry, "errors", "Swallowed failures")?,
            hit_rate: gauge(&registry, "hit_rate_percent", "Hits over reads, in percent")?,
            access_latency_us: gauge(
                &registry,
                "access_latency_us",
                "Moving average read latency",
            )?,
            tier_hits: int_gauge_vec(&registry, "tier_hits", "Hits per serving tier", &["tier"])?,
            promotions: int_gauge_vec(
                &registry,
                "promotions",
                "Entries copied up a tier",
                &["path"],
            )?,
            entries: int_gauge_vec(
                &registry,
                "entries",
                "Entries held per in-process tier",
                &["tier"],
            )?,
            memory_bytes: int_gauge(&registry, "memory_bytes", "Estimated in-process bytes")?,
            remote_connected: int_gauge(
                &registry,
                "remote_connected",
                "1 when the remote tier is connected",
            )?,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of the registry
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

impl std::fmt::Debug for PrometheusMetricsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetricsSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl MetricsSink for PrometheusMetricsSink {
    async fn export(&self, report: &TelemetryReport) -> Result<()> {
        let m = &report.metrics;
        self.hits.set(clamp(m.hits));
        self.misses.set(clamp(m.misses));
        self.sets.set(clamp(m.sets));
        self.deletes.set(clamp(m.deletes));
        self.evictions.set(clamp(m.evictions));
        self.errors.set(clamp(m.errors));
        self.hit_rate.set(m.hit_rate);
        self.access_latency_us.set(m.avg_access_latency_us as f64);

        self.tier_hits.with_label_values(&["L1"]).set(clamp(m.l1_hits));
        self.tier_hits.with_label_values(&["L2"]).set(clamp(m.l2_hits));
        self.tier_hits.with_label_values(&["L3"]).set(clamp(m.l3_hits));
        self.promotions
            .with_label_values(&["l2_to_l1"])
            .set(clamp(m.promotions_l2_to_l1));
        self.promotions
            .with_label_values(&["l3_to_l2"])
            .set(clamp(m.promotions_l3_to_l2));

        self.entries.with_label_values(&["L1"]).set(report.l1_entries as i64);
        self.entries.with_label_values(&["L2"]).set(report.l2_entries as i64);
        self.memory_bytes.set(clamp(report.memory_bytes));
        self.remote_connected
            .set(i64::from(report.remote_state == Some(ConnectionState::Connected)));
        Ok(())
    }
}
