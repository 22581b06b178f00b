//! Cache system composition
//!
//! Owns the coordinator and the components built around it, and the
//! background jobs that keep them running:
//! - expired-entry cleanup
//! - remote connect (reconnects are driven by the façade itself)
//! - warming cycles, when enabled
//! - usage-pattern pruning
//! - metrics export, when a sink is attached
//!
//! Every job stops on [`CacheSystem::shutdown`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::cache::manager::{CacheConfig, CacheManager};
use crate::cache::optimizer::AdaptiveOptimizer;
use crate::cache::warming::CacheWarmer;
use crate::domain::ports::{MetricsSink, RemoteBackend};
use crate::error::Result;
use crate::monitoring::exporter::{MetricsExporter, DEFAULT_EXPORT_INTERVAL};
use crate::monitoring::health::{self, HealthReport};

pub struct CacheSystem {
    cache: Arc<CacheManager>,
    warmer: Arc<CacheWarmer>,
    optimizer: Arc<AdaptiveOptimizer>,
    sink: Option<Arc<dyn MetricsSink>>,
    export_interval: Duration,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl CacheSystem {
    /// Build every component; configuration errors surface here
    pub fn new(config: CacheConfig, backend: Option<Arc<dyn RemoteBackend>>) -> Result<Self> {
        let warming = config.warming.clone();
        let optimizer = config.optimizer.clone();

        let cache = Arc::new(CacheManager::with_backend(config, backend)?);
        let optimizer = Arc::new(AdaptiveOptimizer::new(Arc::clone(&cache), optimizer)?);
        let warmer = Arc::new(CacheWarmer::new(Arc::clone(&cache), warming)?);
        warmer.attach_usage_source(optimizer.clone());

        Ok(Self {
            cache,
            warmer,
            optimizer,
            sink: None,
            export_interval: DEFAULT_EXPORT_INTERVAL,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Export telemetry to `sink` every `interval` once started
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>, interval: Duration) -> Self {
        self.sink = Some(sink);
        self.export_interval = interval;
        self
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn warmer(&self) -> &Arc<CacheWarmer> {
        &self.warmer
    }

    pub fn optimizer(&self) -> &Arc<AdaptiveOptimizer> {
        &self.optimizer
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> HealthReport {
        health::check(&self.cache, self.stopped.load(Ordering::SeqCst))
    }

    /// Spawn the background jobs; a second call does nothing
    pub fn start(&self) {
        if self.stopped.load(Ordering::SeqCst) || self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let config = self.cache.config();
        let mut tasks = self.tasks.lock();

        tasks.push(tokio::spawn(run_cleanup(
            Arc::clone(&self.cache),
            config.cleanup_interval,
            self.shutdown.clone(),
        )));

        if let Some(remote) = self.cache.remote() {
            let remote = Arc::clone(remote);
            tasks.push(tokio::spawn(async move {
                if !remote.connect().await {
                    info!(
                        component = "remote",
                        "remote tier unavailable at startup, serving from local tiers"
                    );
                }
            }));
        }

        if config.warming.enabled {
            tasks.push(tokio::spawn(Arc::clone(&self.warmer).run(self.shutdown.clone())));
        }

        // usage patterns accumulate whenever the optimizer is used, so
        // pruning always runs
        tasks.push(tokio::spawn(Arc::clone(&self.optimizer).run(self.shutdown.clone())));

        if let Some(sink) = &self.sink {
            let exporter = MetricsExporter::new(
                Arc::clone(&self.cache),
                Arc::clone(sink),
                self.export_interval,
            );
            tasks.push(tokio::spawn(exporter.run(self.shutdown.clone())));
        }

        info!(
            component = "system",
            jobs = tasks.len(),
            warming = config.warming.enabled,
            optimizer = config.optimizer.enabled,
            "cache system started"
        );
    }

    /// Stop every background job and close the remote tier. In-flight
    /// prefetches may finish but their results are discarded.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        self.optimizer.stop();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!(component = "system", error = %e, "background job ended abnormally");
            }
        }

        if let Some(remote) = self.cache.remote() {
            remote.close().await;
        }
        info!(component = "system", "cache system stopped");
    }
}

impl std::fmt::Debug for CacheSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSystem")
            .field("cache", &self.cache)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Sweep expired entries every `period` until `shutdown` fires
#[instrument(skip_all, fields(component = "coordinator"))]
async fn run_cleanup(cache: Arc<CacheManager>, period: Duration, shutdown: CancellationToken) {
    info!(interval = ?period, "starting expired-entry cleanup");
    let mut tick = interval(period);
    // the first tick fires immediately
    tick.tick().await;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let report = cache.cleanup().await;
                debug!(removed = report.total, "cleanup pass");
            }
            _ = shutdown.cancelled() => {
                info!("cleanup shutting down");
                break;
            }
        }
    }
}
