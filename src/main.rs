//! TradeCache daemon
//!
//! Runs the tiered cache with its background jobs and serves `/metrics`,
//! `/healthz` and `/readyz`.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        tradecache                              │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐      │
//! │  │   Warming    │───▶│    Cache     │───▶│    Remote    │      │
//! │  │  Optimizer   │    │   Manager    │    │    Façade    │      │
//! │  └──────────────┘    └──────────────┘    └──────────────┘      │
//! │          metrics exporter ──▶ Prometheus registry              │
//! └───────────────────────────────────────────────────────────────┘
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tradecache::adapters::{InMemoryBackend, LoggingEventListener, PrometheusMetricsSink};
use tradecache::cache::codec::CodecKind;
use tradecache::cache::store::StoreConfig;
use tradecache::cache::warming::WarmupFile;
use tradecache::domain::ports::RemoteBackend;
use tradecache::{CacheConfig, CacheEventKind, CacheSystem};

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RemoteKind {
    /// In-process tiers only
    None,
    /// In-memory stand-in for a remote store (single node)
    Memory,
    /// Redis (requires the `redis-backend` feature)
    Redis,
}

/// TradeCache - tiered adaptive cache for trading automation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Tier-1 capacity in entries
    #[arg(long, env = "L1_MAX_ENTRIES", default_value = "1000")]
    l1_max_entries: usize,

    /// Tier-2 capacity in entries
    #[arg(long, env = "L2_MAX_ENTRIES", default_value = "10000")]
    l2_max_entries: usize,

    /// Disable the second in-process tier
    #[arg(long, env = "DISABLE_L2")]
    disable_l2: bool,

    /// Fallback TTL in seconds for untyped entries
    #[arg(long, env = "DEFAULT_TTL_SECONDS", default_value = "300")]
    default_ttl_seconds: u64,

    /// Remote tier backend
    #[arg(long, env = "REMOTE_BACKEND", value_enum, default_value = "none")]
    remote_backend: RemoteKind,

    /// Redis URL for the remote tier
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Prefix for keys in the remote store
    #[arg(long, env = "REMOTE_KEY_PREFIX", default_value = "tradecache:")]
    remote_key_prefix: String,

    /// Remote value codec (none, lz4)
    #[arg(long, env = "REMOTE_CODEC", default_value = "none")]
    remote_codec: String,

    /// Expired-entry sweep interval in seconds
    #[arg(long, env = "CLEANUP_INTERVAL_SECONDS", default_value = "60")]
    cleanup_interval_seconds: u64,

    /// Enable the warming scheduler
    #[arg(long, env = "WARMING_ENABLED")]
    warming: bool,

    /// Warming cycle in seconds
    #[arg(long, env = "WARMING_INTERVAL_SECONDS", default_value = "1800")]
    warming_interval_seconds: u64,

    /// YAML file listing warmup targets
    #[arg(long, env = "WARMUP_FILE")]
    warmup_file: Option<String>,

    /// Pass optimizer reads and writes straight through (no usage tracking)
    #[arg(long, env = "OPTIMIZER_PASSTHROUGH")]
    optimizer_passthrough: bool,

    /// Maximum concurrent prefetch workers
    #[arg(long, env = "PREFETCH_CONCURRENCY", default_value = "4")]
    prefetch_concurrency: usize,

    /// Metrics export interval in seconds
    #[arg(long, env = "EXPORT_INTERVAL_SECONDS", default_value = "15")]
    export_interval_seconds: u64,

    /// Log every cache event
    #[arg(long, env = "LOG_EVENTS")]
    log_events: bool,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting tradecache");
    info!("  L1 capacity: {}", args.l1_max_entries);
    info!("  L2 capacity: {}", if args.disable_l2 { 0 } else { args.l2_max_entries });
    info!("  Remote backend: {:?}", args.remote_backend);
    info!("  Warming: {}", args.warming);
    info!("  Optimizer passthrough: {}", args.optimizer_passthrough);

    let config = build_config(&args)?;
    let backend = build_backend(&args)?;

    let sink = Arc::new(PrometheusMetricsSink::new()?);
    let system = Arc::new(
        CacheSystem::new(config, backend)?
            .with_metrics_sink(sink.clone(), Duration::from_secs(args.export_interval_seconds)),
    );

    if args.log_events {
        for kind in CacheEventKind::ALL {
            system.cache().on(kind, LoggingEventListener::info_level().handler());
        }
    }

    system.start();

    let health_addr = args.health_addr.clone();
    let health_system = Arc::clone(&system);
    let health_server = tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_system).await {
            error!("Health server error: {:#}", e);
        }
    });

    let metrics_addr = args.metrics_addr.clone();
    let metrics_sink = Arc::clone(&sink);
    let metrics_server = tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics_sink).await {
            error!("Metrics server error: {:#}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    system.shutdown().await;
    health_server.abort();
    metrics_server.abort();

    info!("tradecache shutdown complete");
    Ok(())
}

fn build_config(args: &Args) -> anyhow::Result<CacheConfig> {
    let mut config = CacheConfig {
        l1: StoreConfig::with_capacity(args.l1_max_entries),
        l2: StoreConfig::with_capacity(args.l2_max_entries),
        l2_enabled: !args.disable_l2,
        cleanup_interval: Duration::from_secs(args.cleanup_interval_seconds),
        ..Default::default()
    };
    config.ttl.default_ttl = Duration::from_secs(args.default_ttl_seconds);

    config.remote.enabled = args.remote_backend != RemoteKind::None;
    config.remote.url = args.redis_url.clone();
    config.remote.key_prefix = args.remote_key_prefix.clone();
    config.remote.codec = args.remote_codec.parse::<CodecKind>()?;

    config.warming.enabled = args.warming;
    config.warming.interval = Duration::from_secs(args.warming_interval_seconds);
    if let Some(path) = &args.warmup_file {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read warmup file {}", path))?;
        let file = WarmupFile::from_yaml(&yaml)?;
        info!("  Warmup targets: {}", file.targets.len());
        config.warming.targets = file.targets;
    }

    config.optimizer.enabled = !args.optimizer_passthrough;
    config.optimizer.prefetch_concurrency = args.prefetch_concurrency;

    config.validate()?;
    Ok(config)
}

fn build_backend(args: &Args) -> anyhow::Result<Option<Arc<dyn RemoteBackend>>> {
    let backend: Option<Arc<dyn RemoteBackend>> = match args.remote_backend {
        RemoteKind::None => None,
        RemoteKind::Memory => Some(Arc::new(InMemoryBackend::new())),
        RemoteKind::Redis => Some(redis_backend(&args.redis_url)?),
    };
    Ok(backend)
}

#[cfg(feature = "redis-backend")]
fn redis_backend(url: &str) -> anyhow::Result<Arc<dyn RemoteBackend>> {
    Ok(Arc::new(tradecache::adapters::RedisBackend::new(url)?))
}

#[cfg(not(feature = "redis-backend"))]
fn redis_backend(_url: &str) -> anyhow::Result<Arc<dyn RemoteBackend>> {
    anyhow::bail!("redis remote tier requested but this build lacks the `redis-backend` feature")
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "redis=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// HTTP
// =============================================================================

fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

async fn serve<F>(addr: &str, name: &'static str, handler: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Response<Full<Bytes>> + Clone + Send + Sync + 'static,
{
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid {} server address {}", name, addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {} server", name))?;

    info!("{} server listening on {}", name, addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .with_context(|| format!("{} server accept error", name))?;

        let io = TokioIo::new(stream);
        let handler = handler.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = handler(req.uri().path());
                async move { Ok::<_, Infallible>(response) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!("{} server connection error: {}", name, e);
            }
        });
    }
}

async fn run_health_server(addr: &str, system: Arc<CacheSystem>) -> anyhow::Result<()> {
    serve(addr, "Health", move |path| match path {
        "/healthz" | "/livez" => {
            let report = system.health();
            let body = serde_json::to_vec(&report).unwrap_or_default();
            let status = if report.status.is_ready() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            respond(status, body)
        }
        "/readyz" => {
            if system.is_running() {
                respond(StatusCode::OK, "ok")
            } else {
                respond(StatusCode::SERVICE_UNAVAILABLE, "not ready")
            }
        }
        _ => respond(StatusCode::NOT_FOUND, "not found"),
    })
    .await
}

async fn run_metrics_server(addr: &str, sink: Arc<PrometheusMetricsSink>) -> anyhow::Result<()> {
    serve(addr, "Metrics", move |path| match path {
        "/metrics" => match sink.encode() {
            Ok(text) => respond(StatusCode::OK, text),
            Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        _ => respond(StatusCode::NOT_FOUND, "not found"),
    })
    .await
}
