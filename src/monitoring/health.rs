//! Cache health
//!
//! Healthy while serving normally; Degraded when a configured remote tier is
//! not connected or the hit rate is low under real traffic; Unhealthy once
//! the system has shut down.

use serde::Serialize;

use crate::cache::manager::CacheManager;
use crate::domain::ports::ConnectionState;

/// Reads needed before a low hit rate counts against health
pub const MIN_READS_FOR_HIT_RATE: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl CacheHealth {
    /// Whether the process should receive traffic
    pub fn is_ready(&self) -> bool {
        !matches!(self, CacheHealth::Unhealthy)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: CacheHealth,
    pub reasons: Vec<String>,
    pub hit_rate: f64,
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_state: Option<ConnectionState>,
}

/// Evaluate the health of `cache`
pub fn check(cache: &CacheManager, shut_down: bool) -> HealthReport {
    let metrics = cache.metrics();
    let remote_state = cache.remote().map(|r| r.state());
    let mut reasons = Vec::new();

    if shut_down {
        reasons.push("cache system is shut down".to_string());
    }
    if let Some(state) = remote_state {
        if state != ConnectionState::Connected {
            reasons.push(format!("remote tier is {}", state));
        }
    }
    let threshold = cache.config().analytics.low_hit_rate;
    if metrics.reads() >= MIN_READS_FOR_HIT_RATE && metrics.hit_rate < threshold {
        reasons.push(format!(
            "hit rate {:.1}% below {:.1}%",
            metrics.hit_rate, threshold
        ));
    }

    let status = if shut_down {
        CacheHealth::Unhealthy
    } else if reasons.is_empty() {
        CacheHealth::Healthy
    } else {
        CacheHealth::Degraded
    };

    HealthReport {
        status,
        reasons,
        hit_rate: metrics.hit_rate,
        entries: cache.total_cached_entries(),
        remote_state,
    }
}
