//! Data Types and TTL Policy
//!
//! Static mapping from data-type tag to default lifetime.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Global fallback lifetime for entries without a type-specific policy
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Kind of payload stored under a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataType {
    /// Agent inference output
    AgentResponse,
    /// Exchange / upstream API response
    ApiResponse,
    /// Chart/market pattern detection result
    PatternDetection,
    /// Database query result
    QueryResult,
    /// User session state
    SessionData,
    /// User preferences
    UserPreferences,
    /// Workflow execution result
    WorkflowResult,
    /// Performance metrics sample
    PerformanceMetrics,
    /// Health probe result
    HealthStatus,
}

impl DataType {
    /// All known data types, in declaration order
    pub const ALL: [DataType; 9] = [
        DataType::AgentResponse,
        DataType::ApiResponse,
        DataType::PatternDetection,
        DataType::QueryResult,
        DataType::SessionData,
        DataType::UserPreferences,
        DataType::WorkflowResult,
        DataType::PerformanceMetrics,
        DataType::HealthStatus,
    ];

    /// Tag used in logs, metrics labels and the remote envelope
    pub fn name(&self) -> &'static str {
        match self {
            DataType::AgentResponse => "agent-response",
            DataType::ApiResponse => "api-response",
            DataType::PatternDetection => "pattern-detection",
            DataType::QueryResult => "query-result",
            DataType::SessionData => "session-data",
            DataType::UserPreferences => "user-preferences",
            DataType::WorkflowResult => "workflow-result",
            DataType::PerformanceMetrics => "performance-metrics",
            DataType::HealthStatus => "health-status",
        }
    }

    /// Default lifetime for this type
    pub fn default_ttl(&self) -> Duration {
        match self {
            DataType::AgentResponse => Duration::from_secs(5 * 60),
            DataType::ApiResponse => Duration::from_secs(60),
            DataType::PatternDetection => Duration::from_secs(10 * 60),
            DataType::QueryResult => Duration::from_secs(5 * 60),
            DataType::SessionData => Duration::from_secs(30 * 60),
            DataType::UserPreferences => Duration::from_secs(60 * 60),
            DataType::WorkflowResult => Duration::from_secs(15 * 60),
            DataType::PerformanceMetrics => Duration::from_secs(60),
            DataType::HealthStatus => Duration::from_secs(30),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DataType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::Config(format!("unknown data type: {}", s)))
    }
}

/// TTL policy table
///
/// Resolution order is explicit TTL, then the per-type entry, then the
/// global default.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    /// Fallback for untyped entries and types missing from the table
    pub default_ttl: Duration,
    /// Per-type lifetimes
    pub per_type: HashMap<DataType, Duration>,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            per_type: DataType::ALL
                .iter()
                .map(|t| (*t, t.default_ttl()))
                .collect(),
        }
    }
}

impl TtlPolicy {
    /// Policy with only a global default and no per-type entries
    pub fn uniform(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            per_type: HashMap::new(),
        }
    }

    /// Override the lifetime for one type
    pub fn with_ttl(mut self, data_type: DataType, ttl: Duration) -> Self {
        self.per_type.insert(data_type, ttl);
        self
    }

    /// Base lifetime for a type (global default when unknown)
    pub fn ttl_for(&self, data_type: Option<DataType>) -> Duration {
        data_type
            .and_then(|t| self.per_type.get(&t).copied())
            .unwrap_or(self.default_ttl)
    }

    /// Resolve the effective lifetime of a write
    pub fn resolve(&self, explicit: Option<Duration>, data_type: Option<DataType>) -> Duration {
        match explicit {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => self.ttl_for(data_type),
        }
    }

    /// Reject zero lifetimes
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl.is_zero() {
            return Err(Error::Config("default TTL must be greater than zero".into()));
        }
        if let Some((t, _)) = self.per_type.iter().find(|(_, ttl)| ttl.is_zero()) {
            return Err(Error::Config(format!("TTL for {} must be greater than zero", t)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip_through_from_str() {
        for t in DataType::ALL {
            assert_eq!(t.name().parse::<DataType>().unwrap(), t);
        }
        assert!("not-a-type".parse::<DataType>().is_err());
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let json = serde_json::to_string(&DataType::WorkflowResult).unwrap();
        assert_eq!(json, "\"workflow-result\"");
    }

    #[test]
    fn test_resolution_order() {
        let policy = TtlPolicy::default();

        let explicit = Duration::from_millis(1500);
        assert_eq!(policy.resolve(Some(explicit), Some(DataType::SessionData)), explicit);
        assert_eq!(
            policy.resolve(None, Some(DataType::HealthStatus)),
            Duration::from_secs(30)
        );
        assert_eq!(policy.resolve(None, None), DEFAULT_TTL);
    }

    #[test]
    fn test_missing_type_falls_back_to_default() {
        let policy = TtlPolicy::uniform(Duration::from_secs(42));
        assert_eq!(
            policy.ttl_for(Some(DataType::AgentResponse)),
            Duration::from_secs(42)
        );

        let policy = policy.with_ttl(DataType::AgentResponse, Duration::from_secs(7));
        assert_eq!(
            policy.ttl_for(Some(DataType::AgentResponse)),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn test_zero_ttl_rejected() {
        assert!(TtlPolicy::uniform(Duration::ZERO).validate().is_err());
        let policy = TtlPolicy::default().with_ttl(DataType::ApiResponse, Duration::ZERO);
        assert!(policy.validate().is_err());
        assert!(TtlPolicy::default().validate().is_ok());
    }
}
