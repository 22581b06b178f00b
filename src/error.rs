//! Error types for the tiered cache core
//!
//! Only configuration errors escape to callers (at construction time).
//! Everything else is logged, counted in the error metric and degraded to
//! "act as if uncached" by the component that observed it.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache core
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid size/TTL/limit supplied at construction time
    #[error("Configuration error: {0}")]
    Config(String),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote backend call failed or the façade is not connected
    #[error("Remote backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Remote backend call exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Malformed invalidation pattern
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a timeout error for a named remote operation
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// True for failures that mean the remote connection is gone
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Error::BackendUnavailable(_) | Error::Io(_))
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::BackendUnavailable(e.to_string())
    }
}
