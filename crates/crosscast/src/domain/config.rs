//! Adapter configuration with validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default channel prefix shared by every process in a cluster.
pub const DEFAULT_PREFIX: &str = "socket.io";

/// Default logical namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Default per-call timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The channel prefix is empty.
    #[error("channel prefix cannot be empty")]
    EmptyPrefix,

    /// The request timeout is zero.
    #[error("request timeout cannot be 0")]
    ZeroTimeout,
}

/// Cluster adapter configuration.
///
/// The prefix and namespace must match across every process in the cluster;
/// together they derive the two broadcast channel names. The timeout bounds
/// every public operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Channel prefix (cluster-wide).
    pub prefix: String,
    /// Logical namespace.
    pub namespace: String,
    /// Per-call timeout for distributed queries.
    pub request_timeout: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl AdapterConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }

        // A zero timeout would let the timer win every race at issue time.
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(())
    }
}
