//! Adapter error taxonomy.

use crate::domain::config::ConfigError;
use crate::domain::protocol::ProtocolError;
use crosscast_bus::TransportError;
use thiserror::Error;

/// Errors surfaced to callers of the public operations.
///
/// Malformed or incomplete inbound messages are deliberately *not* part of
/// this taxonomy: the dispatcher drops them silently, and "zero responses
/// received" manifests uniformly as [`AdapterError::Timeout`].
#[derive(Debug, Error)]
pub enum AdapterError {
    /// No qualifying resolution before the deadline. Terminal for the call;
    /// a caller wanting retries must reissue the whole operation.
    #[error("request timed out")]
    Timeout,

    /// Publish/subscribe failure, surfaced immediately without waiting for
    /// the timeout. No implicit retry.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Could not encode our own outbound message.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// Rejected configuration at adapter construction.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The adapter shut down while the call was in flight.
    #[error("adapter closed")]
    Closed,

    /// Invariant violation; indicates a bug, not an operational condition.
    #[error("internal error: {0}")]
    Internal(&'static str),
}
