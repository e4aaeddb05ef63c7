//! Local query provider contract.
//!
//! The provider is the external per-process component that actually knows
//! which clients and rooms exist on this process. The adapter delegates
//! every inbound request to it and publishes whatever it answers; it never
//! computes membership itself.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the local registry.
///
/// A responder whose provider fails simply publishes no reply; to the
/// originating process that is indistinguishable from a missing quorum vote
/// and at worst ends in a timeout.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The target connection id is not known to this process.
    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    /// Registry-specific failure.
    #[error("{0}")]
    Other(String),
}

/// This process's local view of connections and rooms.
///
/// Every method defaults to "no local data" - empty lists and successful
/// no-op outcomes - which is exactly how a process with nothing relevant to
/// report must answer (empty response, not an error). Implementations
/// override only what their registry can actually answer.
#[async_trait]
pub trait LocalQueryProvider: Send + Sync {
    /// Ids of local clients connected to all of the given rooms
    /// (empty filter = every local client).
    async fn local_clients(&self, _rooms: &[String]) -> Vec<String> {
        Vec::new()
    }

    /// Rooms the given local client has joined.
    async fn client_rooms(&self, _sid: &str) -> Vec<String> {
        Vec::new()
    }

    /// Every room known to this process.
    async fn local_rooms(&self) -> Vec<String> {
        Vec::new()
    }

    /// Join a local client to a room.
    async fn perform_join(&self, _sid: &str, _room: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Remove a local client from a room.
    async fn perform_leave(&self, _sid: &str, _room: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Disconnect a local client; `close` also closes the underlying socket.
    async fn perform_disconnect(&self, _sid: &str, _close: bool) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// The default provider: a process that reports no local data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocalData;

#[async_trait]
impl LocalQueryProvider for NoLocalData {}
