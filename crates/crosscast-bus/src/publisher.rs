//! # Broadcast Transport
//!
//! Defines the publishing side of the transport seam and the in-memory
//! implementation.

use crate::message::BusMessage;
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Errors from transport operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport was shut down.
    #[error("transport closed")]
    Closed,

    /// A publish could not be delivered to the transport.
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Trait the cluster query protocol uses to reach its pub/sub transport.
///
/// Implementations must deliver every published message to every matching
/// subscription, including the publisher's own.
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    /// Publish a payload to a channel.
    ///
    /// # Returns
    ///
    /// The number of subscriptions the message was handed to. Zero is not an
    /// error; it only means nobody is listening right now.
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, TransportError>;

    /// Number of subscriptions registered under exactly this channel name.
    ///
    /// This is the quorum source for the protocol layer, so it must reflect
    /// live membership (`PUBSUB NUMSUB` semantics), not historical peaks.
    fn subscriber_count(&self, channel: &str) -> usize;

    /// Subscribe to a channel (prefix delivery).
    ///
    /// The returned handle receives every message whose concrete channel
    /// name starts with `channel`. Dropping it unsubscribes.
    fn subscribe(&self, channel: &str) -> Subscription;
}

/// In-memory implementation of the broadcast transport.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer
/// semantics. Suitable for tests and single-host operation; clustered
/// deployments provide their own implementation over a networked broker.
pub struct InMemoryBroadcastBus {
    /// Broadcast sender shared by all channels.
    sender: broadcast::Sender<BusMessage>,

    /// Active subscription count by exact channel name.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Total messages published.
    messages_published: AtomicU64,

    /// Per-subscriber buffer capacity.
    capacity: usize,
}

impl InMemoryBroadcastBus {
    /// Create a new in-memory bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            messages_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Get the per-subscriber buffer capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the total number of messages published.
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryBroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BroadcastTransport for InMemoryBroadcastBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, TransportError> {
        self.messages_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(BusMessage::new(channel, payload)) {
            Ok(receiver_count) => {
                debug!(channel = channel, receivers = receiver_count, "Message published");
                Ok(receiver_count)
            }
            Err(e) => {
                // No receivers - message is dropped
                warn!(channel = channel, error = %e, "Message dropped (no receivers)");
                Ok(0)
            }
        }
    }

    fn subscriber_count(&self, channel: &str) -> usize {
        self.subscriptions
            .read()
            .map(|subs| subs.get(channel).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn subscribe(&self, channel: &str) -> Subscription {
        let receiver = self.sender.subscribe();

        // Track subscription
        {
            if let Ok(mut subs) = self.subscriptions.write() {
                *subs.entry(channel.to_string()).or_insert(0) += 1;
            }
        }

        debug!(channel = channel, "New subscription created");

        Subscription::new(receiver, channel.to_string(), self.subscriptions.clone())
    }
}
