//! # Crosscast Bus - Broadcast Transport Seam
//!
//! The cluster query protocol only needs three things from its transport:
//! publish a payload to a named channel, report how many processes are
//! subscribed to a channel, and deliver inbound messages for a subscribed
//! channel. This crate defines that seam ([`BroadcastTransport`]) and ships
//! an in-memory implementation used by tests and single-host deployments.
//!
//! ## Delivery semantics
//!
//! - Every subscriber receives every published message, **including the
//!   publisher's own** (broadcast-channel semantics).
//! - A subscription to channel `C` receives every message whose channel name
//!   starts with `C` (pattern-subscribe semantics); sub-namespaces can share
//!   a parent channel prefix.
//! - [`BroadcastTransport::subscriber_count`] counts exact registrations of
//!   the queried channel name, mirroring `PUBSUB NUMSUB`.
//!
//! The transport may drop or duplicate messages; the protocol layer above is
//! built to tolerate that.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod message;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use message::BusMessage;
pub use publisher::{BroadcastTransport, InMemoryBroadcastBus, TransportError};
pub use subscriber::{Subscription, SubscriptionError};

/// Maximum messages to buffer per subscriber before older ones are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
