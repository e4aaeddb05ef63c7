//! Crosscast - cluster-wide queries for realtime socket gateways.
//!
//! Each process in a cluster owns a subset of realtime client connections.
//! Crosscast answers cluster-wide questions ("who is connected", "what rooms
//! exist", "move this client", "disconnect this client", or an arbitrary
//! custom query) by broadcasting a request over a shared pub/sub bus and
//! aggregating every process's reply within a bounded time window.
//!
//! # Architecture
//!
//! ```text
//!  caller ──► ClusterAdapter ── encode ──► request channel ─────┐
//!                  │                                            │ (broadcast,
//!                  │ register                                   │  every node
//!                  ▼                                            ▼  incl. self)
//!            PendingTable                                 ClusterAdapter
//!        (oneshot + per-request timer)                    LocalQueryProvider
//!                  ▲                                            │
//!                  │ aggregate (quorum / first-response)        │
//!                  └───────────── response channel ◄── encode ──┘
//! ```
//!
//! A request resolves exactly once: by quorum, by first response, or by
//! timeout - whichever happens first. Late, duplicate, and foreign responses
//! are dropped silently; the transport is allowed to be unreliable.
//!
//! # Usage
//!
//! ```ignore
//! use crosscast::{AdapterConfig, ClusterAdapter};
//! use crosscast_bus::InMemoryBroadcastBus;
//! use std::sync::Arc;
//!
//! let bus = Arc::new(InMemoryBroadcastBus::new());
//! let adapter = ClusterAdapter::with_defaults(AdapterConfig::default(), bus)?;
//!
//! let everyone = adapter.clients(vec![]).await?;
//! let lobby = adapter.clients(vec!["lobby".into()]).await?;
//! adapter.remote_join("sid1", "lobby").await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod ports;
pub mod service;

// Re-exports for public API
pub use domain::channels::ChannelPair;
pub use domain::config::{AdapterConfig, ConfigError};
pub use domain::correlation::RequestId;
pub use domain::error::AdapterError;
pub use domain::pending::TableStats;
pub use domain::protocol::{QueryKind, RequestMessage, ResponseMessage};
pub use ports::custom::{CustomHandler, ImmediateAck, ReplySink};
pub use ports::provider::{LocalQueryProvider, NoLocalData, ProviderError};
pub use service::{ClusterAdapter, DispatchStats};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
