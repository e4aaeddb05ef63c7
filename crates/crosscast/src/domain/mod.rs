//! Domain types for the cluster query protocol: configuration, channel
//! naming, request identity, the wire codec, the pending-request table, and
//! the per-kind aggregation policy.

pub mod aggregate;
pub mod channels;
pub mod config;
pub mod correlation;
pub mod error;
pub mod pending;
pub mod protocol;
