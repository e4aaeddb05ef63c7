//! Channel naming and channel-match semantics.
//!
//! Two broadcast channels per (prefix, namespace) pair: one for requests,
//! one for responses. An inbound message belongs to a logical channel iff
//! its concrete channel name *starts with* the logical channel name - never
//! exact equality. Sub-namespaces share a parent channel prefix this way,
//! and implementations must preserve that.

use crate::domain::config::AdapterConfig;

/// The request/response channel pair derived from prefix and namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPair {
    /// Channel requests are broadcast on.
    pub request: String,
    /// Channel responses are broadcast on.
    pub response: String,
}

impl ChannelPair {
    /// Derive the channel pair from a prefix and namespace.
    #[must_use]
    pub fn new(prefix: &str, namespace: &str) -> Self {
        Self {
            request: format!("{prefix}-request#{namespace}#"),
            response: format!("{prefix}-response#{namespace}#"),
        }
    }

    /// Derive the channel pair from an adapter configuration.
    #[must_use]
    pub fn from_config(config: &AdapterConfig) -> Self {
        Self::new(&config.prefix, &config.namespace)
    }

    /// Does a concrete channel name belong to the logical request channel?
    #[must_use]
    pub fn covers_request(&self, channel: &str) -> bool {
        covers(channel, &self.request)
    }

    /// Does a concrete channel name belong to the logical response channel?
    #[must_use]
    pub fn covers_response(&self, channel: &str) -> bool {
        covers(channel, &self.response)
    }
}

/// Prefix-match channel test: `channel` belongs to `logical` iff it starts
/// with the logical channel's exact name.
#[must_use]
pub fn covers(channel: &str, logical: &str) -> bool {
    channel.starts_with(logical)
}
