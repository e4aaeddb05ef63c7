//! # Bus Message
//!
//! The unit of delivery on the broadcast transport.

/// A single message delivered on the bus.
///
/// The payload is an opaque string; the protocol layer owns serialization.
/// The channel name is carried alongside because a subscription may cover
/// more than one concrete channel (prefix delivery) and the dispatcher
/// routes on the name it actually arrived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Concrete channel the message was published to.
    pub channel: String,
    /// Serialized payload.
    pub payload: String,
}

impl BusMessage {
    /// Create a new bus message.
    #[must_use]
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}
