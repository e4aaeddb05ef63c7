//! Custom query hook contract.
//!
//! Custom requests carry an opaque payload the adapter does not interpret.
//! Each responder hands the payload to an application-supplied handler
//! together with a single-shot [`ReplySink`]; the handler computes its reply
//! asynchronously and fires the sink exactly once to trigger publishing. A
//! handler that drops the sink without firing simply never replies - the
//! originator sees one missing quorum vote and, at worst, a timeout. Nothing
//! is fatal anywhere on this path.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;

/// Single-use reply callback for a custom request.
///
/// Consumed by value, so the type system enforces at-most-once use.
pub struct ReplySink {
    tx: oneshot::Sender<Value>,
}

impl ReplySink {
    pub(crate) fn new(tx: oneshot::Sender<Value>) -> Self {
        Self { tx }
    }

    /// Fire the reply. `None` publishes a null payload, matching a handler
    /// that acknowledges without a value.
    pub fn reply(self, data: Option<Value>) {
        // Receiver gone means the responder task stopped; nothing to do.
        let _ = self.tx.send(data.unwrap_or(Value::Null));
    }
}

/// Application hook answering custom requests on this process.
#[async_trait]
pub trait CustomHandler: Send + Sync {
    /// Handle one custom request payload. May complete before or after the
    /// sink fires; the sink can be moved into other tasks.
    async fn handle(&self, data: Value, reply: ReplySink);
}

/// The default hook: acknowledge immediately with no value.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateAck;

#[async_trait]
impl CustomHandler for ImmediateAck {
    async fn handle(&self, _data: Value, reply: ReplySink) {
        reply.reply(None);
    }
}
