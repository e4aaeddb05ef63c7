//! Pending Request Table.
//!
//! Maps request ids to the aggregation state and completion handle of every
//! distributed query this process currently has in flight.
//!
//! Exactly-once resolution is anchored on atomic map removal: whichever of
//! {aggregation resolve, timeout, publish-failure cancel} removes the entry
//! first delivers the outcome; the others find nothing and become no-ops.
//! Each entry owns a per-request timer task whose handle is aborted on any
//! earlier resolution, so timers never outlive their request.

use crate::domain::aggregate::{Aggregation, QueryReply};
use crate::domain::correlation::RequestId;
use crate::domain::error::AdapterError;
use crate::domain::protocol::{QueryKind, ResponseMessage};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Receiver half of a pending request's completion.
pub type ReplyReceiver = oneshot::Receiver<Result<QueryReply, AdapterError>>;

/// Statistics for the pending request table.
#[derive(Debug, Default)]
pub struct TableStats {
    /// Total requests registered.
    pub total_registered: AtomicU64,
    /// Total requests resolved by aggregation.
    pub total_completed: AtomicU64,
    /// Total requests that hit their deadline.
    pub total_timeouts: AtomicU64,
    /// Total requests cancelled before any resolution (publish failures).
    pub total_cancelled: AtomicU64,
}

/// One in-flight distributed query.
struct PendingQuery {
    /// Per-kind aggregation state.
    aggregation: Aggregation,
    /// Single-shot completion back to the caller.
    reply_tx: oneshot::Sender<Result<QueryReply, AdapterError>>,
    /// Handle to this request's timeout task.
    timer: AbortHandle,
    /// When the request was issued (for latency logging).
    issued_at: Instant,
}

/// The table of in-flight requests issued by this process.
///
/// Flow:
/// 1. A public operation calls [`register`](Self::register), which inserts
///    an entry, arms the per-request timer, and returns the receiver.
/// 2. The dispatcher feeds every response-channel message to
///    [`absorb`](Self::absorb); responses with no matching entry (late,
///    duplicate, foreign) are dropped silently.
/// 3. The first of {resolve, timeout, cancel} removes the entry and fires
///    the completion exactly once.
pub struct PendingTable {
    entries: DashMap<RequestId, PendingQuery>,
    /// Per-call deadline, armed at registration.
    timeout: Duration,
    stats: TableStats,
}

impl PendingTable {
    /// Create a table whose requests expire after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            timeout,
            stats: TableStats::default(),
        })
    }

    /// Register a new in-flight request and arm its timer.
    ///
    /// Takes the table by `Arc` (like `Arc::clone`) because the timer task
    /// holds a reference until it fires or is aborted. `expected` is the
    /// quorum snapshot taken by the caller at issue time; it is not
    /// refreshed if cluster membership changes mid-flight.
    pub fn register(
        this: &Arc<Self>,
        kind: QueryKind,
        expected: usize,
    ) -> (RequestId, ReplyReceiver) {
        let id = RequestId::new();
        let (reply_tx, reply_rx) = oneshot::channel();

        // The timer starts a hair before the insert below; config validation
        // guarantees a non-zero timeout, so expiry cannot beat the insert.
        let table = Arc::clone(this);
        let timeout = this.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            table.expire(id);
        })
        .abort_handle();

        this.entries.insert(
            id,
            PendingQuery {
                aggregation: Aggregation::new(kind, expected),
                reply_tx,
                timer,
                issued_at: Instant::now(),
            },
        );
        this.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            request_id = %id,
            kind = ?kind,
            expected = expected,
            "Registered pending request"
        );

        (id, reply_rx)
    }

    /// Feed one decoded response into the matching entry's aggregation.
    ///
    /// No matching entry is the expected case for late, duplicate, and
    /// foreign-process responses - they are dropped without error.
    pub fn absorb(&self, response: &ResponseMessage) {
        let Ok(id) = RequestId::parse(&response.request_id) else {
            // A token we could not have issued; some other process's call.
            debug!(request_id = %response.request_id, "Response for a foreign request token");
            return;
        };

        let resolved = match self.entries.get_mut(&id) {
            Some(mut entry) => entry.aggregation.absorb(response),
            None => {
                debug!(request_id = %id, "Response for unknown or completed request");
                return;
            }
        };

        if resolved {
            self.resolve(id);
        }
    }

    /// Cancel a request that never made it onto the wire (publish failure).
    ///
    /// The caller reports the transport error itself; the dropped completion
    /// is never awaited.
    pub fn cancel(&self, id: RequestId) -> bool {
        if let Some((_, entry)) = self.entries.remove(&id) {
            entry.timer.abort();
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(request_id = %id, "Cancelled pending request");
            true
        } else {
            false
        }
    }

    /// Number of currently pending requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    /// Check if a request id is pending.
    #[must_use]
    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id)
    }

    /// Get statistics.
    #[must_use]
    pub fn stats(&self) -> &TableStats {
        &self.stats
    }

    /// Deliver the aggregated value and retire the entry.
    fn resolve(&self, id: RequestId) {
        if let Some((_, entry)) = self.entries.remove(&id) {
            let PendingQuery {
                aggregation,
                reply_tx,
                timer,
                issued_at,
            } = entry;
            timer.abort();
            self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
            debug!(
                request_id = %id,
                elapsed_ms = issued_at.elapsed().as_millis() as u64,
                "Resolved pending request"
            );
            // Receiver dropped means the caller gave up; nothing to do.
            let _ = reply_tx.send(Ok(aggregation.into_reply()));
        }
    }

    /// Timer callback: fail the entry with a timeout if it is still here.
    fn expire(&self, id: RequestId) {
        if let Some((_, entry)) = self.entries.remove(&id) {
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
            warn!(
                request_id = %id,
                received = entry.aggregation.received(),
                timeout_ms = self.timeout.as_millis() as u64,
                "Pending request timed out"
            );
            let _ = entry.reply_tx.send(Err(AdapterError::Timeout));
        }
    }
}
