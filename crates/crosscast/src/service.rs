//! Cluster adapter service: the dispatcher and the public operation surface.
//!
//! One [`ClusterAdapter`] runs per process. At construction it subscribes to
//! the request and response channels and spawns one listener task per
//! channel. Every inbound message flows through
//! [`dispatch`](ClusterAdapter::dispatch), which prefix-routes it:
//!
//! - request channel: answer it (responder side) - every process answers
//!   every request, including its own broadcasts;
//! - response channel: feed the pending table (originator side) - processes
//!   with no matching entry drop it silently.
//!
//! Public operations build a request, register it in the pending table,
//! publish it, and await the completion; the per-request timer bounds the
//! wait.

use crate::domain::aggregate::QueryReply;
use crate::domain::channels::ChannelPair;
use crate::domain::config::AdapterConfig;
use crate::domain::error::AdapterError;
use crate::domain::pending::{PendingTable, TableStats};
use crate::domain::protocol::{
    self, QueryKind, RequestMessage, ResponseMessage,
};
use crate::ports::custom::{CustomHandler, ImmediateAck, ReplySink};
use crate::ports::provider::{LocalQueryProvider, NoLocalData};
use crosscast_bus::{BroadcastTransport, Subscription};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Statistics for the dispatcher.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Inbound requests answered (or attempted).
    pub requests_handled: AtomicU64,
    /// Inbound responses routed to the pending table.
    pub responses_routed: AtomicU64,
    /// Inbound messages dropped as malformed.
    pub malformed_dropped: AtomicU64,
}

/// Per-process adapter coordinating cluster-wide queries over a broadcast
/// bus.
///
/// Listener tasks hold a reference to the adapter, so it stays alive until
/// [`shutdown`](Self::shutdown) is called even if the caller drops its
/// handle.
pub struct ClusterAdapter {
    config: AdapterConfig,
    channels: ChannelPair,
    transport: Arc<dyn BroadcastTransport>,
    provider: Arc<dyn LocalQueryProvider>,
    custom: Arc<dyn CustomHandler>,
    pending: Arc<PendingTable>,
    stats: DispatchStats,
    request_listener: Mutex<Option<JoinHandle<()>>>,
    response_listener: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterAdapter {
    /// Create an adapter, subscribe to both channels, and start listening.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        config: AdapterConfig,
        transport: Arc<dyn BroadcastTransport>,
        provider: Arc<dyn LocalQueryProvider>,
        custom: Arc<dyn CustomHandler>,
    ) -> Result<Arc<Self>, AdapterError> {
        config.validate()?;
        let channels = ChannelPair::from_config(&config);
        let pending = PendingTable::new(config.request_timeout);

        let adapter = Arc::new(Self {
            config,
            channels,
            transport,
            provider,
            custom,
            pending,
            stats: DispatchStats::default(),
            request_listener: Mutex::new(None),
            response_listener: Mutex::new(None),
        });

        let request_sub = adapter.transport.subscribe(&adapter.channels.request);
        let response_sub = adapter.transport.subscribe(&adapter.channels.response);
        let request_task = tokio::spawn(Arc::clone(&adapter).listen(request_sub));
        let response_task = tokio::spawn(Arc::clone(&adapter).listen(response_sub));
        if let Ok(mut guard) = adapter.request_listener.lock() {
            *guard = Some(request_task);
        }
        if let Ok(mut guard) = adapter.response_listener.lock() {
            *guard = Some(response_task);
        }

        Ok(adapter)
    }

    /// Create an adapter with the default provider (no local data) and the
    /// default custom handler (immediate ack).
    pub fn with_defaults(
        config: AdapterConfig,
        transport: Arc<dyn BroadcastTransport>,
    ) -> Result<Arc<Self>, AdapterError> {
        Self::new(
            config,
            transport,
            Arc::new(NoLocalData),
            Arc::new(ImmediateAck),
        )
    }

    async fn listen(self: Arc<Self>, mut sub: Subscription) {
        let channel = sub.channel().to_string();
        while let Some(msg) = sub.recv().await {
            self.dispatch(&msg.channel, &msg.payload).await;
        }
        debug!(channel = %channel, "Listener stopped");
    }

    /// Route one inbound message by the channel it arrived on.
    ///
    /// Channel match is prefix match, never equality: a message on a
    /// sub-namespace of a logical channel belongs to it. Messages on neither
    /// channel are not ours and are ignored.
    pub async fn dispatch(&self, channel: &str, payload: &str) {
        if self.channels.covers_response(channel) {
            self.on_response(payload);
        } else if self.channels.covers_request(channel) {
            self.on_request(payload).await;
        }
    }

    /// Originator side: feed a response to the pending table.
    fn on_response(&self, payload: &str) {
        match protocol::decode_response(payload) {
            Ok(response) => {
                self.stats.responses_routed.fetch_add(1, Ordering::Relaxed);
                self.pending.absorb(&response);
            }
            Err(e) => {
                self.stats.malformed_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "Ignoring malformed response");
            }
        }
    }

    /// Responder side: answer a request with this process's local view.
    async fn on_request(&self, payload: &str) {
        let request = match protocol::decode_request(payload) {
            Ok(r) => r,
            Err(e) => {
                self.stats.malformed_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "Ignoring malformed request");
                return;
            }
        };
        self.stats.requests_handled.fetch_add(1, Ordering::Relaxed);

        match request {
            RequestMessage::Clients { request_id, rooms } => {
                let clients = self.provider.local_clients(&rooms).await;
                self.publish_response(ResponseMessage::with_clients(request_id, clients))
                    .await;
            }
            RequestMessage::ClientRooms { request_id, sid } => {
                let rooms = self.provider.client_rooms(&sid).await;
                self.publish_response(ResponseMessage::with_rooms(request_id, rooms))
                    .await;
            }
            RequestMessage::AllRooms { request_id } => {
                let rooms = self.provider.local_rooms().await;
                self.publish_response(ResponseMessage::with_rooms(request_id, rooms))
                    .await;
            }
            RequestMessage::RemoteJoin {
                request_id,
                sid,
                room,
            } => match self.provider.perform_join(&sid, &room).await {
                Ok(()) => self.publish_response(ResponseMessage::ack(request_id)).await,
                Err(e) => {
                    // No reply: the originator sees a missing vote at most.
                    debug!(sid = %sid, room = %room, error = %e, "Join failed locally, withholding ack");
                }
            },
            RequestMessage::RemoteLeave {
                request_id,
                sid,
                room,
            } => match self.provider.perform_leave(&sid, &room).await {
                Ok(()) => self.publish_response(ResponseMessage::ack(request_id)).await,
                Err(e) => {
                    debug!(sid = %sid, room = %room, error = %e, "Leave failed locally, withholding ack");
                }
            },
            RequestMessage::RemoteDisconnect {
                request_id,
                sid,
                close,
            } => match self.provider.perform_disconnect(&sid, close).await {
                Ok(()) => self.publish_response(ResponseMessage::ack(request_id)).await,
                Err(e) => {
                    debug!(sid = %sid, error = %e, "Disconnect failed locally, withholding ack");
                }
            },
            RequestMessage::Custom { request_id, data } => {
                // The hook replies through a single-shot sink, possibly from
                // another task and possibly never; publishing happens when
                // and if the sink fires.
                let (tx, rx) = oneshot::channel();
                let sink = ReplySink::new(tx);
                let handler = Arc::clone(&self.custom);
                let transport = Arc::clone(&self.transport);
                let channel = self.channels.response.clone();
                tokio::spawn(async move {
                    handler.handle(data, sink).await;
                    let Ok(value) = rx.await else {
                        debug!(request_id = %request_id, "Custom handler dropped its reply sink");
                        return;
                    };
                    publish_response_via(
                        transport.as_ref(),
                        &channel,
                        &ResponseMessage::with_data(request_id, value),
                    )
                    .await;
                });
            }
        }
    }

    async fn publish_response(&self, response: ResponseMessage) {
        publish_response_via(self.transport.as_ref(), &self.channels.response, &response).await;
    }

    /// Connected client ids across the cluster, optionally filtered to
    /// clients in all of the given rooms. Quorum-aggregated; deduplicated,
    /// order unspecified.
    pub async fn clients(&self, rooms: Vec<String>) -> Result<Vec<String>, AdapterError> {
        let reply = self
            .run_query(QueryKind::Clients, |request_id| RequestMessage::Clients {
                request_id,
                rooms,
            })
            .await?;
        match reply {
            QueryReply::Clients(ids) => Ok(ids),
            _ => Err(AdapterError::Internal("reply shape mismatch")),
        }
    }

    /// Rooms of one client, wherever in the cluster it lives. Resolves on
    /// the first response carrying a rooms field, verbatim.
    pub async fn client_rooms(&self, sid: &str) -> Result<Vec<String>, AdapterError> {
        let sid = sid.to_string();
        let reply = self
            .run_query(QueryKind::ClientRooms, |request_id| {
                RequestMessage::ClientRooms { request_id, sid }
            })
            .await?;
        match reply {
            QueryReply::Rooms(rooms) => Ok(rooms),
            _ => Err(AdapterError::Internal("reply shape mismatch")),
        }
    }

    /// Every room known anywhere in the cluster. Quorum-aggregated union.
    pub async fn all_rooms(&self) -> Result<Vec<String>, AdapterError> {
        let reply = self
            .run_query(QueryKind::AllRooms, |request_id| RequestMessage::AllRooms {
                request_id,
            })
            .await?;
        match reply {
            QueryReply::Rooms(rooms) => Ok(rooms),
            _ => Err(AdapterError::Internal("reply shape mismatch")),
        }
    }

    /// Join a client to a room wherever it lives. Resolves on the first ack.
    pub async fn remote_join(&self, sid: &str, room: &str) -> Result<(), AdapterError> {
        let (sid, room) = (sid.to_string(), room.to_string());
        self.run_query(QueryKind::RemoteJoin, |request_id| {
            RequestMessage::RemoteJoin {
                request_id,
                sid,
                room,
            }
        })
        .await?;
        Ok(())
    }

    /// Remove a client from a room wherever it lives. Resolves on the first
    /// ack.
    pub async fn remote_leave(&self, sid: &str, room: &str) -> Result<(), AdapterError> {
        let (sid, room) = (sid.to_string(), room.to_string());
        self.run_query(QueryKind::RemoteLeave, |request_id| {
            RequestMessage::RemoteLeave {
                request_id,
                sid,
                room,
            }
        })
        .await?;
        Ok(())
    }

    /// Disconnect a client wherever it lives; `close` also closes the
    /// underlying socket. Resolves on the first ack.
    pub async fn remote_disconnect(&self, sid: &str, close: bool) -> Result<(), AdapterError> {
        let sid = sid.to_string();
        self.run_query(QueryKind::RemoteDisconnect, |request_id| {
            RequestMessage::RemoteDisconnect {
                request_id,
                sid,
                close,
            }
        })
        .await?;
        Ok(())
    }

    /// Broadcast an application-defined query; every process's custom
    /// handler answers. Quorum-aggregated; replies in arrival order.
    pub async fn custom_request(&self, data: Value) -> Result<Vec<Value>, AdapterError> {
        let reply = self
            .run_query(QueryKind::Custom, |request_id| RequestMessage::Custom {
                request_id,
                data,
            })
            .await?;
        match reply {
            QueryReply::Replies(replies) => Ok(replies),
            _ => Err(AdapterError::Internal("reply shape mismatch")),
        }
    }

    /// Issue one distributed query: snapshot the quorum, register the
    /// pending entry (arming its timer), publish, and await resolution.
    ///
    /// A publish failure cancels the entry and surfaces immediately instead
    /// of letting the caller wait out the timeout.
    async fn run_query(
        &self,
        kind: QueryKind,
        build: impl FnOnce(String) -> RequestMessage,
    ) -> Result<QueryReply, AdapterError> {
        let expected = if kind.is_quorum() {
            self.transport.subscriber_count(&self.channels.request)
        } else {
            0
        };

        let (id, reply_rx) = PendingTable::register(&self.pending, kind, expected);
        let request = build(id.to_string());

        let raw = match protocol::encode_request(&request) {
            Ok(raw) => raw,
            Err(e) => {
                self.pending.cancel(id);
                return Err(e.into());
            }
        };

        if let Err(e) = self.transport.publish(&self.channels.request, raw).await {
            self.pending.cancel(id);
            return Err(e.into());
        }

        match reply_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(AdapterError::Closed),
        }
    }

    /// Stop answering cluster requests (drops the request-channel
    /// subscription) while continuing to aggregate responses for calls still
    /// in flight. Used when shutting down or draining a process.
    pub fn drain(&self) {
        let Ok(mut guard) = self.request_listener.lock() else {
            return;
        };
        if let Some(handle) = guard.take() {
            handle.abort();
            debug!(channel = %self.channels.request, "Drained: no longer answering cluster requests");
        }
    }

    /// Stop both listeners. In-flight calls fail with their timeout; new
    /// inbound messages are no longer observed.
    pub fn shutdown(&self) {
        self.drain();
        let Ok(mut guard) = self.response_listener.lock() else {
            return;
        };
        if let Some(handle) = guard.take() {
            handle.abort();
            debug!(channel = %self.channels.response, "Shut down adapter listeners");
        }
    }

    /// The adapter configuration.
    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// The derived request/response channel names.
    #[must_use]
    pub fn channels(&self) -> &ChannelPair {
        &self.channels
    }

    /// Pending-table statistics.
    #[must_use]
    pub fn table_stats(&self) -> &TableStats {
        self.pending.stats()
    }

    /// Dispatcher statistics.
    #[must_use]
    pub fn dispatch_stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Number of requests currently in flight from this process.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }
}

/// Publish a response, logging (never propagating) failures - a lost
/// response manifests to the originator as a missing vote, not an error
/// here.
async fn publish_response_via(
    transport: &dyn BroadcastTransport,
    channel: &str,
    response: &ResponseMessage,
) {
    match protocol::encode_response(response) {
        Ok(raw) => {
            if let Err(e) = transport.publish(channel, raw).await {
                warn!(request_id = %response.request_id, error = %e, "Failed to publish response");
            }
        }
        Err(e) => {
            warn!(request_id = %response.request_id, error = %e, "Failed to encode response");
        }
    }
}
