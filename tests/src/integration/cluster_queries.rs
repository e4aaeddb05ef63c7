//! # Cluster Query Flows
//!
//! Each `ClusterAdapter` here stands in for one server process; they share a
//! single in-memory broadcast bus, so every request reaches every process
//! (including the originator) and every response reaches every process's
//! dispatcher.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crosscast::{
        AdapterConfig, AdapterError, ClusterAdapter, CustomHandler, ImmediateAck,
        LocalQueryProvider, ReplySink,
    };
    use crosscast_bus::{BroadcastTransport, InMemoryBroadcastBus};

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn short_config() -> AdapterConfig {
        AdapterConfig {
            request_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    /// A process whose registry holds fixed data.
    struct FixedNode {
        clients: Vec<String>,
        rooms: Vec<String>,
    }

    impl FixedNode {
        fn new(clients: &[&str], rooms: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                clients: clients.iter().map(|s| s.to_string()).collect(),
                rooms: rooms.iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    #[async_trait]
    impl LocalQueryProvider for FixedNode {
        async fn local_clients(&self, _rooms: &[String]) -> Vec<String> {
            self.clients.clone()
        }
        async fn client_rooms(&self, _sid: &str) -> Vec<String> {
            self.rooms.clone()
        }
        async fn local_rooms(&self) -> Vec<String> {
            self.rooms.clone()
        }
    }

    /// A custom hook that always answers with a fixed payload.
    struct FixedReply(Value);

    #[async_trait]
    impl CustomHandler for FixedReply {
        async fn handle(&self, _data: Value, reply: ReplySink) {
            reply.reply(Some(self.0.clone()));
        }
    }

    fn node(
        bus: &Arc<InMemoryBroadcastBus>,
        provider: Arc<dyn LocalQueryProvider>,
    ) -> Arc<ClusterAdapter> {
        ClusterAdapter::new(
            short_config(),
            bus.clone(),
            provider,
            Arc::new(ImmediateAck),
        )
        .expect("adapter")
    }

    // =========================================================================
    // QUORUM KINDS
    // =========================================================================

    /// Quorum = 3; responses {a,b}, {b,c}, {} resolve to the deduplicated
    /// union {a,b,c}.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_list_clients_quorum_dedup() {
        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = node(&bus, FixedNode::new(&["a", "b"], &[]));
        let _peer1 = node(&bus, FixedNode::new(&["b", "c"], &[]));
        let _peer2 = node(&bus, FixedNode::new(&[], &[]));

        let mut ids = origin.clients(vec!["lobby".into()]).await.expect("clients");
        ids.sort();

        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(origin.pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_all_rooms_union() {
        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = node(&bus, FixedNode::new(&[], &["r1", "r2"]));
        let _peer1 = node(&bus, FixedNode::new(&[], &["r2", "r3"]));
        let _peer2 = node(&bus, FixedNode::new(&[], &[]));

        let mut rooms = origin.all_rooms().await.expect("rooms");
        rooms.sort();

        assert_eq!(rooms, vec!["r1", "r2", "r3"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_custom_request_collects_every_reply() {
        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = ClusterAdapter::new(
            short_config(),
            bus.clone(),
            Arc::new(crosscast::NoLocalData),
            Arc::new(FixedReply(json!("pong1"))),
        )
        .expect("adapter");
        let _peer = ClusterAdapter::new(
            short_config(),
            bus.clone(),
            Arc::new(crosscast::NoLocalData),
            Arc::new(FixedReply(json!("pong2"))),
        )
        .expect("adapter");

        let replies = origin.custom_request(json!({"op": "ping"})).await.expect("replies");

        // Two processes, two replies; cross-process arrival order is not
        // pinned, only membership.
        assert_eq!(replies.len(), 2);
        assert!(replies.contains(&json!("pong1")));
        assert!(replies.contains(&json!("pong2")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_custom_hook_receives_request_payload() {
        /// Echoes the inbound payload back as its reply.
        struct Echo;

        #[async_trait]
        impl CustomHandler for Echo {
            async fn handle(&self, data: Value, reply: ReplySink) {
                reply.reply(Some(data));
            }
        }

        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = ClusterAdapter::new(
            short_config(),
            bus.clone(),
            Arc::new(crosscast::NoLocalData),
            Arc::new(Echo),
        )
        .expect("adapter");

        let payload = json!({"op": "sum", "args": [1, 2, 3]});
        let replies = origin.custom_request(payload.clone()).await.expect("replies");
        assert_eq!(replies, vec![payload]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_custom_hook_that_never_replies_times_out() {
        /// Drops the sink without firing it.
        struct Mute;

        #[async_trait]
        impl CustomHandler for Mute {
            async fn handle(&self, _data: Value, reply: ReplySink) {
                drop(reply);
            }
        }

        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = ClusterAdapter::new(
            short_config(),
            bus.clone(),
            Arc::new(crosscast::NoLocalData),
            Arc::new(Mute),
        )
        .expect("adapter");

        let err = origin.custom_request(json!(null)).await.err().expect("timeout");
        assert!(matches!(err, AdapterError::Timeout));
        assert_eq!(origin.pending_count(), 0);
    }

    // =========================================================================
    // FIRST-RESPONSE KINDS
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_client_rooms_first_response_verbatim() {
        let bus = Arc::new(InMemoryBroadcastBus::new());
        // Every process reports the same membership, so whichever response
        // lands first the value is pinned.
        let origin = node(&bus, FixedNode::new(&[], &["r1", "r2"]));
        let _peer = node(&bus, FixedNode::new(&[], &["r1", "r2"]));

        let rooms = origin.client_rooms("sid1").await.expect("rooms");
        assert_eq!(rooms, vec!["r1", "r2"]);
        assert_eq!(origin.pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_remote_join_resolves_and_reaches_every_process() {
        use std::sync::Mutex;

        /// Records join calls so the test can see who handled the request.
        struct Recording {
            joins: Mutex<Vec<(String, String)>>,
        }

        #[async_trait]
        impl LocalQueryProvider for Recording {
            async fn perform_join(
                &self,
                sid: &str,
                room: &str,
            ) -> Result<(), crosscast::ProviderError> {
                self.joins
                    .lock()
                    .expect("lock")
                    .push((sid.to_string(), room.to_string()));
                Ok(())
            }
        }

        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin_provider = Arc::new(Recording {
            joins: Mutex::new(Vec::new()),
        });
        let peer_provider = Arc::new(Recording {
            joins: Mutex::new(Vec::new()),
        });
        let origin = node(&bus, origin_provider.clone());
        let _peer = node(&bus, peer_provider.clone());

        origin.remote_join("sid1", "lobby").await.expect("join");

        // The call resolved on the first ack; the broadcast still reaches
        // both processes. Give the slower responder a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            *origin_provider.joins.lock().expect("lock"),
            vec![("sid1".to_string(), "lobby".to_string())]
        );
        assert_eq!(
            *peer_provider.joins.lock().expect("lock"),
            vec![("sid1".to_string(), "lobby".to_string())]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_remote_leave_and_disconnect_ack() {
        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = node(&bus, FixedNode::new(&[], &[]));

        origin.remote_leave("sid1", "lobby").await.expect("leave");
        origin.remote_disconnect("sid1", true).await.expect("disconnect");
        assert_eq!(origin.pending_count(), 0);
    }

    // =========================================================================
    // WIRE-LEVEL BEHAVIOR (foreign responders, prefix channels, lateness)
    // =========================================================================

    /// Pull the request id out of a captured request broadcast.
    fn request_id_of(payload: &str) -> String {
        let value: Value = serde_json::from_str(payload).expect("request JSON");
        value["requestid"].as_str().expect("requestid").to_string()
    }

    /// A response published on a sub-namespace of the response channel is
    /// still aggregated: channel match is prefix match, not equality.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_response_on_prefixed_channel_is_aggregated() {
        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = node(&bus, FixedNode::new(&["a"], &[]));
        let channels = origin.channels().clone();

        // A hand-rolled second "process": subscribes to the request channel
        // (so it is counted in the quorum) and answers on an extended
        // response channel name.
        let mut raw_sub = bus.subscribe(&channels.request);
        let raw_bus = bus.clone();
        let extended_channel = format!("{}extra", channels.response);
        tokio::spawn(async move {
            let msg = raw_sub.recv().await.expect("request broadcast");
            let response = format!(
                r#"{{"requestid":"{}","clients":["z"]}}"#,
                request_id_of(&msg.payload)
            );
            raw_bus
                .publish(&extended_channel, response)
                .await
                .expect("publish");
        });

        // Quorum of 2: the origin's own response plus the crafted one.
        let mut ids = origin.clients(vec![]).await.expect("clients");
        ids.sort();
        assert_eq!(ids, vec!["a", "z"]);
    }

    /// After a request resolves, a duplicate of its response is dropped
    /// silently and the adapter keeps working.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_duplicate_response_after_resolution_is_dropped() {
        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = node(&bus, FixedNode::new(&[], &["r1"]));
        let channels = origin.channels().clone();

        let mut raw_sub = bus.subscribe(&channels.request);

        let rooms = origin.client_rooms("sid1").await.expect("rooms");
        assert_eq!(rooms, vec!["r1"]);

        // Replay the response for the already-resolved request.
        let msg = raw_sub.try_recv().expect("sub open").expect("request seen");
        let replay = format!(
            r#"{{"requestid":"{}","rooms":["r9"]}}"#,
            request_id_of(&msg.payload)
        );
        bus.publish(&channels.response, replay).await.expect("publish");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(origin.pending_count(), 0);
        // Still alive and answering.
        let rooms = origin.client_rooms("sid1").await.expect("rooms");
        assert_eq!(rooms, vec!["r1"]);
    }

    /// Responses missing their expected payload field do not advance quorum:
    /// a quorum of two fed one bare ack and one real response stays pending
    /// until the timeout.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_incomplete_response_does_not_satisfy_quorum() {
        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = node(&bus, FixedNode::new(&["a"], &[]));
        let channels = origin.channels().clone();

        // Second quorum member answers without a clients field.
        let mut raw_sub = bus.subscribe(&channels.request);
        let raw_bus = bus.clone();
        let response_channel = channels.response.clone();
        tokio::spawn(async move {
            let msg = raw_sub.recv().await.expect("request broadcast");
            let bare = format!(r#"{{"requestid":"{}"}}"#, request_id_of(&msg.payload));
            raw_bus.publish(&response_channel, bare).await.expect("publish");
        });

        let err = origin.clients(vec![]).await.err().expect("timeout");
        assert!(matches!(err, AdapterError::Timeout));
        assert_eq!(origin.pending_count(), 0);
    }
}
