//! # Membership & Quorum Snapshots
//!
//! The quorum for a request is the subscriber count on the request channel
//! *at issue time*, and it is deliberately never refreshed mid-flight: a
//! process joining after issue is not waited for, and a process that leaves
//! before replying costs the request its quorum until the timeout steps in.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use crosscast::{
        AdapterConfig, AdapterError, ClusterAdapter, ImmediateAck, LocalQueryProvider,
    };
    use crosscast_bus::{BroadcastTransport, InMemoryBroadcastBus};

    fn short_config() -> AdapterConfig {
        AdapterConfig {
            request_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    struct FixedNode {
        clients: Vec<String>,
    }

    impl FixedNode {
        fn new(clients: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                clients: clients.iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    #[async_trait]
    impl LocalQueryProvider for FixedNode {
        async fn local_clients(&self, _rooms: &[String]) -> Vec<String> {
            self.clients.clone()
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

    /// A process that joins after a request was issued is not part of that
    /// request's quorum: the snapshot resolves with the original members'
    /// answers only.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_quorum_snapshot_ignores_later_joiners() {
        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = node(&bus, FixedNode::new(&["a"]));
        let _peer = node(&bus, FixedNode::new(&["b"]));

        let call = {
            let origin = origin.clone();
            tokio::spawn(async move { origin.clients(vec![]).await })
        };

        // Joins mid-flight; it never saw the broadcast and owes no reply.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _latecomer = node(&bus, FixedNode::new(&["c"]));

        let mut ids = call.await.expect("join").expect("clients");
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }

    /// A quorum member that unsubscribes without replying leaves the request
    /// short of its snapshot; only the timeout ends it.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_quorum_overcount_ends_in_timeout() {
        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = node(&bus, FixedNode::new(&["a"]));

        // Counted in the quorum snapshot, never answers.
        let silent_member = bus.subscribe(&origin.channels().request);

        let err = origin.clients(vec![]).await.err().expect("timeout");
        assert!(matches!(err, AdapterError::Timeout));
        assert_eq!(origin.pending_count(), 0);

        drop(silent_member);
    }

    /// Draining removes a process from future quorums entirely.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drained_process_leaves_future_quorums() {
        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = node(&bus, FixedNode::new(&["a"]));
        let peer = node(&bus, FixedNode::new(&["b"]));

        peer.drain();
        // Aborting the listener drops its subscription at the next yield.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bus.subscriber_count(&origin.channels().request), 1);

        // Quorum of one: the origin's own answer suffices.
        let ids = origin.clients(vec![]).await.expect("clients");
        assert_eq!(ids, vec!["a"]);
    }

    /// A drained process still aggregates responses for calls it issued
    /// before draining stopped it from answering new requests.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drained_process_still_originates_queries() {
        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = node(&bus, FixedNode::new(&["a"]));
        let _peer = node(&bus, FixedNode::new(&["b"]));

        origin.drain();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Only the peer is subscribed to requests now, so quorum is 1 and
        // the peer's answer alone resolves the call.
        let ids = origin.clients(vec![]).await.expect("clients");
        assert_eq!(ids, vec!["b"]);
    }

    /// Shutdown stops aggregation too: a call issued after shutdown can only
    /// time out.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_stops_aggregation() {
        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = node(&bus, FixedNode::new(&["a"]));
        let _peer = node(&bus, FixedNode::new(&["b"]));

        origin.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = origin.clients(vec![]).await.err().expect("timeout");
        assert!(matches!(err, AdapterError::Timeout));
    }

    /// Custom queries against an empty cluster (no subscribers at all) can
    /// never gather a reply and resolve by timeout.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_zero_responses_is_a_timeout_not_an_error() {
        let bus = Arc::new(InMemoryBroadcastBus::new());
        let origin = node(&bus, FixedNode::new(&[]));
        origin.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = origin
            .custom_request(Value::Null)
            .await
            .err()
            .expect("timeout");
        assert!(matches!(err, AdapterError::Timeout));
        assert_eq!(origin.pending_count(), 0);
    }
}
