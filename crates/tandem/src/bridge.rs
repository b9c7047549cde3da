//! Fan-out bridge: turns the store-wide session update feed into local,
//! identity-targeted deliveries.
//!
//! Every process runs one bridge. A session update is published once,
//! wherever the change happened; each bridge reads it, works out the two
//! participants, and hands the untouched bytes to its own registry. The
//! registry ignores identities that are not connected here, so exactly
//! the processes holding a participant deliver to it.

use tandem_protocol::{Codec, JsonCodec, RoutedEnvelope};
use tandem_store::Subscription;

use crate::RegistryHandle;

pub(crate) async fn run(mut feed: Subscription, registry: RegistryHandle) {
    tracing::debug!("fan-out bridge started");

    while let Some(msg) = feed.recv().await {
        let route = match JsonCodec.decode::<RoutedEnvelope>(&msg.payload) {
            Ok(envelope) => envelope.payload,
            Err(e) => {
                tracing::warn!(topic = %msg.topic, error = %e, "undecodable session update skipped");
                continue;
            }
        };

        for identity in [route.participant_a, route.participant_b] {
            match registry
                .deliver_to_identity(identity.clone(), msg.payload.clone())
                .await
            {
                Ok(true) => tracing::trace!(session = %route.id, %identity, "update delivered"),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "registry gone, fan-out bridge stopping");
                    return;
                }
            }
        }
    }

    tracing::debug!("session update feed closed, fan-out bridge stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tandem_protocol::{Identity, ServerMessage, Session, SessionId};
    use tandem_store::{MemoryStore, SharedStore, keys};
    use tandem_transport::ConnectionId;
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn test_bridge_delivers_only_to_participants_bound_here() {
        let store = MemoryStore::new();
        let (ev_tx, _ev_rx) = mpsc::unbounded_channel();
        let registry = RegistryHandle::spawn(8, ev_tx);

        let mut p1 = registry.register(ConnectionId::new(1)).await.unwrap();
        registry
            .bind_identity(ConnectionId::new(1), Identity::new("p1"))
            .await
            .unwrap();
        let mut outsider = registry.register(ConnectionId::new(2)).await.unwrap();
        registry
            .bind_identity(ConnectionId::new(2), Identity::new("p3"))
            .await
            .unwrap();

        let feed = store.subscribe(keys::SESSION_TOPIC_PREFIX).await.unwrap();
        tokio::spawn(run(feed, registry.clone()));

        // p2 lives on another process: nothing to do for it here.
        let session = Session::new(
            SessionId::new("s1"),
            Identity::new("p1"),
            Identity::new("p2"),
            "A".into(),
            "B".into(),
            0u8,
        );
        let bytes = JsonCodec.encode(&ServerMessage::SessionUpdate(session)).unwrap();
        store
            .publish(&keys::session_topic(&SessionId::new("s1")), bytes.clone())
            .await
            .unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), p1.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, bytes);
        assert!(outsider.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bridge_skips_garbage_and_keeps_going() {
        let store = MemoryStore::new();
        let (ev_tx, _ev_rx) = mpsc::unbounded_channel();
        let registry = RegistryHandle::spawn(8, ev_tx);
        let mut p1 = registry.register(ConnectionId::new(1)).await.unwrap();
        registry
            .bind_identity(ConnectionId::new(1), Identity::new("p1"))
            .await
            .unwrap();

        let feed = store.subscribe(keys::SESSION_TOPIC_PREFIX).await.unwrap();
        tokio::spawn(run(feed, registry.clone()));

        store
            .publish("session-updates:bad", b"not json".to_vec())
            .await
            .unwrap();
        let good = br#"{"type":"session_update","payload":{"id":"s","participantA":"p2","participantB":"p1"}}"#;
        store
            .publish("session-updates:s", good.to_vec())
            .await
            .unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), p1.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, good.to_vec());
    }
}
