use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::RecipientKind;

const CHANNEL_CAPACITY: usize = 32;

/// Frame pushed to live subscribers. `kind` is "connected" for the
/// handshake ack and "notification" afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub payload: serde_json::Value,
    pub timestamp: String,
}

impl EventFrame {
    pub fn connected(identifier: &str) -> Self {
        Self {
            kind: "connected",
            payload: json!({ "identifiant": identifier }),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn notification(payload: serde_json::Value) -> Self {
        Self {
            kind: "notification",
            payload,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

struct Connection {
    group: RecipientKind,
    generation: u64,
    tx: mpsc::Sender<EventFrame>,
}

/// One registration's end of the live channel. The generation scopes
/// teardown to this registration: a stale stream closing after a
/// reconnect must not evict its replacement.
pub struct Subscription {
    pub frames: mpsc::Receiver<EventFrame>,
    pub generation: u64,
}

/// Live push connections, keyed by subscriber identifier (resident email,
/// prestataire NEQ, or "stpm"). Reconnecting under the same identifier
/// replaces the previous channel, so a flaky client never accumulates
/// stale entries.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Connection>,
    generation: AtomicU64,
}

/// A subscriber's group follows from the shape of its identifier:
/// "stpm" is the agent console, an email is a resident, anything else a
/// provider NEQ.
pub fn group_for(identifier: &str) -> RecipientKind {
    if identifier.eq_ignore_ascii_case("stpm") {
        RecipientKind::Stpm
    } else if identifier.contains('@') {
        RecipientKind::Resident
    } else {
        RecipientKind::Prestataire
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or replaces) the live channel for an identifier. The
    /// handshake ack is already queued on the returned receiver.
    pub fn open(&self, identifier: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        // The ack cannot fail: the channel is fresh and empty.
        let _ = tx.try_send(EventFrame::connected(identifier));
        let group = group_for(identifier);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self.connections.insert(
            identifier.to_string(),
            Connection {
                group,
                generation,
                tx,
            },
        );
        if previous.is_some() {
            debug!(identifier, "Replaced existing live connection");
        } else {
            debug!(identifier, ?group, "Opened live connection");
        }
        Subscription {
            frames: rx,
            generation,
        }
    }

    /// Removes the entry, but only while it still belongs to the given
    /// registration. After a reconnect the entry belongs to the newer
    /// registration, and the older stream's teardown leaves it alone.
    pub fn close(&self, identifier: &str, generation: u64) {
        let removed = self
            .connections
            .remove_if(identifier, |_, conn| conn.generation == generation);
        if removed.is_some() {
            debug!(identifier, "Closed live connection");
        }
    }

    pub fn is_connected(&self, identifier: &str) -> bool {
        self.connections.contains_key(identifier)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Pushes a frame to one subscriber. A full or closed channel drops
    /// the connection; the subscriber falls back to polling.
    pub fn send_to(&self, identifier: &str, frame: EventFrame) {
        let dead = match self.connections.get(identifier) {
            Some(conn) => conn.tx.try_send(frame).is_err(),
            None => false,
        };
        if dead {
            warn!(identifier, "Live channel unavailable, dropping connection");
            self.connections.remove(identifier);
        }
    }

    /// Pushes a frame to every live subscriber of a group.
    pub fn send_to_group(&self, group: RecipientKind, frame: &EventFrame) {
        let mut dead = Vec::new();
        for entry in self.connections.iter() {
            if entry.value().group == group
                && entry.value().tx.try_send(frame.clone()).is_err()
            {
                dead.push(entry.key().clone());
            }
        }
        for identifier in dead {
            warn!(identifier = %identifier, "Live channel unavailable, dropping connection");
            self.connections.remove(&identifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_inference_from_identifier_shape() {
        assert_eq!(group_for("stpm"), RecipientKind::Stpm);
        assert_eq!(group_for("STPM"), RecipientKind::Stpm);
        assert_eq!(group_for("alice@example.com"), RecipientKind::Resident);
        assert_eq!(group_for("NEQ1234"), RecipientKind::Prestataire);
    }

    #[tokio::test]
    async fn open_queues_connected_ack() {
        let registry = ConnectionRegistry::new();
        let mut sub = registry.open("alice@example.com");
        let frame = sub.frames.recv().await.unwrap();
        assert_eq!(frame.kind, "connected");
        assert_eq!(frame.payload["identifiant"], "alice@example.com");
        assert!(registry.is_connected("alice@example.com"));
    }

    #[tokio::test]
    async fn reconnect_replaces_previous_channel() {
        let registry = ConnectionRegistry::new();
        let _old = registry.open("NEQ1");
        let mut new = registry.open("NEQ1");
        assert_eq!(registry.connection_count(), 1);

        registry.send_to("NEQ1", EventFrame::notification(json!({"id": "1"})));
        // Skip the ack, then the pushed notification lands on the new channel.
        assert_eq!(new.frames.recv().await.unwrap().kind, "connected");
        assert_eq!(new.frames.recv().await.unwrap().kind, "notification");
    }

    #[tokio::test]
    async fn stale_close_does_not_evict_replacement() {
        let registry = ConnectionRegistry::new();
        let old = registry.open("alice@example.com");
        let mut new = registry.open("alice@example.com");

        // The replaced stream tears down late; the entry stays.
        registry.close("alice@example.com", old.generation);
        assert!(registry.is_connected("alice@example.com"));

        // The replacement channel still delivers.
        registry.send_to(
            "alice@example.com",
            EventFrame::notification(json!({"id": "7"})),
        );
        assert_eq!(new.frames.recv().await.unwrap().kind, "connected");
        assert_eq!(new.frames.recv().await.unwrap().kind, "notification");

        // Closing with the live generation removes the entry.
        registry.close("alice@example.com", new.generation);
        assert!(!registry.is_connected("alice@example.com"));
    }

    #[tokio::test]
    async fn dropped_receiver_evicts_connection() {
        let registry = ConnectionRegistry::new();
        drop(registry.open("bob@example.com"));
        registry.send_to("bob@example.com", EventFrame::notification(json!({})));
        assert!(!registry.is_connected("bob@example.com"));
    }

    #[tokio::test]
    async fn group_send_reaches_only_that_group() {
        let registry = ConnectionRegistry::new();
        let mut resident = registry.open("alice@example.com");
        let mut provider = registry.open("NEQ1");
        assert_eq!(resident.frames.recv().await.unwrap().kind, "connected");
        assert_eq!(provider.frames.recv().await.unwrap().kind, "connected");

        registry.send_to_group(
            RecipientKind::Resident,
            &EventFrame::notification(json!({"id": "7"})),
        );
        assert_eq!(resident.frames.recv().await.unwrap().kind, "notification");
        assert!(provider.frames.try_recv().is_err());
    }
}
