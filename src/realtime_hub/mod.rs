//! RealtimeHub - WebSocket Distribution
//!
//! ## Responsibilities
//!
//! - WebSocket connection management for dashboard sessions
//! - Broadcasting bus events to every connected client
//!
//! Each client gets an unbounded mpsc queue; a slow or wedged client never
//! blocks a broadcast to the others, and never blocks the publisher.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Envelope forwarded to dashboard clients: the bus topic plus the payload
/// published on it. The hub routes, it does not interpret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Client connection
struct ClientConnection {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, ClientConnection>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new client
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let conn = ClientConnection { id, tx };

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, conn);
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, "Dashboard client connected");

        (id, rx)
    }

    /// Unregister a client
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Dashboard client disconnected");
        }
    }

    /// Broadcast message to all clients
    pub async fn broadcast(&self, message: HubMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize hub message");
                return;
            }
        };

        let connections = self.connections.read().await;
        tracing::debug!(
            topic = %message.topic,
            client_count = connections.len(),
            "Broadcasting to dashboard clients"
        );

        for conn in connections.values() {
            if let Err(e) = conn.tx.send(json.clone()) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to queue message");
            }
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_broadcast() {
        let hub = RealtimeHub::new();
        let (_id, mut rx) = hub.register().await;

        hub.broadcast(HubMessage {
            topic: "violation:new".to_string(),
            payload: serde_json::json!({"id": "v1"}),
        })
        .await;

        let received = rx.recv().await.unwrap();
        let msg: HubMessage = serde_json::from_str(&received).unwrap();
        assert_eq!(msg.topic, "violation:new");
        assert_eq!(msg.payload["id"], "v1");
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let hub = RealtimeHub::new();
        let (id, mut rx) = hub.register().await;
        hub.unregister(&id).await;
        assert_eq!(hub.connection_count(), 0);

        hub.broadcast(HubMessage {
            topic: "alert:new".to_string(),
            payload: serde_json::json!({}),
        })
        .await;

        // Channel closes once the sender is dropped with the connection
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_connection_count_tracks_clients() {
        let hub = RealtimeHub::new();
        assert_eq!(hub.connection_count(), 0);
        let (a, _rx_a) = hub.register().await;
        let (_b, _rx_b) = hub.register().await;
        assert_eq!(hub.connection_count(), 2);
        hub.unregister(&a).await;
        assert_eq!(hub.connection_count(), 1);
    }
}
