//! Bus-to-dashboard relay
//!
//! Long-lived subscriber task: subscribes to every fan-out topic on the Redis
//! broker and forwards each message to the RealtimeHub for WebSocket
//! broadcast. Dropped broker connections are retried; dashboard clients fall
//! back to polling the query endpoints while the relay is down.

use super::Topic;
use crate::realtime_hub::{HubMessage, RealtimeHub};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// BusRelay instance
pub struct BusRelay {
    redis_url: String,
    hub: Arc<RealtimeHub>,
    running: Arc<RwLock<bool>>,
}

impl BusRelay {
    /// Create new BusRelay
    pub fn new(redis_url: String, hub: Arc<RealtimeHub>) -> Self {
        Self {
            redis_url,
            hub,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start the relay loop
    pub async fn start(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                tracing::warn!("Bus relay already running");
                return;
            }
            *running = true;
        }

        tracing::info!("Starting bus relay");

        let redis_url = self.redis_url.clone();
        let hub = self.hub.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            loop {
                {
                    let is_running = running.read().await;
                    if !*is_running {
                        break;
                    }
                }

                if let Err(e) = Self::relay_session(&redis_url, &hub, &running).await {
                    tracing::error!(error = %e, "Bus relay session ended, reconnecting");
                }

                tokio::time::sleep(RECONNECT_DELAY).await;
            }

            tracing::info!("Bus relay stopped");
        });
    }

    /// Stop the relay loop
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        tracing::info!("Stopping bus relay");
    }

    /// One subscribe-and-forward session; returns when the connection drops
    async fn relay_session(
        redis_url: &str,
        hub: &RealtimeHub,
        running: &RwLock<bool>,
    ) -> crate::error::Result<()> {
        let client = redis::Client::open(redis_url)?;
        let mut pubsub = client.get_async_pubsub().await?;

        for topic in Topic::ALL {
            pubsub.subscribe(topic.as_str()).await?;
        }

        tracing::info!(topics = Topic::ALL.len(), "Bus relay subscribed");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            {
                let is_running = running.read().await;
                if !*is_running {
                    break;
                }
            }

            let topic = msg.get_channel_name().to_string();
            let raw: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(topic = %topic, error = %e, "Undecodable bus payload");
                    continue;
                }
            };

            // Payloads are opaque structured documents; pass non-JSON through
            // as a string rather than dropping it
            let payload = serde_json::from_str::<serde_json::Value>(&raw)
                .unwrap_or(serde_json::Value::String(raw));

            hub.broadcast(HubMessage { topic, payload }).await;
        }

        Ok(())
    }
}
