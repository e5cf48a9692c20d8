//! Event Fan-out Bus - Redis pub/sub
//!
//! ## Responsibilities
//!
//! - Publish enforcement/camera lifecycle events to a Redis broker
//! - Decouple the pipeline (producer) from dashboard sessions (consumers)
//! - Survive backend restarts independently of subscriber lifetimes
//!
//! The bus is an explicitly constructed component handed to the pipeline and
//! alert engine as a capability (`Arc<dyn EventSink>`), never ambient global
//! state. Live-only semantics: a subscriber connecting after a publish never
//! sees the missed message.

mod memory;
mod relay;

pub use memory::{FailingSink, MemorySink};
pub use relay::BusRelay;

use crate::error::Result;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

/// Fixed topic set for dashboard fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ViolationNew,
    ViolationVerified,
    FineGenerated,
    AlertNew,
    AlertStatusChange,
    CameraOffline,
    CameraDegraded,
    CameraRecovered,
}

impl Topic {
    /// All topics, in relay subscription order
    pub const ALL: [Topic; 8] = [
        Topic::ViolationNew,
        Topic::ViolationVerified,
        Topic::FineGenerated,
        Topic::AlertNew,
        Topic::AlertStatusChange,
        Topic::CameraOffline,
        Topic::CameraDegraded,
        Topic::CameraRecovered,
    ];

    /// Redis channel name
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ViolationNew => "violation:new",
            Topic::ViolationVerified => "violation:verified",
            Topic::FineGenerated => "fine:generated",
            Topic::AlertNew => "alert:new",
            Topic::AlertStatusChange => "alert:status_change",
            Topic::CameraOffline => "camera:offline",
            Topic::CameraDegraded => "camera:degraded",
            Topic::CameraRecovered => "camera:recovered",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publish capability injected into the pipeline and alert engine.
///
/// `publish` surfaces broker errors; `publish_lossy` is the fire-and-forget
/// form used inside the pipeline, where real-time notification is a
/// best-effort enhancement and never a correctness dependency.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, topic: Topic, payload: &serde_json::Value) -> Result<()>;

    async fn publish_lossy(&self, topic: Topic, payload: &serde_json::Value) {
        if let Err(e) = self.publish(topic, payload).await {
            tracing::warn!(
                topic = %topic,
                error = %e,
                "Event publish failed, continuing without notification"
            );
        }
    }
}

/// Redis-backed event bus
#[derive(Clone)]
pub struct EventBus {
    conn: MultiplexedConnection,
}

impl EventBus {
    /// Connect to the Redis broker
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;

        tracing::info!(redis_url = %redis_url, "Event bus connected");

        Ok(Self { conn })
    }

    /// Ping the broker (health check)
    pub async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }

    /// Release the broker connection. The multiplexed connection closes when
    /// the last clone drops; this exists so shutdown is an explicit step in
    /// the component lifecycle rather than an implicit side effect.
    pub fn shutdown(self) {
        tracing::info!("Event bus shut down");
        drop(self.conn);
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn publish(&self, topic: Topic, payload: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_string(payload)?;
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(topic.as_str(), body).await?;

        tracing::debug!(
            topic = %topic,
            receivers = receivers,
            "Event published"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_channel_names() {
        assert_eq!(Topic::ViolationNew.as_str(), "violation:new");
        assert_eq!(Topic::ViolationVerified.as_str(), "violation:verified");
        assert_eq!(Topic::FineGenerated.as_str(), "fine:generated");
        assert_eq!(Topic::AlertNew.as_str(), "alert:new");
        assert_eq!(Topic::AlertStatusChange.as_str(), "alert:status_change");
        assert_eq!(Topic::CameraOffline.as_str(), "camera:offline");
        assert_eq!(Topic::CameraDegraded.as_str(), "camera:degraded");
        assert_eq!(Topic::CameraRecovered.as_str(), "camera:recovered");
    }

    #[test]
    fn test_all_topics_unique() {
        let mut names: Vec<&str> = Topic::ALL.iter().map(|t| t.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Topic::ALL.len());
    }
}
