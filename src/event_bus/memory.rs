//! In-memory event sink
//!
//! Records published events instead of routing them to a broker. Used by unit
//! tests to assert which topics the pipeline and alert engine emit.

use super::{EventSink, Topic};
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Recording sink for tests and development
#[derive(Default)]
pub struct MemorySink {
    published: Mutex<Vec<(Topic, serde_json::Value)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events published so far, in order
    pub async fn published(&self) -> Vec<(Topic, serde_json::Value)> {
        self.published.lock().await.clone()
    }

    /// Count of events published on one topic
    pub async fn count(&self, topic: Topic) -> usize {
        self.published
            .lock()
            .await
            .iter()
            .filter(|(t, _)| *t == topic)
            .count()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn publish(&self, topic: Topic, payload: &serde_json::Value) -> Result<()> {
        self.published.lock().await.push((topic, payload.clone()));
        Ok(())
    }
}

/// Sink that fails every publish. Exercises the fire-and-forget paths.
pub struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn publish(&self, _topic: Topic, _payload: &serde_json::Value) -> Result<()> {
        Err(crate::error::Error::Bus("broker unavailable".to_string()))
    }
}
