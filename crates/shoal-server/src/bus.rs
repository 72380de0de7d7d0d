//! In-process pub/sub bus
//!
//! TigerStyle: Bounded per-topic channels, explicit publish failures.
//!
//! Each topic is a tokio broadcast channel created on first use. Publishing
//! to a topic nobody listens to succeeds and is dropped; a subscriber that
//! falls more than `capacity` messages behind loses the oldest ones.

use async_trait::async_trait;
use shoal_core::error::{Error, Result};
use shoal_core::events::ShapeEvent;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

/// Topic-based publish/subscribe for shape events
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish `event` on `topic`
    async fn publish(&self, topic: &str, event: &ShapeEvent) -> Result<()>;

    /// Receive every event published on `topic` from now on
    fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<ShapeEvent>>;
}

/// Bus backed by one broadcast channel per topic
pub struct InMemoryBus {
    topics: Mutex<HashMap<String, broadcast::Sender<ShapeEvent>>>,
    capacity: usize,
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "topic capacity must be positive");
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn sender(&self, topic: &str) -> Result<broadcast::Sender<ShapeEvent>> {
        if topic.is_empty() {
            return Err(Error::publish_failed(topic, "topic must not be empty"));
        }
        let mut topics = self
            .topics
            .lock()
            .map_err(|_| Error::internal("bus topic table poisoned"))?;
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(sender.clone())
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    #[instrument(skip(self, event), fields(topic = topic, shape_id = %event.shape_id), level = "debug")]
    async fn publish(&self, topic: &str, event: &ShapeEvent) -> Result<()> {
        match self.sender(topic)?.send(event.clone()) {
            Ok(receivers) => debug!(receivers, "Published"),
            Err(_) => debug!("Published with no subscribers"),
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<ShapeEvent>> {
        Ok(self.sender(topic)?.subscribe())
    }
}
