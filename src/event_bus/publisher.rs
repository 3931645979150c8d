use super::store::MessageStore;
use super::types::{Message, Topic};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event Publisher
///
/// Publishes messages to both:
/// 1. Persistent storage (Message Store)
/// 2. In-memory broadcast channel (wakes delivery workers)
pub struct EventPublisher {
    store: Arc<dyn MessageStore>,
    broadcaster: broadcast::Sender<Message>,
}

impl EventPublisher {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        // Lagged receivers get RecvError::Lagged and fall back to the store
        let (broadcaster, _) = broadcast::channel(1024);
        Self { store, broadcaster }
    }

    /// Publish a typed payload on `topic`
    ///
    /// Returns once the message is persisted; delivery happens afterwards.
    pub async fn publish<T: Serialize>(&self, topic: &Topic<T>, payload: &T) -> Result<Message> {
        let payload = serde_json::to_value(payload)?;
        self.publish_raw(topic.name(), payload).await
    }

    pub async fn publish_raw(&self, topic: &str, payload: serde_json::Value) -> Result<Message> {
        let message = self.store.append(topic, &payload).await?;

        tracing::debug!(topic = %message.topic, message_id = message.id, "message published");

        // Best-effort wake-up, workers also poll the store
        let _ = self.broadcaster.send(message.clone());

        Ok(message)
    }

    /// Receiver for messages published after this call
    ///
    /// Note: This does NOT replay stored messages. Delivery workers read those from the store.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.broadcaster.subscribe()
    }
}
