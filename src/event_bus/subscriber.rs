use super::types::Envelope;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Subscription handler for payloads of type `T`
///
/// `Ok` acknowledges the delivery. `Err` asks the bus to redeliver later.
/// The same message may arrive more than once, so handlers must tolerate
/// duplicates; `Envelope::message_id` identifies the message.
#[async_trait]
pub trait Handler<T>: Send + Sync {
    async fn handle(&self, event: T, envelope: &Envelope) -> Result<()>;
}

/// Type-erased handler stored in the bus registry
#[async_trait]
pub(crate) trait RawHandler: Send + Sync {
    async fn handle_raw(&self, payload: &serde_json::Value, envelope: &Envelope) -> Result<()>;
}

pub(crate) struct TypedHandler<T> {
    inner: Arc<dyn Handler<T>>,
}

impl<T> TypedHandler<T> {
    pub(crate) fn new(inner: Arc<dyn Handler<T>>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T> RawHandler for TypedHandler<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn handle_raw(&self, payload: &serde_json::Value, envelope: &Envelope) -> Result<()> {
        let event: T = serde_json::from_value(payload.clone()).with_context(|| {
            format!(
                "message {} on {} has an unexpected payload",
                envelope.message_id, envelope.topic
            )
        })?;
        self.inner.handle(event, envelope).await
    }
}

/// A registered subscription
#[derive(Clone)]
pub(crate) struct Subscription {
    pub topic: &'static str,
    pub id: String,
    pub handler: Arc<dyn RawHandler>,
}

/// Public view of a registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub topic: String,
    pub id: String,
}

impl From<&Subscription> for SubscriptionInfo {
    fn from(sub: &Subscription) -> Self {
        Self {
            topic: sub.topic.to_string(),
            id: sub.id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserAddedEvent;
    use chrono::Utc;
    use tokio::sync::Mutex;

    struct Recorder(Mutex<Vec<UserAddedEvent>>);

    #[async_trait]
    impl Handler<UserAddedEvent> for Recorder {
        async fn handle(&self, event: UserAddedEvent, _envelope: &Envelope) -> Result<()> {
            self.0.lock().await.push(event);
            Ok(())
        }
    }

    fn envelope() -> Envelope {
        Envelope {
            message_id: 1,
            topic: "user-added".to_string(),
            subscription: "test".to_string(),
            attempt: 1,
            published_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_typed_handler_decodes_payload() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let raw = TypedHandler::<UserAddedEvent>::new(recorder.clone());

        raw.handle_raw(
            &serde_json::json!({"name": "Ada", "email": "ada@example.com"}),
            &envelope(),
        )
        .await
        .unwrap();

        let seen = recorder.0.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].name, "Ada");
    }

    #[tokio::test]
    async fn test_typed_handler_rejects_malformed_payload() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let raw = TypedHandler::<UserAddedEvent>::new(recorder.clone());

        let result = raw
            .handle_raw(&serde_json::json!({"name": 42}), &envelope())
            .await;

        assert!(result.is_err());
        assert!(recorder.0.lock().await.is_empty());
    }
}
