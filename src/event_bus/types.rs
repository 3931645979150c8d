use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// A named topic carrying payloads of type `T`
pub struct Topic<T> {
    name: &'static str,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Topic<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _payload: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Topic<T> {}

impl<T> fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Topic").field(&self.name).finish()
    }
}

/// A published message as persisted by the message store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Monotonic id assigned by the store, doubles as the offset
    pub id: i64,
    pub topic: String,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

/// Delivery metadata handed to a handler alongside the payload
///
/// `message_id` stays the same across redeliveries, so handlers can use it
/// to recognise a message they already processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message_id: i64,
    pub topic: String,
    pub subscription: String,
    /// 1 on first delivery
    pub attempt: u32,
    pub published_at: DateTime<Utc>,
}

impl Envelope {
    pub fn for_message(message: &Message, subscription: &str, attempt: u32) -> Self {
        Self {
            message_id: message.id,
            topic: message.topic.clone(),
            subscription: subscription.to_string(),
            attempt,
            published_at: message.published_at,
        }
    }

    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// A message a subscription gave up on after exhausting its attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub topic: String,
    pub subscription: String,
    pub message_id: i64,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}
