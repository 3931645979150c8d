// Event Bus
//
// Durable topics with at-least-once delivery. A publish is persisted before
// anyone is told about it; each subscription owns a committed offset and a
// delivery worker that only advances the offset after its handler acks.

pub mod bus;
pub mod memory;
pub mod publisher;
pub mod store;
pub mod subscriber;
pub mod topics;
pub mod types;
mod worker;

pub use bus::EventBus;
pub use memory::MemoryMessageStore;
pub use publisher::EventPublisher;
pub use store::{MessageStore, PgMessageStore};
pub use subscriber::{Handler, SubscriptionInfo};
pub use topics::{USER_ADDED, WELCOME_EMAIL};
pub use types::{DeadLetter, Envelope, Message, Topic};
