use super::store::MessageStore;
use super::types::{DeadLetter, Message};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Log {
    messages: Vec<Message>,
    offsets: HashMap<(String, String), i64>,
    dead_letters: Vec<DeadLetter>,
}

/// In-process message store
///
/// Survives bus restarts within one process, which is enough to exercise
/// redelivery. `set_available(false)` makes every call fail.
pub struct MemoryMessageStore {
    log: RwLock<Log>,
    available: AtomicBool,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self {
            log: RwLock::new(Log::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            bail!("memory message store is offline");
        }
        Ok(())
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, topic: &str, payload: &serde_json::Value) -> Result<Message> {
        self.check_available()?;
        let mut log = self.log.write().await;

        let message = Message {
            id: log.messages.len() as i64 + 1,
            topic: topic.to_string(),
            payload: payload.clone(),
            published_at: Utc::now(),
        };
        log.messages.push(message.clone());
        Ok(message)
    }

    async fn fetch_after(&self, topic: &str, after: i64, limit: usize) -> Result<Vec<Message>> {
        self.check_available()?;
        let log = self.log.read().await;

        Ok(log
            .messages
            .iter()
            .filter(|m| m.topic == topic && m.id > after)
            .take(limit.max(1))
            .cloned()
            .collect())
    }

    async fn latest_id(&self, topic: &str) -> Result<i64> {
        self.check_available()?;
        let log = self.log.read().await;

        Ok(log
            .messages
            .iter()
            .rev()
            .find(|m| m.topic == topic)
            .map(|m| m.id)
            .unwrap_or(0))
    }

    async fn load_offset(&self, topic: &str, subscription: &str) -> Result<Option<i64>> {
        self.check_available()?;
        let log = self.log.read().await;
        Ok(log
            .offsets
            .get(&(topic.to_string(), subscription.to_string()))
            .copied())
    }

    async fn commit_offset(&self, topic: &str, subscription: &str, offset: i64) -> Result<()> {
        self.check_available()?;
        let mut log = self.log.write().await;

        let committed = log
            .offsets
            .entry((topic.to_string(), subscription.to_string()))
            .or_insert(offset);
        *committed = (*committed).max(offset);
        Ok(())
    }

    async fn record_dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        self.check_available()?;
        self.log.write().await.dead_letters.push(letter.clone());
        Ok(())
    }

    async fn dead_letters(&self, topic: &str, subscription: &str) -> Result<Vec<DeadLetter>> {
        self.check_available()?;
        let log = self.log.read().await;

        Ok(log
            .dead_letters
            .iter()
            .filter(|d| d.topic == topic && d.subscription == subscription)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_after_filters_topic_and_cursor() {
        let store = MemoryMessageStore::new();
        store.append("a", &json!({"n": 1})).await.unwrap();
        store.append("b", &json!({"n": 2})).await.unwrap();
        store.append("a", &json!({"n": 3})).await.unwrap();

        let all: Vec<i64> = store
            .fetch_after("a", 0, 10)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(all, vec![1, 3]);

        let tail = store.fetch_after("a", 1, 10).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].payload, json!({"n": 3}));

        assert_eq!(store.latest_id("a").await.unwrap(), 3);
        assert_eq!(store.latest_id("b").await.unwrap(), 2);
        assert_eq!(store.latest_id("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offsets_never_move_back() {
        let store = MemoryMessageStore::new();
        assert_eq!(store.load_offset("a", "sub").await.unwrap(), None);

        store.commit_offset("a", "sub", 5).await.unwrap();
        store.commit_offset("a", "sub", 3).await.unwrap();
        assert_eq!(store.load_offset("a", "sub").await.unwrap(), Some(5));
        assert_eq!(store.load_offset("a", "other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_offline_store_fails() {
        let store = MemoryMessageStore::new();
        store.set_available(false);
        assert!(store.append("a", &json!({})).await.is_err());
        assert!(store.fetch_after("a", 0, 10).await.is_err());
    }
}
