use super::types::{DeadLetter, Message};
use anyhow::Result;
use async_trait::async_trait;
use conservator::{Executor, PooledConnection};
use std::sync::Arc;

/// Durable storage behind the event bus
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message (assigns id and publish time)
    async fn append(&self, topic: &str, payload: &serde_json::Value) -> Result<Message>;

    /// Messages of `topic` with id > `after`, oldest first
    async fn fetch_after(&self, topic: &str, after: i64, limit: usize) -> Result<Vec<Message>>;

    /// Highest message id on `topic`, 0 when empty
    async fn latest_id(&self, topic: &str) -> Result<i64>;

    /// Committed offset of a subscription, `None` if it never committed
    async fn load_offset(&self, topic: &str, subscription: &str) -> Result<Option<i64>>;

    /// Move a subscription's offset forward; never moves it back
    async fn commit_offset(&self, topic: &str, subscription: &str, offset: i64) -> Result<()>;

    async fn record_dead_letter(&self, letter: &DeadLetter) -> Result<()>;

    async fn dead_letters(&self, topic: &str, subscription: &str) -> Result<Vec<DeadLetter>>;
}

/// Insert one message under a per-topic transaction lock
///
/// The lock is taken before the id is drawn and held until commit, so ids of
/// one topic become visible in id order. `fetch_after` relies on that: a
/// reader that saw id N can never later see a smaller id appear.
const APPEND_SQL: &str = r#"
    WITH topic_lock AS (
        SELECT pg_advisory_xact_lock(hashtext($1::text))
    )
    INSERT INTO bus_messages (topic, payload, published_at)
    SELECT $1::text, $2::jsonb, NOW() FROM topic_lock
    RETURNING id, topic, payload, published_at
"#;

/// PostgreSQL implementation of the message store
pub struct PgMessageStore {
    pool: Arc<PooledConnection>,
}

impl PgMessageStore {
    pub fn new(pool: Arc<PooledConnection>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, topic: &str, payload: &serde_json::Value) -> Result<Message> {
        let conn = self.pool.get().await?;

        let row = conn.query_one(APPEND_SQL, &[&topic, payload]).await?;

        Ok(Message {
            id: row.get("id"),
            topic: row.get("topic"),
            payload: row.get("payload"),
            published_at: row.get("published_at"),
        })
    }

    async fn fetch_after(&self, topic: &str, after: i64, limit: usize) -> Result<Vec<Message>> {
        let conn = self.pool.get().await?;
        let limit_i64 = limit.clamp(1, 10000) as i64;

        let rows = conn
            .query(
                r#"
                SELECT id, topic, payload, published_at
                FROM bus_messages
                WHERE topic = $1
                  AND id > $2
                ORDER BY id ASC
                LIMIT $3
                "#,
                &[&topic, &after, &limit_i64],
            )
            .await?;

        let messages = rows
            .iter()
            .map(|row| Message {
                id: row.get("id"),
                topic: row.get("topic"),
                payload: row.get("payload"),
                published_at: row.get("published_at"),
            })
            .collect();

        Ok(messages)
    }

    async fn latest_id(&self, topic: &str) -> Result<i64> {
        let conn = self.pool.get().await?;

        let row = conn
            .query_one(
                "SELECT COALESCE(MAX(id), 0) AS id FROM bus_messages WHERE topic = $1",
                &[&topic],
            )
            .await?;

        let id: i64 = row.get("id");
        Ok(id)
    }

    async fn load_offset(&self, topic: &str, subscription: &str) -> Result<Option<i64>> {
        let conn = self.pool.get().await?;

        let rows = conn
            .query(
                "SELECT committed FROM bus_offsets WHERE topic = $1 AND subscription = $2",
                &[&topic, &subscription],
            )
            .await?;

        Ok(rows.first().map(|row| row.get("committed")))
    }

    async fn commit_offset(&self, topic: &str, subscription: &str, offset: i64) -> Result<()> {
        let conn = self.pool.get().await?;

        conn.execute(
            r#"
            INSERT INTO bus_offsets (topic, subscription, committed, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (topic, subscription) DO UPDATE
            SET committed = GREATEST(bus_offsets.committed, EXCLUDED.committed),
                updated_at = NOW()
            "#,
            &[&topic, &subscription, &offset],
        )
        .await?;

        Ok(())
    }

    async fn record_dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        let conn = self.pool.get().await?;
        let attempts = letter.attempts as i32;

        conn.execute(
            r#"
            INSERT INTO bus_dead_letters (topic, subscription, message_id, attempts, error, failed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            &[
                &letter.topic,
                &letter.subscription,
                &letter.message_id,
                &attempts,
                &letter.error,
                &letter.failed_at,
            ],
        )
        .await?;

        Ok(())
    }

    async fn dead_letters(&self, topic: &str, subscription: &str) -> Result<Vec<DeadLetter>> {
        let conn = self.pool.get().await?;

        let rows = conn
            .query(
                r#"
                SELECT topic, subscription, message_id, attempts, error, failed_at
                FROM bus_dead_letters
                WHERE topic = $1 AND subscription = $2
                ORDER BY id ASC
                "#,
                &[&topic, &subscription],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| DeadLetter {
                topic: row.get("topic"),
                subscription: row.get("subscription"),
                message_id: row.get("message_id"),
                attempts: row.get::<_, i32>("attempts").max(0) as u32,
                error: row.get("error"),
                failed_at: row.get("failed_at"),
            })
            .collect())
    }
}
