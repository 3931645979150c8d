use super::store::MessageStore;
use super::subscriber::RawHandler;
use super::types::{DeadLetter, Envelope, Message};
use crate::config::BusConfig;
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

enum Outcome {
    Acked,
    DeadLettered,
    /// Shutdown arrived while waiting to retry; the message stays uncommitted
    Interrupted,
}

/// Delivers one subscription's messages in publish order
///
/// The committed offset only moves after the handler acked (or the message
/// was dead-lettered), so a crash or shutdown mid-delivery leads to
/// redelivery rather than loss.
pub(crate) struct DeliveryWorker {
    pub store: Arc<dyn MessageStore>,
    pub handler: Arc<dyn RawHandler>,
    pub topic: String,
    pub subscription: String,
    pub config: BusConfig,
    pub offset: i64,
}

impl DeliveryWorker {
    pub async fn run(
        mut self,
        mut wake: broadcast::Receiver<Message>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            topic = %self.topic,
            subscription = %self.subscription,
            offset = self.offset,
            "delivery worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.drain(&mut shutdown).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    error!(
                        topic = %self.topic,
                        subscription = %self.subscription,
                        "delivery round failed: {:#}", e
                    );
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = next_wake(&mut wake, &self.topic) => {}
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        info!(
            topic = %self.topic,
            subscription = %self.subscription,
            offset = self.offset,
            "delivery worker stopped"
        );
    }

    /// Deliver everything past the offset; `Ok(false)` means stop
    async fn drain(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<bool> {
        loop {
            let batch = self
                .store
                .fetch_after(&self.topic, self.offset, self.config.batch_size)
                .await?;

            if batch.is_empty() {
                return Ok(true);
            }

            for message in batch {
                if *shutdown.borrow() {
                    return Ok(false);
                }

                match self.deliver(&message, shutdown).await? {
                    Outcome::Acked | Outcome::DeadLettered => {}
                    Outcome::Interrupted => return Ok(false),
                }

                self.store
                    .commit_offset(&self.topic, &self.subscription, message.id)
                    .await?;
                self.offset = message.id;
            }
        }
    }

    async fn deliver(
        &self,
        message: &Message,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Outcome> {
        let max_attempts = self.config.max_attempts.max(1);
        let deadline = self.config.ack_deadline();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let envelope = Envelope::for_message(message, &self.subscription, attempt);

            let result = match tokio::time::timeout(
                deadline,
                self.handler.handle_raw(&message.payload, &envelope),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(anyhow!("handler missed the {:?} ack deadline", deadline)),
            };

            let e = match result {
                Ok(()) => {
                    debug!(
                        subscription = %self.subscription,
                        message_id = message.id,
                        attempt,
                        "message acked"
                    );
                    return Ok(Outcome::Acked);
                }
                Err(e) => e,
            };

            if attempt >= max_attempts {
                error!(
                    subscription = %self.subscription,
                    message_id = message.id,
                    attempts = attempt,
                    "giving up on message: {:#}", e
                );
                let letter = DeadLetter {
                    topic: self.topic.clone(),
                    subscription: self.subscription.clone(),
                    message_id: message.id,
                    attempts: attempt,
                    error: format!("{:#}", e),
                    failed_at: Utc::now(),
                };
                self.store.record_dead_letter(&letter).await?;
                return Ok(Outcome::DeadLettered);
            }

            let backoff = self.config.backoff(attempt);
            let retry_in_ms = backoff.as_millis() as u64;
            warn!(
                subscription = %self.subscription,
                message_id = message.id,
                attempt,
                retry_in_ms,
                "delivery failed: {:#}", e
            );

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.changed() => return Ok(Outcome::Interrupted),
            }
        }
    }
}

/// Resolves on the next publish for `topic`, or when the receiver lagged
async fn next_wake(wake: &mut broadcast::Receiver<Message>, topic: &str) {
    loop {
        match wake.recv().await {
            Ok(message) if message.topic == topic => return,
            Ok(_) => continue,
            Err(RecvError::Lagged(n)) => {
                debug!(topic, skipped = n, "wake-up receiver lagged");
                return;
            }
            // Publisher gone, polling carries on alone
            Err(RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}
