use super::{Email, MailTransport};
use crate::config::MailConfig;
use crate::event_bus::{Envelope, Handler};
use crate::models::UserAddedEvent;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// How many recently sent message ids are remembered for dedupe
pub const DEFAULT_SENT_WINDOW: usize = 1024;

/// The last `capacity` message ids, oldest evicted first
struct SentWindow {
    capacity: usize,
    ids: HashSet<i64>,
    order: VecDeque<i64>,
}

impl SentWindow {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ids: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    fn insert(&mut self, id: i64) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }
}

/// Sends the welcome email for each `user-added` message
///
/// Remembers the most recent message ids it sent so that a redelivery is
/// acknowledged without mailing the user twice. The memory is per process
/// and bounded; a redelivery after a restart, or of an id that has aged out
/// of the window, sends again.
pub struct WelcomeMailer {
    transport: Arc<dyn MailTransport>,
    config: MailConfig,
    recent: Mutex<SentWindow>,
    sent: AtomicU64,
    duplicates: AtomicU64,
}

impl WelcomeMailer {
    pub fn new(transport: Arc<dyn MailTransport>, config: MailConfig) -> Self {
        Self::with_window(transport, config, DEFAULT_SENT_WINDOW)
    }

    pub fn with_window(transport: Arc<dyn MailTransport>, config: MailConfig, window: usize) -> Self {
        Self {
            transport,
            config,
            recent: Mutex::new(SentWindow::new(window)),
            sent: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        }
    }

    pub fn compose(&self, event: &UserAddedEvent) -> Email {
        Email {
            to: event.email.clone(),
            from: self.config.sender.clone(),
            subject: format!("Welcome {}!", event.name),
            text: self.config.welcome_text.clone(),
        }
    }

    /// Emails handed to the transport successfully
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    /// Redeliveries that were acknowledged without sending
    pub fn duplicate_count(&self) -> u64 {
        self.duplicates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler<UserAddedEvent> for WelcomeMailer {
    async fn handle(&self, event: UserAddedEvent, envelope: &Envelope) -> Result<()> {
        // Deliveries of one subscription are sequential; not held across the send
        if self.recent.lock().await.contains(envelope.message_id) {
            self.duplicates.fetch_add(1, Ordering::SeqCst);
            warn!(
                message_id = envelope.message_id,
                attempt = envelope.attempt,
                to = %event.email,
                "welcome email already sent, acknowledging duplicate"
            );
            return Ok(());
        }

        let email = self.compose(&event);
        self.transport.send(&email).await?;
        self.recent.lock().await.insert(envelope.message_id);
        self.sent.fetch_add(1, Ordering::SeqCst);

        info!(
            message_id = envelope.message_id,
            attempt = envelope.attempt,
            to = %email.to,
            "welcome email sent"
        );
        Ok(())
    }
}
