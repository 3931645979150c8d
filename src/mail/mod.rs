pub mod welcome;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use welcome::WelcomeMailer;

/// An outgoing email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub text: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Worth retrying: connection refused, timeouts, rate limits
    #[error("transient mail failure: {0}")]
    Transient(String),

    #[error("mail rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

/// Something that can deliver an `Email`
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), TransportError>;
}

/// Transport that only logs what it would have sent
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, email: &Email) -> Result<(), TransportError> {
        tracing::info!(
            to = %email.to,
            from = %email.from,
            subject = %email.subject,
            text = %email.text,
            "Would send email"
        );
        Ok(())
    }
}
