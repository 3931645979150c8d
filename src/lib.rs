pub mod api;
pub mod config;
pub mod db;
pub mod event_bus;
pub mod mail;
pub mod models;
pub mod service;
pub mod sweep;

use std::ops::Deref;
use std::sync::Arc;

use gotcha::axum::extract::FromRef;
use thiserror::Error;

use crate::config::Settings;
use crate::mail::TransportError;
use crate::models::User;
use crate::service::TallyService;

// ============================================================================
// Service wrapper
// ============================================================================

/// Service wrapper for state extraction
#[derive(Clone)]
pub struct Service(pub Arc<TallyService>);

impl Deref for Service {
    type Target = TallyService;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Database error: {0}")]
    Database(#[from] conservator::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] conservator::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Mail transport error: {0}")]
    Transport(#[from] TransportError),

    /// The user row was written but the follow-up event never reached the bus
    #[error("User {id} was created but the {topic} event was not published: {reason}", id = .user.id)]
    PartialFailure {
        user: User,
        topic: String,
        reason: String,
    },

    #[error("Internal server error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, TallyError>;

impl TallyError {
    pub fn to_status_code(&self) -> gotcha::axum::http::StatusCode {
        use gotcha::axum::http::StatusCode;
        match self {
            TallyError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            TallyError::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TallyError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TallyError::NotFound(_) => StatusCode::NOT_FOUND,
            TallyError::Invalid(_) => StatusCode::BAD_REQUEST,
            TallyError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            TallyError::Transport(_) => StatusCode::BAD_GATEWAY,
            TallyError::PartialFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            TallyError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Store or bus I/O failure, as opposed to an absent row
    pub fn is_unavailable(&self) -> bool {
        matches!(self, TallyError::Database(_) | TallyError::Unavailable(_))
    }
}

// ============================================================================
// Application state
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub service: Service,
    pub settings: Settings,
}

impl Default for AppState {
    fn default() -> Self {
        unimplemented!()
    }
}

// Allow extracting Service from GotchaContext
impl FromRef<gotcha::GotchaContext<AppState, Settings>> for Service {
    fn from_ref(ctx: &gotcha::GotchaContext<AppState, Settings>) -> Self {
        ctx.state.service.clone()
    }
}

// Allow extracting Settings from GotchaContext
impl FromRef<gotcha::GotchaContext<AppState, Settings>> for Settings {
    fn from_ref(ctx: &gotcha::GotchaContext<AppState, Settings>) -> Self {
        ctx.state.settings.clone()
    }
}
