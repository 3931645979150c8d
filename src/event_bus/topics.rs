//! Topics and subscriptions known to the system
//!
//! Subscription ids are stable: the bus stores offsets under them, so
//! renaming one starts the subscription over from the latest message.

use super::types::Topic;
use crate::models::UserAddedEvent;

// ============================================================================
// Users
// ============================================================================
pub const USER_ADDED: Topic<UserAddedEvent> = Topic::new("user-added");

// ============================================================================
// Subscriptions
// ============================================================================
pub const WELCOME_EMAIL: &str = "welcome-email";
