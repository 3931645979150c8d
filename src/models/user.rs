use gotcha::Schematic;
use serde::{Deserialize, Serialize};

use super::require_text;

pub const NAME_MAX_LEN: usize = 255;
pub const EMAIL_MAX_LEN: usize = 320;

// ============================================================================
// User
// ============================================================================

/// A registered user. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schematic)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// Validated input for a new user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
}

impl CreateUser {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> crate::Result<Self> {
        let name = require_text("name", name.into(), NAME_MAX_LEN)?;
        let email = require_text("email", email.into(), EMAIL_MAX_LEN)?;
        validate_email(&email)?;
        Ok(Self { name, email })
    }

    pub fn added_event(&self) -> UserAddedEvent {
        UserAddedEvent {
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

fn validate_email(email: &str) -> crate::Result<()> {
    let invalid = || crate::TallyError::Invalid(format!("email '{}' is not a valid address", email));

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(invalid()),
    }
}

// ============================================================================
// Events
// ============================================================================

/// Payload published on the `user-added` topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAddedEvent {
    pub name: String,
    pub email: String,
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize, Schematic)]
pub struct UserCreateRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize, Schematic)]
pub struct UserListResponse {
    pub users: Vec<User>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TallyError;

    #[test]
    fn test_create_user_accepts_plain_address() {
        let create = CreateUser::new("Ada", " ada@example.com ").unwrap();
        assert_eq!(create.name, "Ada");
        assert_eq!(create.email, "ada@example.com");
        assert_eq!(
            create.added_event(),
            UserAddedEvent {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
            }
        );
    }

    #[test]
    fn test_create_user_rejects_bad_addresses() {
        for email in ["", "ada", "@example.com", "ada@", "a@b@c", "ada lovelace@example.com"] {
            assert!(
                matches!(CreateUser::new("Ada", email), Err(TallyError::Invalid(_))),
                "expected {:?} to be rejected",
                email
            );
        }
    }

    #[test]
    fn test_create_user_requires_name() {
        assert!(matches!(
            CreateUser::new("  ", "ada@example.com"),
            Err(TallyError::Invalid(_))
        ));
    }
}
