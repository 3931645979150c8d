pub mod item;
pub mod sweep;
pub mod user;

pub use item::*;
pub use sweep::*;
pub use user::*;

/// Trimmed, non-empty text no longer than `max` characters
pub(crate) fn require_text(field: &str, value: String, max: usize) -> crate::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::TallyError::Invalid(format!("{} must not be empty", field)));
    }
    if trimmed.chars().count() > max {
        return Err(crate::TallyError::Invalid(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(trimmed.to_string())
}
