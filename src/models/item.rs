use gotcha::Schematic;
use serde::{Deserialize, Serialize};

use super::require_text;

pub const TITLE_MAX_LEN: usize = 255;

// ============================================================================
// Item
// ============================================================================

/// A to-do entry. `done` only ever moves from false to true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schematic)]
pub struct Item {
    pub id: i64,
    pub title: String,
    pub done: bool,
}

/// Validated input for a new item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateItem {
    pub title: String,
}

impl CreateItem {
    pub fn new(title: impl Into<String>) -> crate::Result<Self> {
        Ok(Self {
            title: require_text("title", title.into(), TITLE_MAX_LEN)?,
        })
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize, Schematic)]
pub struct ItemCreateRequest {
    pub title: String,
}

#[derive(Debug, Serialize, Schematic)]
pub struct ItemListResponse {
    pub items: Vec<Item>,
}

/// `item` is null when the id does not exist
#[derive(Debug, Serialize, Schematic)]
pub struct ItemDoneResponse {
    pub item: Option<Item>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TallyError;

    #[test]
    fn test_create_item_trims_title() {
        let create = CreateItem::new("  Buy milk \n").unwrap();
        assert_eq!(create.title, "Buy milk");
    }

    #[test]
    fn test_create_item_rejects_blank_title() {
        assert!(matches!(CreateItem::new("   "), Err(TallyError::Invalid(_))));
        assert!(matches!(CreateItem::new(""), Err(TallyError::Invalid(_))));
    }

    #[test]
    fn test_create_item_rejects_long_title() {
        let title = "x".repeat(TITLE_MAX_LEN + 1);
        assert!(matches!(CreateItem::new(title), Err(TallyError::Invalid(_))));

        let title = "x".repeat(TITLE_MAX_LEN);
        assert!(CreateItem::new(title).is_ok());
    }
}
