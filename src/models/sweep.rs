use gotcha::Schematic;
use serde::{Deserialize, Serialize};

use super::item::Item;

/// Outcome of one pending-items sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schematic)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub total_items: i64,
    pub pending_items: i64,
    pub pending_items_list: Vec<Item>,
}

impl SweepReport {
    pub fn from_items(items: Vec<Item>) -> Self {
        let total_items = items.len() as i64;
        let pending_items_list: Vec<Item> = items.into_iter().filter(|item| !item.done).collect();

        Self {
            total_items,
            pending_items: pending_items_list.len() as i64,
            pending_items_list,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, done: bool) -> Item {
        Item {
            id,
            title: format!("item {}", id),
            done,
        }
    }

    #[test]
    fn test_empty_report() {
        let report = SweepReport::from_items(Vec::new());
        assert_eq!(report.total_items, 0);
        assert_eq!(report.pending_items, 0);
        assert!(report.pending_items_list.is_empty());
    }

    #[test]
    fn test_report_keeps_only_pending_items_in_order() {
        let report = SweepReport::from_items(vec![item(3, false), item(2, true), item(1, false)]);
        assert_eq!(report.total_items, 3);
        assert_eq!(report.pending_items, 2);
        assert_eq!(report.pending_items_list, vec![item(3, false), item(1, false)]);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let json = serde_json::to_value(SweepReport::from_items(vec![item(1, true)])).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"totalItems": 1, "pendingItems": 0, "pendingItemsList": []})
        );
    }
}
