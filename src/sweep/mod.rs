//! Pending-items sweep.
//!
//! `check_pending_items` is the whole job: one read of the item table,
//! no writes, no locks held between firings. The scheduler and the HTTP
//! endpoint both call it.

pub mod scheduler;

use crate::db::Store;
use crate::models::SweepReport;

pub use scheduler::SweepScheduler;

pub async fn check_pending_items(store: &dyn Store) -> crate::Result<SweepReport> {
    let items = store.list_items().await?;
    let report = SweepReport::from_items(items);

    tracing::info!(
        "Found {} pending items out of {} total items",
        report.pending_items,
        report.total_items
    );

    Ok(report)
}
