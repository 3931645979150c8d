use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::db::Store;
use crate::models::SweepReport;

use super::check_pending_items;

/// Fires `check_pending_items` on a fixed interval
///
/// Every firing runs in its own task, so a slow sweep never delays the
/// next tick and firings may overlap. Nothing is carried between firings.
pub struct SweepScheduler {
    store: Arc<dyn Store>,
    interval: Duration,
    reports: Option<mpsc::UnboundedSender<SweepReport>>,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SweepScheduler {
    pub fn new(store: Arc<dyn Store>, interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            interval,
            reports: None,
            shutdown,
            handle: Mutex::new(None),
        }
    }

    /// Forward every successful report to `tx`
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<SweepReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the timer (spawns background task); the first firing is one interval from now
    ///
    /// A scheduler that was shut down stays stopped.
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            warn!("Sweep scheduler already running");
            return;
        }
        if *self.shutdown.borrow() {
            warn!("Sweep scheduler was shut down, not restarting");
            return;
        }

        let store = self.store.clone();
        let interval = self.interval;
        let reports = self.reports.clone();
        let mut shutdown = self.shutdown.subscribe();

        *handle = Some(tokio::spawn(async move {
            info!(interval_secs = interval.as_secs_f64(), "Sweep scheduler started");

            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut firing: u64 = 0;
            let mut firings = JoinSet::new();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        firing += 1;
                        firings.spawn(run_firing(store.clone(), reports.clone(), firing));
                    }
                    Some(joined) = firings.join_next(), if !firings.is_empty() => {
                        if let Err(e) = joined {
                            error!("Sweep firing panicked: {}", e);
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }

            // Drain firings still in flight
            while let Some(joined) = firings.join_next().await {
                if let Err(e) = joined {
                    error!("Sweep firing panicked: {}", e);
                }
            }

            info!("Sweep scheduler stopped");
        }));
    }

    /// Stop the timer and wait for in-flight firings
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);

        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Sweep scheduler task failed: {}", e);
            }
        }
    }
}

async fn run_firing(
    store: Arc<dyn Store>,
    reports: Option<mpsc::UnboundedSender<SweepReport>>,
    firing: u64,
) {
    match check_pending_items(store.as_ref()).await {
        Ok(report) => {
            if let Some(tx) = reports {
                // Receiver gone is fine, nobody is watching
                let _ = tx.send(report);
            }
        }
        Err(e) => error!(firing, "Sweep failed: {}", e),
    }
}
