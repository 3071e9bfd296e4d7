//! Scheduled reconciliation.
//!
//! Every tick, runs one pass per registered streamer address. The task is
//! owned by the composition root and stops when its handle is shut down.

use std::sync::Arc;
use std::time::Duration;

use superchat_common::reconcile::{PassStatus, ReconcileReport};
use superchat_common::transfer::TransferSource;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ledger::Ledger;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop after the pass in progress, if any, and wait for the task.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Poller task ended abnormally: {}", e);
        }
    }
}

/// Run one pass for every watched address.
pub async fn poll_once(
    ledger: &Ledger,
    source: &dyn TransferSource,
) -> Vec<(String, ReconcileReport)> {
    let mut reports = Vec::new();
    for address in ledger.watched_addresses().await {
        match ledger.trigger_reconciliation(source, &address).await {
            Ok(report) => {
                match &report.status {
                    PassStatus::Completed if !report.newly_confirmed.is_empty() => {
                        info!(
                            "Poller confirmed {} messages for {}",
                            report.newly_confirmed.len(),
                            address
                        );
                    }
                    PassStatus::Skipped => debug!("Poller pass for {} skipped", address),
                    _ => {}
                }
                if let Some(failure) = report.failure() {
                    debug!("Will retry {} next tick: {}", address, failure);
                }
                reports.push((address, report));
            }
            Err(e) => warn!("Poller cannot reconcile {}: {}", address, e),
        }
    }
    reports
}

pub fn spawn(
    ledger: Arc<Ledger>,
    source: Arc<dyn TransferSource>,
    interval: Duration,
) -> PollerHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Poller started (every {:?})", interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    poll_once(&ledger, source.as_ref()).await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Poller stopped");
    });

    PollerHandle { shutdown, task }
}
