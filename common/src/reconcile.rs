//! Matching of observed chain transfers to pending messages.
//!
//! A transfer confirms a message when, after truncating its value to four
//! decimals, it equals the message's exact amount and it was paid to the
//! message's streamer in the native asset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, MIST_PER_SUI};
use crate::error::LedgerError;
use crate::message::MessageId;
use crate::store::MessageStore;
use crate::streamer::normalize_address;
use crate::transfer::{ObservedTransfer, SUI_COIN_TYPE};

/// Outcome of one reconciliation pass as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PassStatus {
    Completed,
    /// Another pass was already running.
    Skipped,
    /// The transfer source failed; nothing was confirmed.
    UpstreamUnavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub newly_confirmed: Vec<MessageId>,
    pub status: PassStatus,
}

impl ReconcileReport {
    pub fn completed(newly_confirmed: Vec<MessageId>) -> Self {
        Self {
            newly_confirmed,
            status: PassStatus::Completed,
        }
    }

    pub fn skipped() -> Self {
        Self {
            newly_confirmed: Vec::new(),
            status: PassStatus::Skipped,
        }
    }

    pub fn upstream_unavailable(reason: impl Into<String>) -> Self {
        Self {
            newly_confirmed: Vec::new(),
            status: PassStatus::UpstreamUnavailable {
                reason: reason.into(),
            },
        }
    }

    /// The transient failure behind an aborted pass, for logging and retry
    /// scheduling.
    pub fn failure(&self) -> Option<LedgerError> {
        match &self.status {
            PassStatus::UpstreamUnavailable { reason } => {
                Some(LedgerError::TransientUpstreamFailure(reason.clone()))
            }
            _ => None,
        }
    }
}

/// Result of matching one batch of transfers against the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Ids that flipped to confirmed, in batch order.
    pub newly_confirmed: Vec<MessageId>,
    /// Confirmations the store refused. Empty unless the store and the
    /// pre-checks disagree.
    pub conflicts: Vec<LedgerError>,
}

/// Correlates transfers with the store by exact amount.
#[derive(Debug, Clone)]
pub struct Reconciler {
    asset_type: String,
    unit_scale: u64,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(SUI_COIN_TYPE, MIST_PER_SUI)
    }
}

impl Reconciler {
    pub fn new(asset_type: &str, unit_scale: u64) -> Self {
        Self {
            asset_type: asset_type.to_string(),
            unit_scale,
        }
    }

    pub fn unit_scale(&self) -> u64 {
        self.unit_scale
    }

    /// Correlation key for a transfer, or `None` if the transfer can never
    /// match (wrong asset, non-positive value, not paid to `destination`).
    pub fn transfer_key(&self, destination: &str, transfer: &ObservedTransfer) -> Option<String> {
        if transfer.asset_type != self.asset_type || transfer.raw_value <= 0 {
            return None;
        }
        let owner = normalize_address(&transfer.destination_owner).ok()?;
        if owner != destination {
            return None;
        }
        let raw = u128::try_from(transfer.raw_value).ok()?;
        Amount::from_raw_units(raw, self.unit_scale).map(|a| a.key())
    }

    /// Confirm every pending message of `destination` matched by `transfers`.
    ///
    /// `destination` must already be normalized. Running the same batch again
    /// confirms nothing.
    pub fn reconcile(
        &self,
        store: &mut MessageStore,
        destination: &str,
        transfers: &[ObservedTransfer],
        now: DateTime<Utc>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for transfer in transfers {
            let Some(key) = self.transfer_key(destination, transfer) else {
                continue;
            };
            let Some(message) = store.find_by_amount(&key) else {
                continue;
            };
            if message.confirmed || message.streamer_address != destination {
                continue;
            }
            if store.is_transfer_used(&transfer.transfer_id) {
                continue;
            }

            let id = message.id;
            match store.confirm(&id, &transfer.transfer_id, now) {
                Ok(true) => outcome.newly_confirmed.push(id),
                Ok(false) => {}
                Err(e) => outcome.conflicts.push(e),
            }
        }

        outcome
    }
}
