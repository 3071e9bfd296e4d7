//! The donation ledger: owns the message store and streamer profiles and
//! serialises every mutation of them.
//!
//! Two locks:
//! - `inner` guards the store, the profiles and the RNG. Generate-check-insert
//!   and the matching step of a reconciliation pass each run under one guard
//!   with no `.await` inside.
//! - `pass_lock` admits one reconciliation pass at a time. A pass triggered
//!   while another is running is skipped rather than queued.
//!
//! The transfer fetch happens between the two, so submissions keep flowing
//! while a pass waits on the chain.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use superchat_common::amount::{Amount, AmountGenerator, DEFAULT_MAX_ATTEMPTS, MIST_PER_SUI};
use superchat_common::error::LedgerError;
use superchat_common::message::{validate_fields, Message, MessageId};
use superchat_common::reconcile::{ReconcileReport, Reconciler};
use superchat_common::store::MessageStore;
use superchat_common::streamer::{normalize_address, StreamerProfile};
use superchat_common::transfer::{ObservedTransfer, TransferSource, TransferSourceError};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::persistence::{LedgerSnapshot, SnapshotFile};

/// Default bound on one transfer fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub max_attempts: u32,
    pub fetch_timeout: Duration,
    pub snapshot_file: Option<SnapshotFile>,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            snapshot_file: None,
        }
    }
}

/// What a viewer needs to pay after submitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedMessage {
    pub id: MessageId,
    pub exact_amount: Amount,
}

impl SubmittedMessage {
    /// Value to send in MIST.
    pub fn raw_amount(&self) -> u128 {
        self.exact_amount.to_raw_units(MIST_PER_SUI)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub pending: usize,
    pub confirmed: usize,
    pub streamers: usize,
}

struct LedgerInner {
    store: MessageStore,
    streamers: BTreeMap<String, StreamerProfile>,
    rng: StdRng,
}

pub struct Ledger {
    inner: Mutex<LedgerInner>,
    pass_lock: Mutex<()>,
    generator: AmountGenerator,
    reconciler: Reconciler,
    fetch_timeout: Duration,
    snapshot_file: Option<SnapshotFile>,
}

impl Ledger {
    pub fn new(settings: LedgerSettings) -> Self {
        Self::from_parts(settings, MessageStore::new(), BTreeMap::new())
    }

    /// Rebuild a ledger from a persisted snapshot.
    pub fn restore(
        settings: LedgerSettings,
        snapshot: LedgerSnapshot,
    ) -> Result<Self, LedgerError> {
        let store = MessageStore::from_snapshot(snapshot.store)?;
        let mut streamers = BTreeMap::new();
        for profile in snapshot.streamers {
            let address = normalize_address(&profile.address)?;
            streamers.insert(address, profile);
        }
        info!(
            "Restored ledger: {} pending, {} confirmed, {} streamers",
            store.pending_count(),
            store.confirmed_count(),
            streamers.len()
        );
        Ok(Self::from_parts(settings, store, streamers))
    }

    /// Load from the configured snapshot file if it exists, else start empty.
    pub fn open(settings: LedgerSettings) -> anyhow::Result<Self> {
        let snapshot = match &settings.snapshot_file {
            Some(file) => file.load()?,
            None => None,
        };
        match snapshot {
            Some(snapshot) => Ok(Self::restore(settings, snapshot)?),
            None => Ok(Self::new(settings)),
        }
    }

    fn from_parts(
        settings: LedgerSettings,
        store: MessageStore,
        streamers: BTreeMap<String, StreamerProfile>,
    ) -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                store,
                streamers,
                rng: StdRng::from_entropy(),
            }),
            pass_lock: Mutex::new(()),
            generator: AmountGenerator::new(settings.max_attempts),
            reconciler: Reconciler::default(),
            fetch_timeout: settings.fetch_timeout,
            snapshot_file: settings.snapshot_file,
        }
    }

    // ─── Submission ─────────────────────────────────────────────────────────

    /// Validate a donation intent, assign it a unique exact amount and record
    /// it as pending.
    pub async fn submit_message(
        &self,
        display_name: &str,
        text: &str,
        base_amount: f64,
        streamer_address: &str,
    ) -> Result<SubmittedMessage, LedgerError> {
        let base = Amount::from_base(base_amount)?;
        let whole = Amount::base_whole_part(base_amount)?;
        validate_fields(display_name, text)?;
        let address = normalize_address(streamer_address)?;

        let mut inner = self.inner.lock().await;
        let LedgerInner { store, rng, .. } = &mut *inner;

        let exact = self
            .generator
            .generate(whole, rng, |key| store.is_amount_taken(key))?;
        let message = Message::new_pending(display_name, text, base, exact, &address, Utc::now())?;
        let id = message.id;
        store.insert(message).inspect_err(|e| {
            error!("Generated amount collided in store: {}", e);
        })?;

        info!("Stored message {} for {}, amount {}", id, address, exact);
        self.persist(&inner);

        Ok(SubmittedMessage {
            id,
            exact_amount: exact,
        })
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    pub async fn confirmed_messages(
        &self,
        streamer_address: &str,
    ) -> Result<Vec<Message>, LedgerError> {
        let address = normalize_address(streamer_address)?;
        Ok(self.inner.lock().await.store.list_confirmed(Some(&address)))
    }

    pub async fn pending_messages(
        &self,
        streamer_address: &str,
    ) -> Result<Vec<Message>, LedgerError> {
        let address = normalize_address(streamer_address)?;
        Ok(self.inner.lock().await.store.list_pending(Some(&address)))
    }

    pub async fn message(&self, id: &MessageId) -> Option<Message> {
        self.inner.lock().await.store.get(id).cloned()
    }

    pub async fn stats(&self) -> LedgerStats {
        let inner = self.inner.lock().await;
        LedgerStats {
            pending: inner.store.pending_count(),
            confirmed: inner.store.confirmed_count(),
            streamers: inner.streamers.len(),
        }
    }

    // ─── Streamers ──────────────────────────────────────────────────────────

    /// Store or replace a streamer's profile. Registered addresses are the
    /// ones the poller reconciles.
    pub async fn register_streamer(&self, profile: StreamerProfile) -> StreamerProfile {
        let mut inner = self.inner.lock().await;
        inner
            .streamers
            .insert(profile.address.clone(), profile.clone());
        info!("Registered streamer {}", profile.address);
        self.persist(&inner);
        profile
    }

    pub async fn streamer(&self, address: &str) -> Result<Option<StreamerProfile>, LedgerError> {
        let address = normalize_address(address)?;
        Ok(self.inner.lock().await.streamers.get(&address).cloned())
    }

    pub async fn watched_addresses(&self) -> Vec<String> {
        self.inner.lock().await.streamers.keys().cloned().collect()
    }

    // ─── Reconciliation ─────────────────────────────────────────────────────

    /// Fetch recent transfers for `streamer_address` and confirm every pending
    /// message they pay for.
    ///
    /// Only an invalid address is an error. A failed or timed-out fetch comes
    /// back as an `UpstreamUnavailable` report with nothing confirmed, and a
    /// pass that finds another one running comes back as `Skipped`.
    pub async fn trigger_reconciliation(
        &self,
        source: &dyn TransferSource,
        streamer_address: &str,
    ) -> Result<ReconcileReport, LedgerError> {
        let address = normalize_address(streamer_address)?;

        let Ok(_pass) = self.pass_lock.try_lock() else {
            debug!("Reconciliation for {} skipped: pass already running", address);
            return Ok(ReconcileReport::skipped());
        };

        let transfers = match self.fetch_transfers(source, &address).await {
            Ok(transfers) => transfers,
            Err(e) => {
                warn!(
                    "Reconciliation for {} aborted, {} unavailable: {}",
                    address,
                    source.source_name(),
                    e
                );
                return Ok(ReconcileReport::upstream_unavailable(e.to_string()));
            }
        };

        let mut inner = self.inner.lock().await;
        let outcome = self
            .reconciler
            .reconcile(&mut inner.store, &address, &transfers, Utc::now());
        for conflict in &outcome.conflicts {
            warn!("Reconciliation for {} refused a match: {}", address, conflict);
        }
        let newly_confirmed = outcome.newly_confirmed;

        if newly_confirmed.is_empty() {
            debug!(
                "Reconciliation for {}: {} transfers, nothing new",
                address,
                transfers.len()
            );
        } else {
            for id in &newly_confirmed {
                info!("Confirmed message {} for {}", id, address);
            }
            self.persist(&inner);
        }

        Ok(ReconcileReport::completed(newly_confirmed))
    }

    /// Recent transfers to an already-normalized address, bounded by the
    /// fetch timeout.
    pub async fn fetch_transfers(
        &self,
        source: &dyn TransferSource,
        address: &str,
    ) -> Result<Vec<ObservedTransfer>, TransferSourceError> {
        tokio::time::timeout(self.fetch_timeout, source.fetch_incoming_transfers(address))
            .await
            .unwrap_or(Err(TransferSourceError::Timeout(self.fetch_timeout)))
    }

    // ─── Persistence ────────────────────────────────────────────────────────

    fn persist(&self, inner: &LedgerInner) {
        let Some(file) = &self.snapshot_file else {
            return;
        };
        let snapshot = LedgerSnapshot {
            store: inner.store.snapshot(),
            streamers: inner.streamers.values().cloned().collect(),
        };
        if let Err(e) = file.save(&snapshot) {
            error!("Failed to persist ledger snapshot: {}", e);
        }
    }
}
