#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use superchat_common::transfer::{
    ObservedTransfer, TransferSource, TransferSourceError, SUI_COIN_TYPE,
};
use superchat_server::ledger::{Ledger, LedgerSettings};
use tokio::sync::Notify;

pub const STREAMER: &str = "0x00000000000000000000000000000000000000000000000000000000000000aa";
pub const OTHER_STREAMER: &str = "0x00000000000000000000000000000000000000000000000000000000000000bb";

pub fn in_memory_ledger() -> Ledger {
    Ledger::new(LedgerSettings::default())
}

pub fn sui_transfer(raw_value: i128, to: &str, digest: &str) -> ObservedTransfer {
    ObservedTransfer {
        asset_type: SUI_COIN_TYPE.to_string(),
        raw_value,
        destination_owner: to.to_string(),
        transfer_id: digest.to_string(),
    }
}

/// Returns whatever transfers the test has pushed so far.
#[derive(Default)]
pub struct StaticSource {
    transfers: Mutex<Vec<ObservedTransfer>>,
}

impl StaticSource {
    pub fn new(transfers: Vec<ObservedTransfer>) -> Self {
        Self {
            transfers: Mutex::new(transfers),
        }
    }

    pub fn push(&self, transfer: ObservedTransfer) {
        self.transfers.lock().unwrap().push(transfer);
    }
}

#[async_trait]
impl TransferSource for StaticSource {
    async fn fetch_incoming_transfers(
        &self,
        _address: &str,
    ) -> Result<Vec<ObservedTransfer>, TransferSourceError> {
        Ok(self.transfers.lock().unwrap().clone())
    }

    fn source_name(&self) -> &str {
        "static"
    }
}

pub struct FailingSource;

#[async_trait]
impl TransferSource for FailingSource {
    async fn fetch_incoming_transfers(
        &self,
        _address: &str,
    ) -> Result<Vec<ObservedTransfer>, TransferSourceError> {
        Err(TransferSourceError::Http("connection refused".to_string()))
    }

    fn source_name(&self) -> &str {
        "failing"
    }
}

/// Sleeps before answering, for exercising the fetch timeout.
pub struct SlowSource(pub Duration);

#[async_trait]
impl TransferSource for SlowSource {
    async fn fetch_incoming_transfers(
        &self,
        _address: &str,
    ) -> Result<Vec<ObservedTransfer>, TransferSourceError> {
        tokio::time::sleep(self.0).await;
        Ok(Vec::new())
    }

    fn source_name(&self) -> &str {
        "slow"
    }
}

/// Blocks inside the fetch until released, so a test can hold a pass open.
#[derive(Default)]
pub struct GateSource {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl TransferSource for GateSource {
    async fn fetch_incoming_transfers(
        &self,
        _address: &str,
    ) -> Result<Vec<ObservedTransfer>, TransferSourceError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Vec::new())
    }

    fn source_name(&self) -> &str {
        "gate"
    }
}
