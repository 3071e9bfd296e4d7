use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coin type of the chain's native asset.
pub const SUI_COIN_TYPE: &str = "0x2::sui::SUI";

/// One balance movement observed on chain.
///
/// `raw_value` is signed: outgoing changes are negative and never match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedTransfer {
    pub asset_type: String,
    pub raw_value: i128,
    pub destination_owner: String,
    /// Transaction digest the change belongs to.
    pub transfer_id: String,
}

/// Errors from a transfer source. All of them are transient from the
/// reconciler's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferSourceError {
    #[error("http error: {0}")]
    Http(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Supplier of recent incoming transfers for an address.
///
/// The reconciler only depends on this shape. The server implements it over
/// Sui JSON-RPC; tests use in-memory fakes.
#[async_trait]
pub trait TransferSource: Send + Sync {
    async fn fetch_incoming_transfers(
        &self,
        address: &str,
    ) -> Result<Vec<ObservedTransfer>, TransferSourceError>;

    /// Human-readable backend name for logs.
    fn source_name(&self) -> &str;
}
