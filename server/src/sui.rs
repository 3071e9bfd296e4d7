//! Sui JSON-RPC transfer source.
//!
//! Talks to a fullnode over plain JSON-RPC with `reqwest` and implements only
//! what reconciliation needs: the most recent transaction blocks sent to an
//! address, with their balance changes.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use superchat_common::transfer::{ObservedTransfer, TransferSource, TransferSourceError};
use tracing::debug;

pub const DEFAULT_RPC_URL: &str = "https://fullnode.mainnet.sui.io:443";

/// Transaction blocks fetched per reconciliation pass.
pub const DEFAULT_QUERY_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBlockPage {
    pub data: Vec<TransactionBlock>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_next_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBlock {
    pub digest: String,
    #[serde(default)]
    pub balance_changes: Option<Vec<BalanceChange>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    /// `{"AddressOwner": "0x.."}`, `{"ObjectOwner": ..}`, `{"Shared": ..}`,
    /// `"Immutable"`, ... Kept loose so new owner kinds don't break decoding.
    pub owner: Value,
    pub coin_type: String,
    /// Signed decimal string in MIST.
    pub amount: String,
}

impl BalanceChange {
    pub fn address_owner(&self) -> Option<&str> {
        self.owner.get("AddressOwner").and_then(Value::as_str)
    }
}

/// Flatten a page into one transfer per address-owned balance change.
pub fn transfers_from_page(
    page: TransactionBlockPage,
) -> Result<Vec<ObservedTransfer>, TransferSourceError> {
    let mut transfers = Vec::new();
    for block in page.data {
        for change in block.balance_changes.unwrap_or_default() {
            let Some(owner) = change.address_owner() else {
                continue;
            };
            let raw_value: i128 = change.amount.parse().map_err(|e| {
                TransferSourceError::Decode(format!(
                    "balance change amount '{}' in {}: {}",
                    change.amount, block.digest, e
                ))
            })?;
            transfers.push(ObservedTransfer {
                asset_type: change.coin_type.clone(),
                raw_value,
                destination_owner: owner.to_string(),
                transfer_id: block.digest.clone(),
            });
        }
    }
    Ok(transfers)
}

/// Minimal Sui fullnode client.
pub struct SuiRpcClient {
    url: String,
    client: reqwest::Client,
    limit: u32,
}

impl SuiRpcClient {
    pub fn new(
        url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, TransferSourceError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransferSourceError::Http(format!("failed to build client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
            limit: DEFAULT_QUERY_LIMIT,
        })
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, TransferSourceError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| TransferSourceError::Http(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferSourceError::Http(format!(
                "{} returned HTTP {}",
                method, status
            )));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| TransferSourceError::Decode(format!("{} response: {}", method, e)))?;

        if let Some(err) = body.error {
            return Err(TransferSourceError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        body.result.ok_or_else(|| {
            TransferSourceError::Decode(format!("{} response has no result", method))
        })
    }

    /// Newest transaction blocks whose recipient is `address`.
    pub async fn query_transactions_to(
        &self,
        address: &str,
    ) -> Result<TransactionBlockPage, TransferSourceError> {
        let params = json!([
            {
                "filter": { "ToAddress": address },
                "options": { "showBalanceChanges": true }
            },
            null,
            self.limit,
            true
        ]);
        self.call("suix_queryTransactionBlocks", params).await
    }
}

#[async_trait]
impl TransferSource for SuiRpcClient {
    async fn fetch_incoming_transfers(
        &self,
        address: &str,
    ) -> Result<Vec<ObservedTransfer>, TransferSourceError> {
        let page = self.query_transactions_to(address).await?;
        debug!("Fetched {} transaction blocks for {}", page.data.len(), address);
        transfers_from_page(page)
    }

    fn source_name(&self) -> &str {
        "sui-json-rpc"
    }
}
