//! HTTP JSON-RPC client for Starknet nodes, backed by `reqwest`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use starkindex_core::error::IndexerError;
use starkindex_core::types::{EventsPage, Transaction, TransactionReceipt};

use crate::rpc::{EventsFilter, RawBlock, StarknetRpcClient};

/// A JSON-RPC 2.0 request with named params.
#[derive(Debug, Clone, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// Starknet JSON-RPC client over HTTP.
pub struct StarknetHttpClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl StarknetHttpClient {
    /// Create a client with a 30 second request timeout.
    pub fn new(url: impl Into<String>) -> Result<Self, IndexerError> {
        Self::with_timeout(url, Duration::from_secs(30))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, IndexerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexerError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, IndexerError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        tracing::trace!(method, id = request.id, "rpc request");

        let resp = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| IndexerError::Rpc(format!("{method}: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(IndexerError::Rpc(format!("{method}: HTTP {status}: {body}")));
        }

        let body: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| IndexerError::Rpc(format!("{method}: {e}")))?;
        decode_response(method, body)
    }
}

/// Turn a JSON-RPC response into the typed result or an [`IndexerError::Rpc`]
/// carrying the node's code and message.
fn decode_response<T: DeserializeOwned>(method: &str, body: JsonRpcResponse) -> Result<T, IndexerError> {
    if let Some(err) = body.error {
        let mut message = format!("{method}: {} ({})", err.message, err.code);
        if let Some(data) = err.data {
            message.push_str(&format!(": {data}"));
        }
        return Err(IndexerError::Rpc(message));
    }
    let result = body
        .result
        .ok_or_else(|| IndexerError::Rpc(format!("{method}: response has neither result nor error")))?;
    serde_json::from_value(result).map_err(|e| IndexerError::Decode(format!("{method}: {e}")))
}

#[async_trait]
impl StarknetRpcClient for StarknetHttpClient {
    async fn chain_id(&self) -> Result<String, IndexerError> {
        self.call("starknet_chainId", json!([])).await
    }

    async fn block_number(&self) -> Result<u64, IndexerError> {
        self.call("starknet_blockNumber", json!([])).await
    }

    async fn get_block_with_txs(&self, block_number: u64) -> Result<RawBlock, IndexerError> {
        self.call(
            "starknet_getBlockWithTxs",
            json!({ "block_id": { "block_number": block_number } }),
        )
        .await
    }

    async fn get_events(&self, filter: &EventsFilter) -> Result<EventsPage, IndexerError> {
        self.call("starknet_getEvents", filter.to_params()).await
    }

    async fn pending_transactions(&self) -> Result<Vec<Transaction>, IndexerError> {
        let block: RawBlock = self
            .call("starknet_getBlockWithTxs", json!({ "block_id": "pending" }))
            .await?;
        Ok(block.full_transactions())
    }

    async fn transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<TransactionReceipt, IndexerError> {
        self.call(
            "starknet_getTransactionReceipt",
            json!({ "transaction_hash": tx_hash }),
        )
        .await
    }
}
