//! Starknet node access.
//!
//! [`StarknetRpcClient`] is the only way the engine talks to a node. The
//! HTTP implementation lives in [`crate::http`]; tests plug in mocks.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use starkindex_core::error::IndexerError;
use starkindex_core::types::{Block, EventsPage, Transaction, TransactionReceipt};

/// Trait for reading chain data from a Starknet node.
#[async_trait]
pub trait StarknetRpcClient: Send + Sync {
    /// `starknet_chainId` (hex-encoded short string, e.g. `0x534e5f4d41494e`).
    async fn chain_id(&self) -> Result<String, IndexerError>;

    /// `starknet_blockNumber`: the latest confirmed block.
    async fn block_number(&self) -> Result<u64, IndexerError>;

    /// `starknet_getBlockWithTxs` for a confirmed block number.
    async fn get_block_with_txs(&self, block_number: u64) -> Result<RawBlock, IndexerError>;

    /// One page of `starknet_getEvents`.
    async fn get_events(&self, filter: &EventsFilter) -> Result<EventsPage, IndexerError>;

    /// Transactions currently in the node's pending block.
    async fn pending_transactions(&self) -> Result<Vec<Transaction>, IndexerError>;

    /// `starknet_getTransactionReceipt`.
    async fn transaction_receipt(&self, tx_hash: &str)
        -> Result<TransactionReceipt, IndexerError>;
}

#[async_trait]
impl<T: StarknetRpcClient + ?Sized> StarknetRpcClient for Arc<T> {
    async fn chain_id(&self) -> Result<String, IndexerError> {
        (**self).chain_id().await
    }

    async fn block_number(&self) -> Result<u64, IndexerError> {
        (**self).block_number().await
    }

    async fn get_block_with_txs(&self, block_number: u64) -> Result<RawBlock, IndexerError> {
        (**self).get_block_with_txs(block_number).await
    }

    async fn get_events(&self, filter: &EventsFilter) -> Result<EventsPage, IndexerError> {
        (**self).get_events(filter).await
    }

    async fn pending_transactions(&self) -> Result<Vec<Transaction>, IndexerError> {
        (**self).pending_transactions().await
    }

    async fn transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<TransactionReceipt, IndexerError> {
        (**self).transaction_receipt(tx_hash).await
    }
}

// ─── Block wire format ───────────────────────────────────────────────────────

/// A block as returned by `starknet_getBlockWithTxs`, before validation.
///
/// Pending blocks carry no `block_number`/`block_hash`, and some nodes answer
/// with transaction hashes instead of bodies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBlock {
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub parent_hash: String,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
}

/// Either a full transaction body or just its hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTransaction {
    Full(Transaction),
    Hash(String),
}

impl RawBlock {
    /// Validate that this is the full confirmed block `expected`.
    pub fn into_full_block(self, expected: u64) -> Result<Block, IndexerError> {
        let invalid = |reason: &str| IndexerError::InvalidBlock {
            block_number: expected,
            reason: reason.to_string(),
        };

        let number = self
            .block_number
            .ok_or_else(|| invalid("block has no number (pending?)"))?;
        if number != expected {
            return Err(invalid(&format!("node returned block {number}")));
        }
        let hash = self.block_hash.ok_or_else(|| invalid("block has no hash"))?;

        let transactions = self
            .transactions
            .into_iter()
            .map(|tx| match tx {
                RawTransaction::Full(tx) => Ok(tx),
                RawTransaction::Hash(_) => Err(invalid("transactions returned as hashes")),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Block {
            number,
            hash,
            parent_hash: self.parent_hash,
            timestamp: self.timestamp,
            transactions,
        })
    }

    /// Full transaction bodies, ignoring hash-only entries.
    pub fn full_transactions(self) -> Vec<Transaction> {
        self.transactions
            .into_iter()
            .filter_map(|tx| match tx {
                RawTransaction::Full(tx) => Some(tx),
                RawTransaction::Hash(_) => None,
            })
            .collect()
    }
}

// ─── Events filter ───────────────────────────────────────────────────────────

/// Arguments of one `starknet_getEvents` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsFilter {
    pub from_block: u64,
    pub to_block: u64,
    pub chunk_size: u64,
    pub continuation_token: Option<String>,
}

impl EventsFilter {
    /// Filter for every event of a single block.
    pub fn block(block_number: u64, chunk_size: u64) -> Self {
        Self {
            from_block: block_number,
            to_block: block_number,
            chunk_size,
            continuation_token: None,
        }
    }

    /// JSON-RPC params object.
    pub fn to_params(&self) -> Value {
        let mut filter = json!({
            "from_block": { "block_number": self.from_block },
            "to_block": { "block_number": self.to_block },
            "chunk_size": self.chunk_size,
        });
        if let Some(token) = &self.continuation_token {
            filter["continuation_token"] = Value::String(token.clone());
        }
        json!({ "filter": filter })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(value: Value) -> RawBlock {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn full_block_parses() {
        let block = raw(json!({
            "block_number": 7,
            "block_hash": "0xb",
            "parent_hash": "0xa",
            "timestamp": 1700000000,
            "status": "ACCEPTED_ON_L2",
            "transactions": [
                { "transaction_hash": "0x1", "type": "INVOKE", "sender_address": "0xacc", "calldata": [] }
            ]
        }))
        .into_full_block(7)
        .unwrap();
        assert_eq!(block.number, 7);
        assert_eq!(block.transactions[0].hash.as_deref(), Some("0x1"));
    }

    #[test]
    fn wrong_number_is_invalid() {
        let err = raw(json!({ "block_number": 8, "block_hash": "0xb", "transactions": [] }))
            .into_full_block(7)
            .unwrap_err();
        assert!(matches!(err, IndexerError::InvalidBlock { block_number: 7, .. }));
    }

    #[test]
    fn pending_and_hash_only_blocks_are_invalid() {
        let pending = raw(json!({ "parent_hash": "0xa", "transactions": [] }));
        assert!(pending.into_full_block(7).is_err());

        let hashes = raw(json!({ "block_number": 7, "block_hash": "0xb", "transactions": ["0x1"] }));
        assert!(hashes.into_full_block(7).is_err());
    }

    #[test]
    fn filter_params() {
        let mut filter = EventsFilter::block(42, 1000);
        assert_eq!(
            filter.to_params(),
            json!({ "filter": {
                "from_block": { "block_number": 42 },
                "to_block": { "block_number": 42 },
                "chunk_size": 1000
            }})
        );
        filter.continuation_token = Some("c1".into());
        assert_eq!(filter.to_params()["filter"]["continuation_token"], "c1");
    }
}
