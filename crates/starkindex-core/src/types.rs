//! Shared types for the indexing pipeline.
//!
//! Field names follow the Starknet JSON-RPC wire format so that node
//! responses deserialize straight into these types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ─── Block ────────────────────────────────────────────────────────────────────

/// A confirmed block with full transaction bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "block_number")]
    pub number: u64,
    #[serde(rename = "block_hash")]
    pub hash: String,
    pub parent_hash: String,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Hashes of every transaction in the block, in block order.
    pub fn transaction_hashes(&self) -> impl Iterator<Item = &str> {
        self.transactions.iter().filter_map(|tx| tx.hash.as_deref())
    }
}

/// Which block a transaction is being dispatched for.
#[derive(Debug, Clone, Copy)]
pub enum BlockRef<'a> {
    /// The transaction is part of a confirmed block.
    Confirmed(&'a Block),
    /// The transaction is still in the node's pending pool.
    Pending,
}

impl<'a> BlockRef<'a> {
    pub fn block(&self) -> Option<&'a Block> {
        match self {
            Self::Confirmed(block) => Some(block),
            Self::Pending => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// Starknet transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Invoke,
    Declare,
    Deploy,
    DeployAccount,
    L1Handler,
    #[serde(other)]
    Unknown,
}

/// A transaction body. Only the fields the engine looks at are typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Missing on some pending-pool entries.
    #[serde(rename = "transaction_hash", default)]
    pub hash: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    /// Deployed address; populated only for deployment transactions.
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub sender_address: Option<String>,
    #[serde(default)]
    pub calldata: Vec<String>,
}

impl Transaction {
    /// Returns `true` for `DEPLOY` and `DEPLOY_ACCOUNT` transactions.
    pub fn is_deploy(&self) -> bool {
        matches!(
            self.tx_type,
            TransactionType::Deploy | TransactionType::DeployAccount
        )
    }

    /// The deployed contract address, if this is a deployment.
    pub fn deployed_address(&self) -> Option<&str> {
        if self.is_deploy() {
            self.contract_address.as_deref()
        } else {
            None
        }
    }
}

// ─── Event ────────────────────────────────────────────────────────────────────

/// A raw emitted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub from_address: String,
    /// `keys[0]` is the event selector.
    pub keys: Vec<String>,
    pub data: Vec<String>,
    /// Absent on events embedded in a receipt; filled in when grouping.
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub block_number: Option<u64>,
}

impl Event {
    /// The event selector (first key), if any.
    pub fn selector(&self) -> Option<&str> {
        self.keys.first().map(String::as_str)
    }
}

/// Events of one block (or pool pass) grouped by transaction hash.
pub type EventsMap = HashMap<String, Vec<Event>>;

/// Group a flat event list by transaction hash, preserving order within each hash.
pub fn group_events_by_tx(events: Vec<Event>) -> EventsMap {
    let mut map = EventsMap::new();
    for event in events {
        map.entry(event.transaction_hash.clone())
            .or_default()
            .push(event);
    }
    map
}

/// A page returned by `starknet_getEvents`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsPage {
    pub events: Vec<Event>,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

/// The parts of a transaction receipt the pool reconciler needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub events: Vec<Event>,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
