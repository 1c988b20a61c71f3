//! Indexer configuration and state types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::IndexerError;
use crate::source::{SourceConfig, SourceEventConfig, TemplateConfig};

/// Configuration for an indexer instance.
///
/// Deserializes from the same JSON shape the host application keeps its
/// indexer config in; unspecified fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Unique name for this indexer (used as the index-state key).
    pub id: String,
    /// Starknet JSON-RPC endpoint.
    pub network_node_url: String,
    /// First block to index.
    pub start: u64,
    /// Optional last block (inclusive). `None` = run forever.
    pub to_block: Option<u64>,
    /// Wait between polls when the next block does not exist yet (milliseconds).
    pub poll_interval_ms: u64,
    /// Page size for `starknet_getEvents`.
    pub events_chunk_size: u64,
    /// Dispatch pending-pool transactions while waiting for the next block.
    pub optimistic_indexing: bool,
    /// Writer invoked once for every transaction.
    pub tx_fn: Option<String>,
    /// Events matched by selector regardless of emitting contract.
    pub global_events: Vec<SourceEventConfig>,
    pub sources: Vec<SourceConfig>,
    pub templates: HashMap<String, TemplateConfig>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            network_node_url: "http://127.0.0.1:9545/rpc/v0_7".into(),
            start: 0,
            to_block: None,
            poll_interval_ms: 2000,
            events_chunk_size: 1000,
            optimistic_indexing: false,
            tx_fn: None,
            global_events: Vec::new(),
            sources: Vec::new(),
            templates: HashMap::new(),
        }
    }
}

impl IndexerConfig {
    pub fn from_json(json: &str) -> Result<Self, IndexerError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| IndexerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs that can never run.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.events_chunk_size == 0 {
            return Err(IndexerError::Config("events_chunk_size must be > 0".into()));
        }
        if let Some(to) = self.to_block {
            if to < self.start {
                return Err(IndexerError::Config(format!(
                    "to_block {to} is before start {}",
                    self.start
                )));
            }
        }
        Ok(())
    }
}

/// Runtime state of the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Between blocks.
    Idle,
    /// Fetching a block and its events.
    FetchingBlock,
    /// Invoking writers for the block's transactions.
    Dispatching,
    /// Saving the index state.
    Committing,
    /// Terminated (target reached or shutdown requested).
    Stopped,
    /// Encountered an unrecoverable error.
    Error,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::FetchingBlock => write!(f, "fetching-block"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Committing => write!(f, "committing"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_json() {
        let cfg = IndexerConfig::from_json(
            r#"{
                "id": "prop-house",
                "start": 4000,
                "optimistic_indexing": true,
                "tx_fn": "handleTx",
                "global_events": [{ "name": "RoundRegistered", "fn": "handleRoundRegistered" }],
                "sources": [{
                    "contract": "0x1",
                    "start": 4000,
                    "deploy_fn": "handleDeploy",
                    "events": [{ "name": "RoundCreated", "fn": "handleRoundCreated" }]
                }],
                "templates": { "Round": { "abi": "Round", "events": [{ "name": "VoteCast", "fn": "handleVote" }] } }
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.id, "prop-house");
        assert_eq!(cfg.events_chunk_size, 1000); // default
        assert!(cfg.optimistic_indexing);
        assert_eq!(cfg.sources[0].events[0].handler, "handleRoundCreated");
        assert_eq!(cfg.templates["Round"].events[0].name, "VoteCast");
    }

    #[test]
    fn config_validation() {
        assert!(IndexerConfig::from_json(r#"{ "events_chunk_size": 0 }"#).is_err());
        assert!(IndexerConfig::from_json(r#"{ "start": 10, "to_block": 5 }"#).is_err());
        assert!(IndexerConfig::from_json("not json").is_err());
    }

    #[test]
    fn state_display() {
        assert_eq!(IndexerState::FetchingBlock.to_string(), "fetching-block");
    }
}
