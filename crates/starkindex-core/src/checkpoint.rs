//! Checkpoints and index state.
//!
//! Two kinds of durable progress are tracked:
//! - **source checkpoints**: append-only facts "source X had activity at block N";
//! - **index state**: the last block this indexer fully processed. On restart
//!   the indexer resumes from the block after it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::cursor::Cursor;
use crate::error::IndexerError;
use crate::source::{TemplateSource, TemplateSourceStore};

/// "This source had matching activity at this block."
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceCheckpoint {
    pub contract_address: String,
    pub block_number: u64,
}

/// Storage for source checkpoints. Inserts are insert-or-ignore.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn insert_checkpoints(&self, checkpoints: &[SourceCheckpoint]) -> Result<(), IndexerError>;

    /// Blocks at which `contract_address` had activity, ascending.
    async fn checkpoints_for(&self, contract_address: &str) -> Result<Vec<u64>, IndexerError>;
}

/// Persisted position of one indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexState {
    pub indexer_id: String,
    pub last_indexed_block: u64,
    /// Unix timestamp of when this state was saved.
    pub updated_at: i64,
}

/// Storage for [`IndexState`].
#[async_trait]
pub trait IndexStateStore: Send + Sync {
    async fn load(&self, indexer_id: &str) -> Result<Option<IndexState>, IndexerError>;

    /// Save (upsert) the state.
    async fn save(&self, state: IndexState) -> Result<(), IndexerError>;

    /// Delete the state (e.g. when resetting an indexer).
    async fn delete(&self, indexer_id: &str) -> Result<(), IndexerError>;
}

/// Reads and commits the index state for one indexer.
pub struct CheckpointManager {
    store: Arc<dyn IndexStateStore>,
    indexer_id: String,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn IndexStateStore>, indexer_id: impl Into<String>) -> Self {
        Self {
            store,
            indexer_id: indexer_id.into(),
        }
    }

    pub fn indexer_id(&self) -> &str {
        &self.indexer_id
    }

    /// Last fully indexed block, if any.
    pub async fn last_indexed_block(&self) -> Result<Option<u64>, IndexerError> {
        Ok(self.store.load(&self.indexer_id).await?.map(|s| s.last_indexed_block))
    }

    /// Build the cursor to resume from. Saved progress wins over `start_block`
    /// unless `start_block` is further ahead.
    pub async fn load_cursor(&self, start_block: u64) -> Result<Cursor, IndexerError> {
        let last = self.last_indexed_block().await?;
        if let Some(block) = last {
            tracing::info!(
                indexer = %self.indexer_id,
                last_indexed_block = block,
                "resuming from saved index state"
            );
        }
        Ok(Cursor::new(start_block, last))
    }

    /// Persist `block_number` as fully indexed and advance the cursor.
    ///
    /// The store is written first, so a failed write leaves the cursor unchanged.
    pub async fn commit(&self, cursor: &mut Cursor, block_number: u64) -> Result<(), IndexerError> {
        cursor.check_advance(block_number)?;
        self.store
            .save(IndexState {
                indexer_id: self.indexer_id.clone(),
                last_indexed_block: block_number,
                updated_at: chrono::Utc::now().timestamp(),
            })
            .await?;
        cursor.advance(block_number)
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory store for tests and ephemeral indexers.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, BTreeSet<u64>>>,
    states: Mutex<HashMap<String, IndexState>>,
    template_sources: Mutex<Vec<TemplateSource>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of distinct checkpoints.
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(BTreeSet::len)
            .sum()
    }

    pub fn has_checkpoint(&self, contract_address: &str, block_number: u64) -> bool {
        self.checkpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(contract_address)
            .is_some_and(|blocks| blocks.contains(&block_number))
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn insert_checkpoints(&self, checkpoints: &[SourceCheckpoint]) -> Result<(), IndexerError> {
        let mut data = self.checkpoints.lock().unwrap_or_else(|e| e.into_inner());
        for cp in checkpoints {
            data.entry(cp.contract_address.clone())
                .or_default()
                .insert(cp.block_number);
        }
        Ok(())
    }

    async fn checkpoints_for(&self, contract_address: &str) -> Result<Vec<u64>, IndexerError> {
        Ok(self
            .checkpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(contract_address)
            .map(|blocks| blocks.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl IndexStateStore for MemoryCheckpointStore {
    async fn load(&self, indexer_id: &str) -> Result<Option<IndexState>, IndexerError> {
        Ok(self
            .states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(indexer_id)
            .cloned())
    }

    async fn save(&self, state: IndexState) -> Result<(), IndexerError> {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(state.indexer_id.clone(), state);
        Ok(())
    }

    async fn delete(&self, indexer_id: &str) -> Result<(), IndexerError> {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(indexer_id);
        Ok(())
    }
}

#[async_trait]
impl TemplateSourceStore for MemoryCheckpointStore {
    async fn save_template_source(&self, source: TemplateSource) -> Result<(), IndexerError> {
        let mut saved = self.template_sources.lock().unwrap_or_else(|e| e.into_inner());
        if !saved.iter().any(|s| s.contract_address == source.contract_address) {
            saved.push(source);
        }
        Ok(())
    }

    async fn load_template_sources(&self) -> Result<Vec<TemplateSource>, IndexerError> {
        Ok(self
            .template_sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}
