//! SQLite storage backend for StarkIndex.
//!
//! Persists source checkpoints, index state, and template-created sources to
//! a single SQLite file. Uses `sqlx` with WAL mode.
//!
//! # Usage
//! ```rust,no_run
//! use starkindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./index.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use starkindex_core::checkpoint::{CheckpointStore, IndexState, IndexStateStore, SourceCheckpoint};
use starkindex_core::error::IndexerError;
use starkindex_core::source::{TemplateSource, TemplateSourceStore};

fn storage_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// SQLite-backed storage for checkpoints, index state, and template sources.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./index.db"`) or a full
    /// SQLite URL (`"sqlite:./index.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Limited to one connection so every query sees the same database.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS source_checkpoints (
                contract_address TEXT    NOT NULL,
                block_number     INTEGER NOT NULL,
                PRIMARY KEY (contract_address, block_number)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_state (
                indexer_id         TEXT    PRIMARY KEY,
                last_indexed_block INTEGER NOT NULL,
                updated_at         INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS template_sources (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                contract_address TEXT    NOT NULL UNIQUE,
                template         TEXT    NOT NULL,
                start_block      INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    /// Total number of source checkpoints.
    pub async fn checkpoint_count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM source_checkpoints")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn insert_checkpoints(&self, checkpoints: &[SourceCheckpoint]) -> Result<(), IndexerError> {
        if checkpoints.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        for cp in checkpoints {
            sqlx::query(
                "INSERT OR IGNORE INTO source_checkpoints (contract_address, block_number)
                 VALUES (?, ?)",
            )
            .bind(&cp.contract_address)
            .bind(cp.block_number as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;

        debug!(count = checkpoints.len(), "source checkpoints stored");
        Ok(())
    }

    async fn checkpoints_for(&self, contract_address: &str) -> Result<Vec<u64>, IndexerError> {
        let rows = sqlx::query(
            "SELECT block_number FROM source_checkpoints
             WHERE contract_address = ? ORDER BY block_number",
        )
        .bind(contract_address)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .iter()
            .map(|r| r.get::<i64, _>("block_number") as u64)
            .collect())
    }
}

// ─── IndexStateStore impl ────────────────────────────────────────────────────

#[async_trait]
impl IndexStateStore for SqliteStorage {
    async fn load(&self, indexer_id: &str) -> Result<Option<IndexState>, IndexerError> {
        let row = sqlx::query(
            "SELECT indexer_id, last_indexed_block, updated_at
             FROM index_state WHERE indexer_id = ?",
        )
        .bind(indexer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| IndexState {
            indexer_id: r.get("indexer_id"),
            last_indexed_block: r.get::<i64, _>("last_indexed_block") as u64,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save(&self, state: IndexState) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT OR REPLACE INTO index_state (indexer_id, last_indexed_block, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(&state.indexer_id)
        .bind(state.last_indexed_block as i64)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(
            indexer_id = %state.indexer_id,
            block = state.last_indexed_block,
            "index state saved"
        );
        Ok(())
    }

    async fn delete(&self, indexer_id: &str) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM index_state WHERE indexer_id = ?")
            .bind(indexer_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }
}

// ─── TemplateSourceStore impl ────────────────────────────────────────────────

#[async_trait]
impl TemplateSourceStore for SqliteStorage {
    async fn save_template_source(&self, source: TemplateSource) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT OR IGNORE INTO template_sources (contract_address, template, start_block)
             VALUES (?, ?, ?)",
        )
        .bind(&source.contract_address)
        .bind(&source.template)
        .bind(source.start_block as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(contract = %source.contract_address, template = %source.template, "template source saved");
        Ok(())
    }

    async fn load_template_sources(&self) -> Result<Vec<TemplateSource>, IndexerError> {
        let rows = sqlx::query(
            "SELECT contract_address, template, start_block FROM template_sources ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .into_iter()
            .map(|r| TemplateSource {
                contract_address: r.get("contract_address"),
                template: r.get("template"),
                start_block: r.get::<i64, _>("start_block") as u64,
            })
            .collect())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use starkindex_core::checkpoint::CheckpointManager;
    use std::sync::Arc;

    fn cp(contract: &str, block: u64) -> SourceCheckpoint {
        SourceCheckpoint {
            contract_address: contract.into(),
            block_number: block,
        }
    }

    // ── CheckpointStore ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn checkpoints_are_idempotent() {
        let store = SqliteStorage::in_memory().await.unwrap();

        store.insert_checkpoints(&[cp("0xa", 10), cp("0xb", 10)]).await.unwrap();
        store.insert_checkpoints(&[cp("0xa", 10)]).await.unwrap();
        store.insert_checkpoints(&[cp("0xa", 12)]).await.unwrap();

        assert_eq!(store.checkpoint_count().await.unwrap(), 3);
        assert_eq!(store.checkpoints_for("0xa").await.unwrap(), vec![10, 12]);
        assert!(store.checkpoints_for("0xc").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_insert_is_a_noop() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.insert_checkpoints(&[]).await.unwrap();
        assert_eq!(store.checkpoint_count().await.unwrap(), 0);
    }

    // ── IndexStateStore ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn index_state_upsert_and_delete() {
        let store = SqliteStorage::in_memory().await.unwrap();
        assert!(store.load("prop-house").await.unwrap().is_none());

        for block in [100, 101] {
            store
                .save(IndexState {
                    indexer_id: "prop-house".into(),
                    last_indexed_block: block,
                    updated_at: 1_700_000_000,
                })
                .await
                .unwrap();
        }
        let loaded = store.load("prop-house").await.unwrap().unwrap();
        assert_eq!(loaded.last_indexed_block, 101);
        assert_eq!(loaded.updated_at, 1_700_000_000);

        store.delete("prop-house").await.unwrap();
        assert!(store.load("prop-house").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkpoint_manager_resumes_from_sqlite() {
        let store = Arc::new(SqliteStorage::in_memory().await.unwrap());

        let manager = CheckpointManager::new(store.clone(), "idx");
        let mut cursor = manager.load_cursor(50).await.unwrap();
        manager.commit(&mut cursor, 50).await.unwrap();
        manager.commit(&mut cursor, 51).await.unwrap();

        let restarted = CheckpointManager::new(store, "idx");
        let cursor = restarted.load_cursor(50).await.unwrap();
        assert_eq!(cursor.next_block(), 52);
    }

    // ── TemplateSourceStore ───────────────────────────────────────────────────

    #[tokio::test]
    async fn template_sources_keep_order_and_ignore_duplicates() {
        let store = SqliteStorage::in_memory().await.unwrap();
        for (contract, start) in [("0x2", 7), ("0x1", 9), ("0x2", 11)] {
            store
                .save_template_source(TemplateSource {
                    contract_address: contract.into(),
                    template: "Round".into(),
                    start_block: start,
                })
                .await
                .unwrap();
        }

        let loaded = store.load_template_sources().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].contract_address, "0x2");
        assert_eq!(loaded[0].start_block, 7);
        assert_eq!(loaded[1].contract_address, "0x1");
    }
}
