//! starkindex-storage — persistent storage backends for StarkIndex.
//!
//! Backends:
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single-file persistence)
//!
//! The in-memory store lives in `starkindex_core::checkpoint::MemoryCheckpointStore`.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
