//! Error types for the starkindex pipeline.

use thiserror::Error;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The node has not produced the requested block yet.
    #[error("Block not found: {block_number}")]
    BlockNotFound { block_number: u64 },

    #[error("Invalid block {block_number}: {reason}")]
    InvalidBlock { block_number: u64, reason: String },

    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Unknown writer '{0}'")]
    UnknownHandler(String),

    #[error("Unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("Handler error in '{handler}': {reason}")]
    Handler { handler: String, reason: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Indexer aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the block simply does not exist yet (poll again later).
    pub fn is_block_not_found(&self) -> bool {
        matches!(self, Self::BlockNotFound { .. })
    }

    /// Returns `true` if the index loop must stop on this error.
    pub fn is_fatal(&self) -> bool {
        !self.is_block_not_found()
    }

    /// Shorthand used by writers to report a failure.
    pub fn handler(handler: impl Into<String>, reason: impl ToString) -> Self {
        Self::Handler {
            handler: handler.into(),
            reason: reason.to_string(),
        }
    }
}
