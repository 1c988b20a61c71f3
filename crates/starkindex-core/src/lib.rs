//! starkindex-core — foundation for the resumable Starknet indexing engine.
//!
//! # Architecture
//!
//! ```text
//! IndexLoop (starkindex-starknet)
//!     ├── BlockFetcher / EventAggregator  (node reads)
//!     ├── PoolReconciler                  (pending transactions)
//!     └── TransactionDispatcher           (this crate)
//!             ├── WriterRegistry          (named business-logic writers)
//!             ├── SourceRegistry          (tracked contracts + templates)
//!             ├── AbiRegistry             (best-effort event decoding)
//!             └── CheckpointStore         (per-source activity facts)
//! ```

pub mod checkpoint;
pub mod cursor;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod felt;
pub mod handler;
pub mod indexer;
pub mod pool;
pub mod source;
pub mod types;

pub use checkpoint::{
    CheckpointManager, CheckpointStore, IndexState, IndexStateStore, MemoryCheckpointStore,
    SourceCheckpoint,
};
pub use cursor::Cursor;
pub use decoder::{AbiRegistry, EventDecoder, FieldListDecoder, ParsedEvent};
pub use dispatch::TransactionDispatcher;
pub use error::IndexerError;
pub use handler::{BoundWriter, Writer, WriterParams, WriterRegistry};
pub use indexer::{IndexerConfig, IndexerState};
pub use pool::PoolCache;
pub use source::{
    MemorySourceRegistry, Source, SourceConfig, SourceRegistry, SourceTemplate, TemplateSource,
    TemplateSourceStore,
};
pub use types::{Block, BlockRef, Event, EventsMap, Transaction, TransactionType};
