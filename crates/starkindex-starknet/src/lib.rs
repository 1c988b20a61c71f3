//! starkindex-starknet — Starknet node access, block fetching, pool
//! reconciliation, and the index loop.

pub mod builder;
pub mod events;
pub mod fetcher;
pub mod http;
pub mod index_loop;
pub mod pool;
pub mod rpc;

#[cfg(test)]
mod testing;

pub use builder::IndexerBuilder;
pub use events::EventAggregator;
pub use fetcher::{BlockFetcher, FetchedBlock};
pub use http::StarknetHttpClient;
pub use index_loop::IndexLoop;
pub use pool::PoolReconciler;
pub use rpc::{EventsFilter, RawBlock, RawTransaction, StarknetRpcClient};
