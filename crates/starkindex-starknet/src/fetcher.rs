//! Starknet block fetcher.
//!
//! Fetches a block with its transactions and the block's events in
//! parallel, validates the block, and separates "not produced yet" from real
//! failures.

use starkindex_core::error::IndexerError;
use starkindex_core::types::{Block, Event, EventsMap};

use crate::events::EventAggregator;
use crate::rpc::StarknetRpcClient;

/// A confirmed block together with its events.
#[derive(Debug, Clone)]
pub struct FetchedBlock {
    pub block: Block,
    pub events: EventsMap,
}

impl FetchedBlock {
    /// Events of the transaction with `tx_hash`, in emission order.
    pub fn events_for(&self, tx_hash: Option<&str>) -> &[Event] {
        tx_hash
            .and_then(|hash| self.events.get(hash))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Block fetcher wrapping a [`StarknetRpcClient`].
pub struct BlockFetcher<C> {
    client: C,
    events: EventAggregator<C>,
}

impl<C: StarknetRpcClient + Clone> BlockFetcher<C> {
    pub fn new(client: C, events_chunk_size: u64) -> Self {
        Self {
            events: EventAggregator::new(client.clone(), events_chunk_size),
            client,
        }
    }
}

impl<C: StarknetRpcClient> BlockFetcher<C> {
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetch block `block_number` and its events.
    ///
    /// Returns [`IndexerError::BlockNotFound`] when the node has not produced
    /// the block yet; every other failure is returned unchanged.
    pub async fn fetch(&self, block_number: u64) -> Result<FetchedBlock, IndexerError> {
        let fetched = async {
            let (raw, events) = tokio::try_join!(
                self.client.get_block_with_txs(block_number),
                self.events.fetch_events(block_number),
            )?;
            let block = raw.into_full_block(block_number)?;
            Ok::<_, IndexerError>(FetchedBlock { block, events })
        }
        .await;

        fetched.map_err(|err| {
            if is_block_not_found(&err) {
                tracing::info!(block_number, "block not found");
                IndexerError::BlockNotFound { block_number }
            } else {
                tracing::error!(block_number, error = %err, "getting block failed");
                err
            }
        })
    }
}

fn is_block_not_found(err: &IndexerError) -> bool {
    err.is_block_not_found() || err.to_string().contains("Block not found")
}
