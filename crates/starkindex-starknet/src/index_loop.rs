//! The main index loop.
//!
//! One block at a time, strictly in order:
//!   - fetch the block and its events
//!   - dispatch every transaction with the confirmed block
//!   - forget the block's hashes in the pool cache
//!   - commit `last_indexed_block`
//!
//! When the next block does not exist yet the loop optionally dispatches the
//! pending pool, sleeps `poll_interval_ms`, and retries the same block.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use starkindex_core::checkpoint::{CheckpointManager, IndexStateStore};
use starkindex_core::cursor::Cursor;
use starkindex_core::dispatch::TransactionDispatcher;
use starkindex_core::error::IndexerError;
use starkindex_core::indexer::{IndexerConfig, IndexerState};
use starkindex_core::pool::PoolCache;
use starkindex_core::types::BlockRef;

use crate::fetcher::BlockFetcher;
use crate::pool::PoolReconciler;
use crate::rpc::StarknetRpcClient;

/// The core index loop implementation.
pub struct IndexLoop<C> {
    config: IndexerConfig,
    fetcher: BlockFetcher<C>,
    pool: Arc<PoolReconciler<C>>,
    dispatcher: Arc<TransactionDispatcher>,
    checkpoint: CheckpointManager,
    cursor: Cursor,
    state: IndexerState,
}

impl<C: StarknetRpcClient + Clone> IndexLoop<C> {
    pub fn new(
        config: IndexerConfig,
        client: C,
        dispatcher: Arc<TransactionDispatcher>,
        state_store: Arc<dyn IndexStateStore>,
    ) -> Self {
        let pool = PoolReconciler::new(
            client.clone(),
            dispatcher.clone(),
            Arc::new(PoolCache::new()),
        );
        Self {
            fetcher: BlockFetcher::new(client, config.events_chunk_size),
            pool: Arc::new(pool),
            dispatcher,
            checkpoint: CheckpointManager::new(state_store, config.id.clone()),
            cursor: Cursor::new(config.start, None),
            state: IndexerState::Idle,
            config,
        }
    }
}

impl<C: StarknetRpcClient> IndexLoop<C> {
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn pool_cache(&self) -> &Arc<PoolCache> {
        self.pool.cache()
    }

    /// The pool reconciler, for hosts that want to run it on their own schedule.
    pub fn pool(&self) -> Arc<PoolReconciler<C>> {
        self.pool.clone()
    }

    pub fn dispatcher(&self) -> &Arc<TransactionDispatcher> {
        &self.dispatcher
    }

    /// `starknet_<chain id>`, e.g. `starknet_0x534e5f4d41494e`.
    pub async fn network_identifier(&self) -> Result<String, IndexerError> {
        let chain_id = self.fetcher.client().chain_id().await?;
        Ok(format!("starknet_{chain_id}"))
    }

    /// Load the saved index state. Returns the next block to process.
    pub async fn resume(&mut self) -> Result<u64, IndexerError> {
        self.cursor = self.checkpoint.load_cursor(self.config.start).await?;
        Ok(self.cursor.next_block())
    }

    /// Fully process `block_number` and return the next block number.
    ///
    /// `block_number` must be the cursor's next block. On error nothing is
    /// committed; the state goes back to `Idle` for a missing block and to
    /// `Error` for anything else.
    pub async fn process_block(&mut self, block_number: u64) -> Result<u64, IndexerError> {
        let result = self.process_block_inner(block_number).await;
        self.state = match &result {
            Err(err) if err.is_fatal() => IndexerState::Error,
            _ => IndexerState::Idle,
        };
        result
    }

    async fn process_block_inner(&mut self, block_number: u64) -> Result<u64, IndexerError> {
        self.cursor.check_advance(block_number)?;

        self.state = IndexerState::FetchingBlock;
        let fetched = self.fetcher.fetch(block_number).await?;

        self.state = IndexerState::Dispatching;
        tracing::info!(
            block_number,
            txs = fetched.block.transactions.len(),
            "handling block"
        );
        for (tx_index, tx) in fetched.block.transactions.iter().enumerate() {
            self.dispatcher
                .dispatch(
                    BlockRef::Confirmed(&fetched.block),
                    block_number,
                    tx_index,
                    tx,
                    fetched.events_for(tx.hash.as_deref()),
                )
                .await?;
        }
        let cleared = self
            .pool
            .cache()
            .clear_confirmed(fetched.block.transaction_hashes());
        tracing::debug!(block_number, cleared, "handling block done");

        self.state = IndexerState::Committing;
        self.checkpoint.commit(&mut self.cursor, block_number).await?;

        Ok(self.cursor.next_block())
    }

    /// Run until `to_block` is indexed, `shutdown` flips to `true`, or a
    /// non-retryable error occurs.
    ///
    /// The shutdown flag is only looked at between blocks.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), IndexerError> {
        let mut next = self.resume().await?;
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        tracing::info!(
            indexer = %self.config.id,
            next_block = next,
            to_block = ?self.config.to_block,
            optimistic = self.config.optimistic_indexing,
            "starting index loop"
        );

        loop {
            if *shutdown.borrow() {
                tracing::info!(next_block = next, "shutdown requested");
                self.state = IndexerState::Stopped;
                return Ok(());
            }
            if self.config.to_block.is_some_and(|to| next > to) {
                tracing::info!(last_indexed_block = next - 1, "reached target block");
                self.state = IndexerState::Stopped;
                return Ok(());
            }

            match self.process_block(next).await {
                Ok(n) => next = n,
                Err(err) if err.is_block_not_found() => {
                    if self.config.optimistic_indexing {
                        self.reconcile_pool(next).await?;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        changed = shutdown.changed() => {
                            // sender gone: nobody can ask us to stop, keep polling
                            if changed.is_err() {
                                tokio::time::sleep(poll_interval).await;
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::error!(block_number = next, error = %err, "index loop stopped");
                    return Err(err);
                }
            }
        }
    }

    /// Pool pass while waiting for `block_number`. Node errors, including
    /// pending payloads that do not decode, are logged and retried on the
    /// next wait; writer errors stop the loop.
    async fn reconcile_pool(&mut self, block_number: u64) -> Result<(), IndexerError> {
        match self.pool.reconcile(block_number).await {
            Ok(_) => Ok(()),
            Err(err @ (IndexerError::Rpc(_) | IndexerError::Decode(_))) => {
                tracing::warn!(block_number, error = %err, "handling pool failed");
                Ok(())
            }
            Err(err) => {
                tracing::error!(block_number, error = %err, "handling pool failed");
                self.state = IndexerState::Error;
                Err(err)
            }
        }
    }
}
