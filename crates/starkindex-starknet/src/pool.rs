//! Pending-pool reconciliation.
//!
//! Dispatches transactions from the node's pending block before they are
//! confirmed. Each pending transaction is dispatched at most once while it
//! stays in the [`PoolCache`]; the index loop clears confirmed hashes so the
//! confirmed copy is dispatched again with its block, and every pass evicts
//! hashes that have left the pool.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;

use starkindex_core::dispatch::TransactionDispatcher;
use starkindex_core::error::IndexerError;
use starkindex_core::pool::PoolCache;
use starkindex_core::types::{BlockRef, Event, EventsMap, Transaction};

use crate::rpc::StarknetRpcClient;

pub struct PoolReconciler<C> {
    client: C,
    dispatcher: Arc<TransactionDispatcher>,
    cache: Arc<PoolCache>,
}

impl<C: StarknetRpcClient> PoolReconciler<C> {
    pub fn new(client: C, dispatcher: Arc<TransactionDispatcher>, cache: Arc<PoolCache>) -> Self {
        Self {
            client,
            dispatcher,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<PoolCache> {
        &self.cache
    }

    /// Dispatch every pending transaction not dispatched yet, as if it were
    /// in `block_number`. Returns how many transactions were dispatched.
    ///
    /// A failed receipt fetch only skips that transaction. A writer failure
    /// stops the pass; the failing transaction stays uncached.
    pub async fn reconcile(&self, block_number: u64) -> Result<usize, IndexerError> {
        let pending = self.client.pending_transactions().await?;

        let pending_hashes: HashSet<&str> = pending
            .iter()
            .filter_map(|tx| tx.hash.as_deref())
            .collect();
        let evicted = self.cache.retain_pending(&pending_hashes);
        if evicted > 0 {
            tracing::debug!(block_number, evicted, "evicted transactions that left the pool");
        }

        let receipts = join_all(pending.iter().map(|tx| async move {
            let hash = tx.hash.as_deref()?;
            match self.client.transaction_receipt(hash).await {
                Ok(receipt) => Some(receipt),
                Err(err) => {
                    tracing::warn!(tx_hash = hash, error = %err, "getting transaction receipt failed");
                    None
                }
            }
        }))
        .await;

        let mut events = EventsMap::new();
        let mut with_receipts: Vec<&Transaction> = Vec::new();
        for (tx, receipt) in pending.iter().zip(receipts) {
            let Some(receipt) = receipt else { continue };
            let hash = receipt.transaction_hash;
            let tx_events: Vec<Event> = receipt
                .events
                .into_iter()
                .map(|mut e| {
                    if e.transaction_hash.is_empty() {
                        e.transaction_hash = hash.clone();
                    }
                    e
                })
                .collect();
            events.insert(hash, tx_events);
            with_receipts.push(tx);
        }

        let to_dispatch: Vec<&Transaction> = with_receipts
            .into_iter()
            .filter(|tx| tx.hash.as_deref().is_some_and(|h| !self.cache.contains(h)))
            .collect();

        tracing::info!(
            block_number,
            pending = pending.len(),
            new = to_dispatch.len(),
            "handling pool"
        );

        for (tx_index, tx) in to_dispatch.iter().enumerate() {
            let Some(hash) = tx.hash.as_deref() else { continue };
            let tx_events = events.get(hash).map(Vec::as_slice).unwrap_or_default();
            self.dispatcher
                .dispatch(BlockRef::Pending, block_number, tx_index, tx, tx_events)
                .await?;
            self.cache.mark_processed(hash);
        }

        tracing::info!(block_number, dispatched = to_dispatch.len(), "handling pool done");
        Ok(to_dispatch.len())
    }
}
