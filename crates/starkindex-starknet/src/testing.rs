//! In-process node and writer doubles shared by this crate's tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use starkindex_core::error::IndexerError;
use starkindex_core::felt::event_selector;
use starkindex_core::handler::{Writer, WriterParams};
use starkindex_core::types::{Event, EventsPage, Transaction, TransactionReceipt, TransactionType};

use crate::rpc::{EventsFilter, RawBlock, RawTransaction, StarknetRpcClient};

#[derive(Default)]
struct Chain {
    blocks: HashMap<u64, RawBlock>,
    block_events: HashMap<u64, Vec<Event>>,
    failing_blocks: HashMap<u64, String>,
    failing_events: HashMap<u64, String>,
    pages: VecDeque<EventsPage>,
    filters: Vec<EventsFilter>,
    pending: Vec<Transaction>,
    pending_error: Option<String>,
    receipts: HashMap<String, Vec<Event>>,
    failing_receipts: HashSet<String>,
    receipt_calls: usize,
}

/// Scriptable [`StarknetRpcClient`]. Unknown blocks answer "Block not found".
#[derive(Clone, Default)]
pub struct MockClient {
    chain: Arc<Mutex<Chain>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn chain(&self) -> std::sync::MutexGuard<'_, Chain> {
        self.chain.lock().unwrap()
    }

    /// Queue one `starknet_getEvents` page of `count` events for `tx_hash`.
    pub fn push_events_page(&self, count: usize, tx_hash: &str, token: Option<&str>) {
        let events = (0..count).map(|_| event("0x1", "Transfer", tx_hash)).collect();
        self.chain().pages.push_back(EventsPage {
            events,
            continuation_token: token.map(String::from),
        });
    }

    pub fn event_filters(&self) -> Vec<EventsFilter> {
        self.chain().filters.clone()
    }

    pub fn add_block(&self, number: u64, transactions: Vec<Transaction>, events: Vec<Event>) {
        self.insert_raw_block(
            number,
            RawBlock {
                block_number: Some(number),
                block_hash: Some(format!("0xb{number}")),
                parent_hash: format!("0xb{}", number.saturating_sub(1)),
                timestamp: 1_700_000_000 + number,
                transactions: transactions.into_iter().map(RawTransaction::Full).collect(),
            },
            events,
        );
    }

    pub fn insert_raw_block(&self, number: u64, block: RawBlock, events: Vec<Event>) {
        let mut chain = self.chain();
        chain.blocks.insert(number, block);
        chain.block_events.insert(number, events);
    }

    /// Make every request for `number` fail with `message`.
    pub fn fail_block(&self, number: u64, message: &str) {
        self.chain().failing_blocks.insert(number, message.to_string());
    }

    /// Make only `starknet_getEvents` for `number` fail with `message`.
    pub fn fail_events(&self, number: u64, message: &str) {
        self.chain().failing_events.insert(number, message.to_string());
    }

    /// Answer the pending block with a payload that does not decode.
    pub fn fail_pending(&self, message: &str) {
        self.chain().pending_error = Some(message.to_string());
    }

    pub fn set_pending(&self, transactions: Vec<Transaction>) {
        self.chain().pending = transactions;
    }

    pub fn add_receipt(&self, tx_hash: &str, events: Vec<Event>) {
        self.chain().receipts.insert(tx_hash.to_string(), events);
    }

    pub fn fail_receipt(&self, tx_hash: &str) {
        self.chain().failing_receipts.insert(tx_hash.to_string());
    }

    pub fn receipt_calls(&self) -> usize {
        self.chain().receipt_calls
    }

    fn check_block(&self, number: u64) -> Result<(), IndexerError> {
        let chain = self.chain();
        if let Some(message) = chain.failing_blocks.get(&number) {
            return Err(IndexerError::Rpc(message.clone()));
        }
        if !chain.blocks.contains_key(&number) {
            return Err(IndexerError::Rpc("Block not found (24)".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StarknetRpcClient for MockClient {
    async fn chain_id(&self) -> Result<String, IndexerError> {
        Ok("0x534e5f5345504f4c4941".into())
    }

    async fn block_number(&self) -> Result<u64, IndexerError> {
        Ok(self.chain().blocks.keys().copied().max().unwrap_or(0))
    }

    async fn get_block_with_txs(&self, block_number: u64) -> Result<RawBlock, IndexerError> {
        self.check_block(block_number)?;
        Ok(self.chain().blocks[&block_number].clone())
    }

    async fn get_events(&self, filter: &EventsFilter) -> Result<EventsPage, IndexerError> {
        self.chain().filters.push(filter.clone());
        if let Some(page) = self.chain().pages.pop_front() {
            return Ok(page);
        }
        if let Some(message) = self.chain().failing_events.get(&filter.from_block) {
            return Err(IndexerError::Rpc(message.clone()));
        }
        self.check_block(filter.from_block)?;
        Ok(EventsPage {
            events: self.chain().block_events[&filter.from_block].clone(),
            continuation_token: None,
        })
    }

    async fn pending_transactions(&self) -> Result<Vec<Transaction>, IndexerError> {
        let chain = self.chain();
        if let Some(message) = &chain.pending_error {
            return Err(IndexerError::Decode(message.clone()));
        }
        Ok(chain.pending.clone())
    }

    async fn transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<TransactionReceipt, IndexerError> {
        let mut chain = self.chain();
        chain.receipt_calls += 1;
        if chain.failing_receipts.contains(tx_hash) {
            return Err(IndexerError::Rpc(format!("receipt {tx_hash} unavailable")));
        }
        let events = chain.receipts.get(tx_hash).cloned().unwrap_or_default();
        Ok(TransactionReceipt {
            transaction_hash: tx_hash.to_string(),
            events,
        })
    }
}

pub fn invoke(hash: &str) -> Transaction {
    Transaction {
        hash: Some(hash.to_string()),
        tx_type: TransactionType::Invoke,
        contract_address: None,
        sender_address: Some("0xacc".into()),
        calldata: vec![],
    }
}

pub fn event(from: &str, name: &str, tx_hash: &str) -> Event {
    Event {
        from_address: from.to_string(),
        keys: vec![event_selector(name)],
        data: vec![],
        transaction_hash: tx_hash.to_string(),
        block_number: None,
    }
}

/// Records `"<tx hash>@<block number>:<pending>"` per call; fails for hashes in `fail_on`.
#[derive(Clone, Default)]
pub struct RecordingWriter {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub fail_on: Arc<Mutex<HashSet<String>>>,
}

impl RecordingWriter {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_on(&self, tx_hash: &str) {
        self.fail_on.lock().unwrap().insert(tx_hash.to_string());
    }
}

#[async_trait]
impl Writer for RecordingWriter {
    async fn write(&self, p: WriterParams<'_>) -> Result<(), IndexerError> {
        let hash = p.tx.hash.clone().unwrap_or_default();
        if self.fail_on.lock().unwrap().contains(&hash) {
            return Err(IndexerError::handler("record", format!("refusing {hash}")));
        }
        self.calls
            .lock()
            .unwrap()
            .push(format!("{hash}@{}:{}", p.block_number, p.block.is_pending()));
        Ok(())
    }
}
