//! Transaction dispatch — matches one transaction against global handlers and
//! tracked sources and invokes the bound writers.
//!
//! Sources are evaluated from a worklist rather than a fixed snapshot: after
//! each source is processed the registry is read again and any source not
//! seen yet is queued. A writer that registers a factory child while handling
//! an early event therefore still gets the child's handlers run for later
//! events of the same transaction.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::checkpoint::{CheckpointStore, SourceCheckpoint};
use crate::decoder::{AbiRegistry, ParsedEvent};
use crate::error::IndexerError;
use crate::felt::{event_selector, normalize_address, normalize_felt};
use crate::handler::{BoundWriter, WriterParams, WriterRegistry};
use crate::indexer::IndexerConfig;
use crate::source::{Source, SourceRegistry};
use crate::types::{BlockRef, Event, Transaction};

/// A writer matched by event selector alone.
#[derive(Debug, Clone)]
pub struct GlobalEventHandler {
    pub name: String,
    pub handler: BoundWriter,
}

/// Dispatches transactions (confirmed or pending) to writers.
pub struct TransactionDispatcher {
    tx_writer: Option<BoundWriter>,
    /// Keyed by normalised selector.
    global_events: HashMap<String, GlobalEventHandler>,
    sources: Arc<dyn SourceRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
    abis: AbiRegistry,
}

impl TransactionDispatcher {
    pub fn new(sources: Arc<dyn SourceRegistry>, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            tx_writer: None,
            global_events: HashMap::new(),
            sources,
            checkpoints,
            abis: AbiRegistry::new(),
        }
    }

    /// Build from config, resolving `tx_fn` and `global_events` against `writers`.
    pub fn from_config(
        config: &IndexerConfig,
        writers: &WriterRegistry,
        sources: Arc<dyn SourceRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self, IndexerError> {
        let mut dispatcher = Self::new(sources, checkpoints);
        if let Some(name) = &config.tx_fn {
            dispatcher = dispatcher.with_tx_writer(writers.resolve(name)?);
        }
        for global in &config.global_events {
            dispatcher = dispatcher.with_global_event(&global.name, writers.resolve(&global.handler)?);
        }
        Ok(dispatcher)
    }

    /// Writer invoked once per transaction, before anything else.
    pub fn with_tx_writer(mut self, writer: BoundWriter) -> Self {
        self.tx_writer = Some(writer);
        self
    }

    pub fn with_global_event(mut self, event_name: &str, writer: BoundWriter) -> Self {
        self.global_events.insert(
            event_selector(event_name),
            GlobalEventHandler {
                name: event_name.to_string(),
                handler: writer,
            },
        );
        self
    }

    pub fn with_abis(mut self, abis: AbiRegistry) -> Self {
        self.abis = abis;
        self
    }

    pub fn sources(&self) -> &Arc<dyn SourceRegistry> {
        &self.sources
    }

    /// Dispatch one transaction.
    ///
    /// `events` are the transaction's events in emission order. A writer
    /// error aborts the transaction and is returned as-is; checkpoints already
    /// written for earlier sources stay (they are idempotent facts).
    pub async fn dispatch(
        &self,
        block: BlockRef<'_>,
        block_number: u64,
        tx_index: usize,
        tx: &Transaction,
        events: &[Event],
    ) -> Result<(), IndexerError> {
        tracing::debug!(
            block_number,
            tx_index,
            tx_hash = tx.hash.as_deref().unwrap_or_default(),
            pending = block.is_pending(),
            "handling transaction"
        );

        let base = WriterParams::new(block, block_number, tx, self.sources.as_ref());

        if let Some(writer) = &self.tx_writer {
            writer.invoke(base).await?;
        }

        let selectors: Vec<Option<String>> = events
            .iter()
            .map(|e| e.selector().map(normalize_felt))
            .collect();

        if !self.global_events.is_empty() {
            for (event_index, event) in events.iter().enumerate() {
                let Some(global) = selectors[event_index]
                    .as_ref()
                    .and_then(|s| self.global_events.get(s))
                else {
                    continue;
                };
                tracing::info!(
                    contract = %event.from_address,
                    event = %global.name,
                    handler = global.handler.name(),
                    "found contract event"
                );
                global
                    .handler
                    .invoke(WriterParams {
                        raw_event: Some(event),
                        event_index: Some(event_index),
                        ..base
                    })
                    .await?;
            }
        }

        let initial = self.sources.current_sources(block_number);
        if initial.is_empty() {
            return Ok(());
        }

        let event_addresses = events
            .iter()
            .map(|e| normalize_address(&e.from_address))
            .collect::<Result<Vec<_>, _>>()?;
        let deployed = tx.deployed_address().map(normalize_address).transpose()?;

        // Addresses of every source already queued for this transaction.
        let mut seen: HashSet<String> = initial.iter().map(|s| s.contract().to_string()).collect();
        let mut worklist: VecDeque<Arc<Source>> = initial.into();

        while let Some(source) = worklist.pop_front() {
            let mut found_activity = false;

            if let (Some(deployed), Some(handler)) = (&deployed, source.deploy_handler()) {
                if deployed == source.contract() {
                    found_activity = true;
                    tracing::info!(
                        contract = source.contract(),
                        tx_type = ?tx.tx_type,
                        handler = handler.name(),
                        "found deployment transaction"
                    );
                    handler
                        .invoke(WriterParams {
                            source: Some(source.as_ref()),
                            ..base
                        })
                        .await?;
                }
            }

            for (event_index, event) in events.iter().enumerate() {
                if event_addresses[event_index] != source.contract() {
                    continue;
                }
                let Some(selector) = &selectors[event_index] else {
                    continue;
                };
                for source_event in source.events() {
                    if &source_event.selector != selector {
                        continue;
                    }
                    found_activity = true;
                    tracing::info!(
                        contract = source.contract(),
                        event = %source_event.name,
                        handler = source_event.handler.name(),
                        "found contract event"
                    );

                    let parsed = self.decode(&source, event);
                    source_event
                        .handler
                        .invoke(WriterParams {
                            source: Some(source.as_ref()),
                            raw_event: Some(event),
                            event: parsed.as_ref(),
                            event_index: Some(event_index),
                            ..base
                        })
                        .await?;
                }
            }

            if found_activity {
                self.checkpoints
                    .insert_checkpoints(&[SourceCheckpoint {
                        contract_address: source.contract().to_string(),
                        block_number,
                    }])
                    .await?;
            }

            for next in self.sources.current_sources(block_number) {
                if seen.insert(next.contract().to_string()) {
                    tracing::debug!(contract = next.contract(), "queued newly registered source");
                    worklist.push_back(next);
                }
            }
        }

        tracing::debug!(block_number, tx_index, "handling transaction done");
        Ok(())
    }

    /// Decode `event` with the source's ABI, if one is known. Never fails.
    fn decode(&self, source: &Source, event: &Event) -> Option<ParsedEvent> {
        let abi = source.abi()?;
        let decoder = self.abis.get(abi)?;
        match decoder.decode(event) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                tracing::warn!(
                    contract = source.contract(),
                    abi,
                    error = %err,
                    "failed to parse event"
                );
                None
            }
        }
    }
}
