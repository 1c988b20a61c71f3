//! Writer trait + registry.
//!
//! Writers are the business-logic handlers a source config points at by
//! name. Names are resolved to [`BoundWriter`]s once, when a source or the
//! dispatcher is built, so a typo fails at startup instead of mid-block.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::decoder::ParsedEvent;
use crate::error::IndexerError;
use crate::source::{Source, SourceRegistry};
use crate::types::{BlockRef, Event, Transaction};

/// Everything a writer gets to see for one invocation.
///
/// `sources` lets a writer register new sources (usually via
/// [`SourceRegistry::execute_template`]); they are picked up by the same
/// transaction's dispatch.
///
/// Which optional fields are set depends on the call site:
/// - transaction writer: none
/// - global event writer: `raw_event`, `event_index`
/// - deploy writer: `source`
/// - source event writer: `source`, `raw_event`, `event` (if decoded), `event_index`
#[derive(Clone, Copy)]
pub struct WriterParams<'a> {
    pub block: BlockRef<'a>,
    pub block_number: u64,
    pub tx: &'a Transaction,
    pub sources: &'a dyn SourceRegistry,
    pub source: Option<&'a Source>,
    pub raw_event: Option<&'a Event>,
    pub event: Option<&'a ParsedEvent>,
    pub event_index: Option<usize>,
}

impl<'a> WriterParams<'a> {
    pub fn new(
        block: BlockRef<'a>,
        block_number: u64,
        tx: &'a Transaction,
        sources: &'a dyn SourceRegistry,
    ) -> Self {
        Self {
            block,
            block_number,
            tx,
            sources,
            source: None,
            raw_event: None,
            event: None,
            event_index: None,
        }
    }
}

/// Trait for user-provided writers.
///
/// Writers must tolerate being called twice for the same
/// `(block_number, tx hash, event_index)`: a crash mid-block replays the
/// whole block on restart.
#[async_trait]
pub trait Writer: Send + Sync {
    async fn write(&self, params: WriterParams<'_>) -> Result<(), IndexerError>;
}

/// A writer resolved from its configured name.
#[derive(Clone)]
pub struct BoundWriter {
    name: String,
    writer: Arc<dyn Writer>,
}

impl BoundWriter {
    pub fn new(name: impl Into<String>, writer: Arc<dyn Writer>) -> Self {
        Self {
            name: name.into(),
            writer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the writer. Failures are reported as [`IndexerError::Handler`]
    /// carrying this writer's name.
    pub async fn invoke(&self, params: WriterParams<'_>) -> Result<(), IndexerError> {
        self.writer.write(params).await.map_err(|e| match e {
            e @ IndexerError::Handler { .. } => e,
            other => IndexerError::handler(&self.name, other),
        })
    }
}

impl fmt::Debug for BoundWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoundWriter").field(&self.name).finish()
    }
}

/// Registry of named writers.
#[derive(Default, Clone)]
pub struct WriterRegistry {
    writers: HashMap<String, Arc<dyn Writer>>,
}

impl WriterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a writer under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, writer: Arc<dyn Writer>) -> &mut Self {
        self.writers.insert(name.into(), writer);
        self
    }

    /// Look up a writer by name.
    pub fn resolve(&self, name: &str) -> Result<BoundWriter, IndexerError> {
        self.writers
            .get(name)
            .map(|w| BoundWriter::new(name, w.clone()))
            .ok_or_else(|| IndexerError::UnknownHandler(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.writers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }
}
