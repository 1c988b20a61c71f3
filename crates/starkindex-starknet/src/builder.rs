//! Fluent builder API for creating Starknet indexers.
//!
//! # Example
//!
//! ```rust,no_run
//! use starkindex_starknet::IndexerBuilder;
//! use starkindex_core::source::{SourceConfig, SourceEventConfig};
//!
//! let config = IndexerBuilder::new()
//!     .id("prop-house")
//!     .network_node_url("https://starknet-mainnet.public.blastapi.io/rpc/v0_7")
//!     .start(4_000)
//!     .optimistic_indexing(true)
//!     .source(SourceConfig {
//!         contract: "0x0123".into(),
//!         abi: Some("House".into()),
//!         start: 4_000,
//!         deploy_fn: None,
//!         events: vec![SourceEventConfig {
//!             name: "RoundCreated".into(),
//!             handler: "handleRoundCreated".into(),
//!         }],
//!     })
//!     .build_config();
//! ```

use std::sync::Arc;

use starkindex_core::checkpoint::{CheckpointStore, IndexStateStore};
use starkindex_core::decoder::AbiRegistry;
use starkindex_core::dispatch::TransactionDispatcher;
use starkindex_core::error::IndexerError;
use starkindex_core::handler::WriterRegistry;
use starkindex_core::indexer::IndexerConfig;
use starkindex_core::source::{
    MemorySourceRegistry, SourceConfig, SourceEventConfig, TemplateConfig, TemplateSourceStore,
};

use crate::http::StarknetHttpClient;
use crate::index_loop::IndexLoop;
use crate::rpc::StarknetRpcClient;

/// Fluent builder for `IndexerConfig` and the [`IndexLoop`] around it.
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
        }
    }

    /// Start from an existing config (e.g. one loaded with `IndexerConfig::from_json`).
    pub fn from_config(config: IndexerConfig) -> Self {
        Self { config }
    }

    /// Set the indexer ID (used as the index-state key).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    pub fn network_node_url(mut self, url: impl Into<String>) -> Self {
        self.config.network_node_url = url.into();
        self
    }

    /// Set the first block to index.
    pub fn start(mut self, block: u64) -> Self {
        self.config.start = block;
        self
    }

    /// Set the last block to index (inclusive).
    pub fn to_block(mut self, block: u64) -> Self {
        self.config.to_block = Some(block);
        self
    }

    /// Set the wait between polls for a block that does not exist yet.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the page size for `starknet_getEvents`.
    pub fn events_chunk_size(mut self, size: u64) -> Self {
        self.config.events_chunk_size = size;
        self
    }

    /// Dispatch pending transactions while waiting for the next block.
    pub fn optimistic_indexing(mut self, enabled: bool) -> Self {
        self.config.optimistic_indexing = enabled;
        self
    }

    /// Writer invoked for every transaction.
    pub fn tx_fn(mut self, writer: impl Into<String>) -> Self {
        self.config.tx_fn = Some(writer.into());
        self
    }

    /// Match `event` from any contract and invoke `writer`.
    pub fn global_event(mut self, event: impl Into<String>, writer: impl Into<String>) -> Self {
        self.config.global_events.push(SourceEventConfig {
            name: event.into(),
            handler: writer.into(),
        });
        self
    }

    pub fn source(mut self, source: SourceConfig) -> Self {
        self.config.sources.push(source);
        self
    }

    pub fn template(mut self, name: impl Into<String>, template: TemplateConfig) -> Self {
        self.config.templates.insert(name.into(), template);
        self
    }

    /// Build the `IndexerConfig`.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Validate the config and wire up an [`IndexLoop`].
    ///
    /// Writer names are resolved here, and template sources saved by a
    /// previous run are restored from `store`.
    pub async fn build<C, S>(
        self,
        client: C,
        writers: &WriterRegistry,
        abis: AbiRegistry,
        store: Arc<S>,
    ) -> Result<IndexLoop<C>, IndexerError>
    where
        C: StarknetRpcClient + Clone,
        S: CheckpointStore + IndexStateStore + TemplateSourceStore + 'static,
    {
        let config = self.config;
        config.validate()?;

        let registry =
            MemorySourceRegistry::from_config(&config.sources, &config.templates, writers)?
                .with_store(store.clone());
        registry.restore_template_sources().await?;

        let dispatcher =
            TransactionDispatcher::from_config(&config, writers, Arc::new(registry), store.clone())?
                .with_abis(abis);

        tracing::info!(
            indexer = %config.id,
            sources = config.sources.len(),
            templates = config.templates.len(),
            "indexer built"
        );
        Ok(IndexLoop::new(config, client, Arc::new(dispatcher), store))
    }

    /// [`IndexerBuilder::build`] with an HTTP client for `network_node_url`.
    pub async fn build_http<S>(
        self,
        writers: &WriterRegistry,
        abis: AbiRegistry,
        store: Arc<S>,
    ) -> Result<IndexLoop<Arc<StarknetHttpClient>>, IndexerError>
    where
        S: CheckpointStore + IndexStateStore + TemplateSourceStore + 'static,
    {
        let client = Arc::new(StarknetHttpClient::new(&self.config.network_node_url)?);
        self.build(client, writers, abis, store).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{event, invoke, MockClient, RecordingWriter};
    use starkindex_core::checkpoint::MemoryCheckpointStore;
    use starkindex_core::felt::normalize_address;
    use starkindex_core::source::{SourceRegistry, TemplateSource};

    #[test]
    fn builder_defaults() {
        let cfg = IndexerBuilder::new().build_config();
        assert_eq!(cfg.id, "default");
        assert_eq!(cfg.events_chunk_size, 1000);
        assert_eq!(cfg.poll_interval_ms, 2000);
        assert!(!cfg.optimistic_indexing);
    }

    #[test]
    fn builder_custom() {
        let cfg = IndexerBuilder::new()
            .id("my-indexer")
            .start(50_000)
            .to_block(60_000)
            .events_chunk_size(500)
            .optimistic_indexing(true)
            .tx_fn("handleTx")
            .global_event("RoundRegistered", "handleRoundRegistered")
            .template("Round", TemplateConfig::default())
            .build_config();

        assert_eq!(cfg.id, "my-indexer");
        assert_eq!(cfg.start, 50_000);
        assert_eq!(cfg.to_block, Some(60_000));
        assert_eq!(cfg.events_chunk_size, 500);
        assert_eq!(cfg.tx_fn.as_deref(), Some("handleTx"));
        assert_eq!(cfg.global_events[0].handler, "handleRoundRegistered");
        assert!(cfg.templates.contains_key("Round"));
    }

    #[tokio::test]
    async fn build_rejects_unknown_writer() {
        let result = IndexerBuilder::new()
            .tx_fn("missing")
            .build(
                MockClient::new(),
                &WriterRegistry::new(),
                AbiRegistry::new(),
                Arc::new(MemoryCheckpointStore::new()),
            )
            .await;
        assert!(matches!(result, Err(IndexerError::UnknownHandler(_))));
    }

    #[tokio::test]
    async fn build_restores_template_sources() {
        let store = Arc::new(MemoryCheckpointStore::new());
        store
            .save_template_source(TemplateSource {
                contract_address: normalize_address("0x77").unwrap(),
                template: "Round".into(),
                start_block: 3,
            })
            .await
            .unwrap();

        let client = MockClient::new();
        client.add_block(3, vec![invoke("0xt")], vec![event("0x77", "VoteCast", "0xt")]);

        let writer = RecordingWriter::default();
        let mut writers = WriterRegistry::new();
        writers.register("handleVote", Arc::new(writer.clone()));

        let mut indexer = IndexerBuilder::new()
            .start(3)
            .template(
                "Round",
                TemplateConfig {
                    abi: None,
                    deploy_fn: None,
                    events: vec![SourceEventConfig {
                        name: "VoteCast".into(),
                        handler: "handleVote".into(),
                    }],
                },
            )
            .build(client, &writers, AbiRegistry::new(), store.clone())
            .await
            .unwrap();

        assert_eq!(indexer.dispatcher().sources().current_sources(3).len(), 1);
        indexer.process_block(3).await.unwrap();
        assert_eq!(writer.calls(), vec!["0xt@3:false"]);
        assert!(store.has_checkpoint(&normalize_address("0x77").unwrap(), 3));
    }
}
