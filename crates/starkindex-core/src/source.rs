//! Sources, templates, and the source registry.
//!
//! A source is a contract address plus the writers bound to it. Sources come
//! from config at startup or are created at runtime from a named template,
//! typically by a writer reacting to a factory's "child deployed" event.
//! The registry only ever grows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::IndexerError;
use crate::felt::{event_selector, normalize_address};
use crate::handler::{BoundWriter, WriterRegistry};

// ─── Config ──────────────────────────────────────────────────────────────────

/// `{ "name": "ProposalCreated", "fn": "handleProposalCreated" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEventConfig {
    pub name: String,
    #[serde(rename = "fn")]
    pub handler: String,
}

/// A source as it appears in the indexer config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub contract: String,
    #[serde(default)]
    pub abi: Option<String>,
    /// First block at which the source is active.
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub deploy_fn: Option<String>,
    #[serde(default)]
    pub events: Vec<SourceEventConfig>,
}

/// A source blueprint without an address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default)]
    pub abi: Option<String>,
    #[serde(default)]
    pub deploy_fn: Option<String>,
    #[serde(default)]
    pub events: Vec<SourceEventConfig>,
}

// ─── Resolved sources ────────────────────────────────────────────────────────

/// An event a source listens to, with its selector precomputed.
#[derive(Debug, Clone)]
pub struct SourceEvent {
    pub name: String,
    pub selector: String,
    pub handler: BoundWriter,
}

/// A tracked contract with resolved writers.
#[derive(Debug, Clone)]
pub struct Source {
    contract: String,
    abi: Option<String>,
    start: u64,
    deploy_handler: Option<BoundWriter>,
    events: Vec<SourceEvent>,
}

impl Source {
    /// Build a source from config, resolving writer names.
    pub fn from_config(config: &SourceConfig, writers: &WriterRegistry) -> Result<Self, IndexerError> {
        let handlers = ResolvedHandlers::resolve(
            config.deploy_fn.as_deref(),
            &config.events,
            writers,
        )?;
        Ok(Self {
            contract: normalize_address(&config.contract)?,
            abi: config.abi.clone(),
            start: config.start,
            deploy_handler: handlers.deploy,
            events: handlers.events,
        })
    }

    /// Normalised contract address.
    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn abi(&self) -> Option<&str> {
        self.abi.as_deref()
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn deploy_handler(&self) -> Option<&BoundWriter> {
        self.deploy_handler.as_ref()
    }

    pub fn events(&self) -> &[SourceEvent] {
        &self.events
    }

    /// Returns `true` if the source is active at `block_number`.
    pub fn is_active_at(&self, block_number: u64) -> bool {
        self.start <= block_number
    }
}

struct ResolvedHandlers {
    deploy: Option<BoundWriter>,
    events: Vec<SourceEvent>,
}

impl ResolvedHandlers {
    fn resolve(
        deploy_fn: Option<&str>,
        events: &[SourceEventConfig],
        writers: &WriterRegistry,
    ) -> Result<Self, IndexerError> {
        let deploy = deploy_fn.map(|name| writers.resolve(name)).transpose()?;
        let events = events
            .iter()
            .map(|e| {
                Ok(SourceEvent {
                    name: e.name.clone(),
                    selector: event_selector(&e.name),
                    handler: writers.resolve(&e.handler)?,
                })
            })
            .collect::<Result<Vec<_>, IndexerError>>()?;
        Ok(Self { deploy, events })
    }
}

/// A named template with resolved writers.
#[derive(Debug, Clone)]
pub struct SourceTemplate {
    name: String,
    abi: Option<String>,
    deploy_handler: Option<BoundWriter>,
    events: Vec<SourceEvent>,
}

impl SourceTemplate {
    pub fn from_config(
        name: impl Into<String>,
        config: &TemplateConfig,
        writers: &WriterRegistry,
    ) -> Result<Self, IndexerError> {
        let handlers =
            ResolvedHandlers::resolve(config.deploy_fn.as_deref(), &config.events, writers)?;
        Ok(Self {
            name: name.into(),
            abi: config.abi.clone(),
            deploy_handler: handlers.deploy,
            events: handlers.events,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a source for `contract` from this template.
    pub fn instantiate(&self, contract: &str, start: u64) -> Result<Source, IndexerError> {
        Ok(Source {
            contract: normalize_address(contract)?,
            abi: self.abi.clone(),
            start,
            deploy_handler: self.deploy_handler.clone(),
            events: self.events.clone(),
        })
    }
}

// ─── Persistence of runtime-created sources ──────────────────────────────────

/// A source created from a template at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSource {
    pub contract_address: String,
    pub template: String,
    pub start_block: u64,
}

/// Persists template-created sources so the registry can be rebuilt on restart.
#[async_trait]
pub trait TemplateSourceStore: Send + Sync {
    async fn save_template_source(&self, source: TemplateSource) -> Result<(), IndexerError>;

    /// All saved sources, in the order they were saved.
    async fn load_template_sources(&self) -> Result<Vec<TemplateSource>, IndexerError>;
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Read/append access to the set of tracked sources.
#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// Every source active at `block_number`, in registration order.
    fn current_sources(&self, block_number: u64) -> Vec<Arc<Source>>;

    /// Add a source. Returns `false` if its address was already registered.
    async fn register(&self, source: Source) -> Result<bool, IndexerError>;

    /// Instantiate template `template` at `contract` and register it.
    async fn execute_template(
        &self,
        template: &str,
        contract: &str,
        start: u64,
    ) -> Result<bool, IndexerError>;
}

/// In-process registry, optionally backed by a [`TemplateSourceStore`].
pub struct MemorySourceRegistry {
    sources: RwLock<Vec<Arc<Source>>>,
    templates: HashMap<String, SourceTemplate>,
    store: Option<Arc<dyn TemplateSourceStore>>,
}

impl MemorySourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            templates: HashMap::new(),
            store: None,
        }
    }

    /// Build from config: resolves every source and template against `writers`.
    pub fn from_config(
        sources: &[SourceConfig],
        templates: &HashMap<String, TemplateConfig>,
        writers: &WriterRegistry,
    ) -> Result<Self, IndexerError> {
        let mut registry = Self::new();
        for (name, config) in templates {
            registry.add_template(SourceTemplate::from_config(name, config, writers)?);
        }
        for config in sources {
            registry.insert(Source::from_config(config, writers)?);
        }
        Ok(registry)
    }

    pub fn with_store(mut self, store: Arc<dyn TemplateSourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn add_template(&mut self, template: SourceTemplate) {
        self.templates.insert(template.name().to_string(), template);
    }

    /// Re-create template sources saved by a previous run.
    pub async fn restore_template_sources(&self) -> Result<usize, IndexerError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let mut restored = 0;
        for saved in store.load_template_sources().await? {
            let source = self
                .template(&saved.template)?
                .instantiate(&saved.contract_address, saved.start_block)?;
            if self.insert(source) {
                restored += 1;
            }
        }
        tracing::info!(restored, "restored template sources");
        Ok(restored)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn template(&self, name: &str) -> Result<&SourceTemplate, IndexerError> {
        self.templates
            .get(name)
            .ok_or_else(|| IndexerError::UnknownTemplate(name.to_string()))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<Source>>> {
        self.sources.read().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(&self, source: Source) -> bool {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        if sources.iter().any(|s| s.contract == source.contract) {
            return false;
        }
        sources.push(Arc::new(source));
        true
    }
}

impl Default for MemorySourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceRegistry for MemorySourceRegistry {
    fn current_sources(&self, block_number: u64) -> Vec<Arc<Source>> {
        self.read()
            .iter()
            .filter(|s| s.is_active_at(block_number))
            .cloned()
            .collect()
    }

    async fn register(&self, source: Source) -> Result<bool, IndexerError> {
        let contract = source.contract.clone();
        let added = self.insert(source);
        if added {
            tracing::info!(contract = %contract, "source registered");
        }
        Ok(added)
    }

    async fn execute_template(
        &self,
        template: &str,
        contract: &str,
        start: u64,
    ) -> Result<bool, IndexerError> {
        let source = self.template(template)?.instantiate(contract, start)?;
        let contract_address = source.contract.clone();
        if !self.insert(source) {
            return Ok(false);
        }
        tracing::info!(contract = %contract_address, template, start, "template source registered");

        if let Some(store) = &self.store {
            store
                .save_template_source(TemplateSource {
                    contract_address,
                    template: template.to_string(),
                    start_block: start,
                })
                .await?;
        }
        Ok(true)
    }
}
