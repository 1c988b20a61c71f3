//! Best-effort event decoding.
//!
//! Full Cairo ABI decoding lives outside this crate; the engine only needs a
//! seam to call into. Sources name an ABI, the [`AbiRegistry`] maps that name
//! to an [`EventDecoder`], and a failed decode never stops dispatch: the
//! writer still gets the raw event.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::IndexerError;
use crate::felt::{event_selector, normalize_felt};
use crate::types::Event;

/// A decoded event: member name → value.
pub type ParsedEvent = Map<String, Value>;

/// Decodes raw events for one ABI.
pub trait EventDecoder: Send + Sync {
    fn decode(&self, event: &Event) -> Result<ParsedEvent, IndexerError>;
}

/// ABI name → decoder.
#[derive(Default, Clone)]
pub struct AbiRegistry {
    decoders: HashMap<String, Arc<dyn EventDecoder>>,
}

impl AbiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, abi: impl Into<String>, decoder: Arc<dyn EventDecoder>) -> &mut Self {
        self.decoders.insert(abi.into(), decoder);
        self
    }

    pub fn get(&self, abi: &str) -> Option<&Arc<dyn EventDecoder>> {
        self.decoders.get(abi)
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

// ─── Field-list decoder ──────────────────────────────────────────────────────

/// Layout of one event: which members come from `keys[1..]` and which from `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLayout {
    pub name: String,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub data: Vec<String>,
}

/// Decoder for ABIs whose event members are all single felts.
///
/// Covers the common case of flat events; anything with arrays or structs
/// needs a real ABI decoder plugged into the [`AbiRegistry`].
pub struct FieldListDecoder {
    by_selector: HashMap<String, EventLayout>,
}

impl FieldListDecoder {
    pub fn new(layouts: Vec<EventLayout>) -> Self {
        let by_selector = layouts
            .into_iter()
            .map(|l| (event_selector(&l.name), l))
            .collect();
        Self { by_selector }
    }

    /// Build from a JSON array of [`EventLayout`]s.
    pub fn from_json(json: &str) -> Result<Self, IndexerError> {
        let layouts: Vec<EventLayout> =
            serde_json::from_str(json).map_err(|e| IndexerError::Config(e.to_string()))?;
        Ok(Self::new(layouts))
    }
}

impl EventDecoder for FieldListDecoder {
    fn decode(&self, event: &Event) -> Result<ParsedEvent, IndexerError> {
        let selector = event
            .selector()
            .map(normalize_felt)
            .ok_or_else(|| IndexerError::Decode("event has no keys".into()))?;
        let layout = self
            .by_selector
            .get(&selector)
            .ok_or_else(|| IndexerError::Decode(format!("no layout for selector {selector}")))?;

        let key_values = &event.keys[1..];
        if key_values.len() < layout.keys.len() || event.data.len() < layout.data.len() {
            return Err(IndexerError::Decode(format!(
                "event {} expects {} keys and {} data felts, got {} and {}",
                layout.name,
                layout.keys.len(),
                layout.data.len(),
                key_values.len(),
                event.data.len()
            )));
        }

        let mut parsed = ParsedEvent::new();
        for (member, value) in layout.keys.iter().zip(key_values) {
            parsed.insert(member.clone(), Value::String(value.clone()));
        }
        for (member, value) in layout.data.iter().zip(&event.data) {
            parsed.insert(member.clone(), Value::String(value.clone()));
        }
        Ok(parsed)
    }
}
