//! Machine files
//!
//! A machine file is a TOML description of a whole system: its states,
//! its edges and the items to drive. Edge handlers are scripted: each
//! invocation returns the next entry of `outcomes` (the last one repeats)
//! and records the edge ID in the item's trace.
//!
//! ```toml
//! states = ["empty", "add", "print", "done"]
//!
//! [reconciler]
//! max_replans = 4
//!
//! [[edges]]
//! id = "fill"
//! from = ["empty"]
//! to = ["add"]
//!
//! [[items]]
//! id = "counter"
//! current = "empty"
//! desired = "done"
//! ```

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::ReconcilerSettings;
use crate::domain::{
    EdgeId, GraphError, IdError, Item, ItemId, Reconciler, ReconcilerConfig, RegistryError,
    TransitionEdge,
};

/// Payload of machine-file items: the IDs of the edges fired, in order
pub type Trace = Vec<String>;

#[derive(Debug, Error, PartialEq)]
pub enum MachineError {
    #[error("Failed to parse machine file: {0}")]
    Parse(String),

    #[error("Invalid ID: {0}")]
    Id(#[from] IdError),

    #[error("Edge {0} has neither end states nor outcomes")]
    NoOutcome(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// One `[[edges]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeSpec {
    pub id: Option<String>,
    pub from: Vec<String>,
    pub to: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    /// Scripted results; defaults to the first `to` state
    #[serde(default)]
    pub outcomes: Vec<String>,
}

/// One `[[items]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemSpec {
    pub id: Option<String>,
    pub current: String,
    pub desired: String,
}

/// A parsed machine file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineFile {
    pub states: Vec<String>,
    #[serde(default)]
    pub reconciler: ReconcilerSettings,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    #[serde(default)]
    pub items: Vec<ItemSpec>,
}

impl MachineFile {
    /// Reads and parses a machine file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read machine file: {}", path.display()))?;

        Self::from_toml(&content).with_context(|| format!("Invalid machine file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self, MachineError> {
        toml::from_str(content).map_err(|e| MachineError::Parse(e.to_string()))
    }

    /// Builds a reconciler holding this machine's states, edges and items
    ///
    /// Stops at the first structural error. Outcomes are not checked
    /// against the declared end states here; a bad outcome surfaces as an
    /// invalid transition output when the edge fires.
    pub fn build(&self, config: ReconcilerConfig) -> Result<Reconciler<Trace>, MachineError> {
        let mut reconciler = Reconciler::with_config(config);
        reconciler.add_states(self.states.iter().cloned());

        for spec in &self.edges {
            reconciler.add_edge(scripted_edge(spec)?)?;
        }

        for spec in &self.items {
            let item = match &spec.id {
                Some(id) => Item::with_id(ItemId::new(id)?, &spec.current, &spec.desired, Trace::new()),
                None => Item::new(&spec.current, &spec.desired, Trace::new()),
            };
            reconciler.add_item(item)?;
        }

        Ok(reconciler)
    }
}

fn scripted_edge(spec: &EdgeSpec) -> Result<TransitionEdge<Trace>, MachineError> {
    let id = match &spec.id {
        Some(id) => EdgeId::new(id)?,
        None => EdgeId::generate(),
    };

    let outcomes: Vec<String> = if spec.outcomes.is_empty() {
        spec.to.iter().take(1).cloned().collect()
    } else {
        spec.outcomes.clone()
    };
    if outcomes.is_empty() {
        return Err(MachineError::NoOutcome(id.to_string()));
    }

    let calls = AtomicUsize::new(0);
    let name = id.to_string();
    let handler = move |item: &mut Item<Trace>| {
        let n = calls.fetch_add(1, Ordering::Relaxed);
        item.payload_mut().push(name.clone());
        outcomes[n.min(outcomes.len() - 1)].clone()
    };
    let edge = TransitionEdge::new(spec.from.iter().cloned(), spec.to.iter().cloned(), handler);

    Ok(edge.with_id(id).with_error_states(spec.errors.iter().cloned()))
}
