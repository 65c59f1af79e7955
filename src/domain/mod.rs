//! Domain models for taskgraph
//!
//! Contains the reconciliation engine without any I/O concerns.

mod id;
mod item;
mod edge;
mod graph;
mod registry;
mod reconciler;

pub use id::{EdgeId, IdError, ItemId, GENERATED_ID_LEN};
pub use item::Item;
pub use edge::{EdgeError, TransitionEdge};
pub use graph::{GraphError, Hop, Node, Plan, StateGraph};
pub use registry::{ItemRegistry, RegistryError};
pub use reconciler::{
    ItemOutcome, ItemReport, PassReport, ReconcileError, Reconciler, ReconcilerConfig,
};
