//! taskgraph - a desired-state reconciliation engine
//!
//! Items carry a current and a desired state. A [`Reconciler`] plans the
//! shortest route between the two through a graph of declared states and
//! transition edges, fires the edges one by one, and replans whenever a
//! transition lands somewhere other than planned.
//!
//! ```
//! use taskgraph::{Item, Reconciler, TransitionEdge};
//!
//! let mut reconciler: Reconciler<u32> = Reconciler::new();
//! reconciler.add_states(["empty", "add", "done"]);
//! reconciler.add_edges([
//!     TransitionEdge::new(["empty"], ["add"], |_: &mut Item<u32>| "add"),
//!     TransitionEdge::new(["add"], ["done"], |item: &mut Item<u32>| {
//!         *item.payload_mut() += 1;
//!         "done"
//!     }),
//! ])?;
//! let id = reconciler.add_item(Item::new("empty", "done", 0))?;
//!
//! reconciler.fix_items();
//! assert_eq!(reconciler.get_item_curr_state(&id)?, "done");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod domain;
pub mod storage;
pub mod cli;

pub use domain::{
    EdgeId, Item, ItemId, PassReport, Plan, ReconcileError, Reconciler, ReconcilerConfig,
    StateGraph, TransitionEdge,
};
