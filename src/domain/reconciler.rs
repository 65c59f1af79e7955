//! Reconciliation passes
//!
//! A pass takes a snapshot of the discrepant items and drives each one
//! towards its desired state: plan the shortest path, fire its edges one
//! at a time, and replan whenever an edge reports a state other than the
//! planned one. Failures are per item; a pass as a whole never fails.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::edge::{EdgeError, TransitionEdge};
use super::graph::{GraphError, Plan, StateGraph};
use super::id::ItemId;
use super::item::Item;
use super::registry::{ItemRegistry, RegistryError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconcileError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Edge(#[from] EdgeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Item {item} stalled after {replans} replans")]
    Stalled { item: ItemId, replans: u32 },
}

impl ReconcileError {
    /// Returns true if the item had no path to its desired state
    pub fn is_no_path(&self) -> bool {
        matches!(self, ReconcileError::Graph(GraphError::NoPath { .. }))
    }

    /// Returns true if a handler reported an undeclared state
    pub fn is_invalid_output(&self) -> bool {
        matches!(self, ReconcileError::Edge(EdgeError::InvalidTransitionOutput { .. }))
    }

    pub fn is_stalled(&self) -> bool {
        matches!(self, ReconcileError::Stalled { .. })
    }
}

/// Tunables for reconciliation passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Replans allowed per item per pass before it is reported as stalled
    pub max_replans: u32,

    /// Worker threads for a pass; 1 runs the pass on the calling thread
    pub workers: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_replans: 8,
            workers: 1,
        }
    }
}

/// How one item's reconciliation ended
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Converged,
    Failed(ReconcileError),
}

/// What happened to one item during a pass
#[derive(Debug, Clone, PartialEq)]
pub struct ItemReport {
    pub id: ItemId,
    pub outcome: ItemOutcome,
    /// Handler invocations that passed validation
    pub transitions: usize,
    /// Transitions whose outcome differed from the plan
    pub deviations: usize,
}

impl ItemReport {
    pub fn is_converged(&self) -> bool {
        self.outcome == ItemOutcome::Converged
    }

    pub fn error(&self) -> Option<&ReconcileError> {
        match &self.outcome {
            ItemOutcome::Converged => None,
            ItemOutcome::Failed(err) => Some(err),
        }
    }
}

/// Result of one reconciliation pass, items in ID order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub items: Vec<ItemReport>,
}

impl PassReport {
    /// IDs of items that reached their desired state
    pub fn converged(&self) -> Vec<&ItemId> {
        self.items
            .iter()
            .filter(|r| r.is_converged())
            .map(|r| &r.id)
            .collect()
    }

    /// Items abandoned during the pass, with the reason
    pub fn failed(&self) -> Vec<(&ItemId, &ReconcileError)> {
        self.items
            .iter()
            .filter_map(|r| r.error().map(|err| (&r.id, err)))
            .collect()
    }

    pub fn transitions(&self) -> usize {
        self.items.iter().map(|r| r.transitions).sum()
    }

    pub fn deviations(&self) -> usize {
        self.items.iter().map(|r| r.deviations).sum()
    }

    /// Returns the report for a given item, if it was part of the pass
    pub fn item(&self, id: &ItemId) -> Option<&ItemReport> {
        self.items.iter().find(|r| &r.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[derive(Debug, Default)]
struct Progress {
    transitions: usize,
    deviations: usize,
}

/// Drives a single item to its desired state
///
/// The item's current state is updated after every validated transition.
/// Stops once the item sits on its target, never firing an edge from there.
fn drive_item<T>(
    graph: &StateGraph<T>,
    item: &mut Item<T>,
    max_replans: u32,
    progress: &mut Progress,
) -> Result<(), ReconcileError> {
    let target = item.desired_state().to_string();
    let mut replans = 0u32;

    'plan: loop {
        let plan = graph.shortest_path(item.curr_state(), &target)?;
        debug!("item {}: plan {}", item.id(), plan);

        for hop in plan.hops() {
            // plans only name edges of the graph they came from
            let edge: &TransitionEdge<T> = graph.edge(hop.edge).ok_or_else(|| GraphError::NoPath {
                from: hop.from.to_string(),
                to: target.clone(),
            })?;
            let outcome = edge.invoke(item)?;
            progress.transitions += 1;
            item.set_curr_state(outcome.as_str());

            if outcome == hop.to {
                debug!("item {}: {} -[{}]-> {}", item.id(), hop.from, hop.edge, outcome);
                continue;
            }

            progress.deviations += 1;
            debug!(
                "item {}: {} -[{}]-> {} (expected {})",
                item.id(),
                hop.from,
                hop.edge,
                outcome,
                hop.to
            );
            if outcome == target {
                return Ok(());
            }

            if replans >= max_replans {
                return Err(ReconcileError::Stalled {
                    item: item.id().clone(),
                    replans,
                });
            }
            replans += 1;
            continue 'plan;
        }

        return Ok(());
    }
}

fn reconcile_item<T>(graph: &StateGraph<T>, item: &mut Item<T>, max_replans: u32) -> ItemReport {
    let mut progress = Progress::default();
    let outcome = match drive_item(graph, item, max_replans, &mut progress) {
        Ok(()) => ItemOutcome::Converged,
        Err(err) => {
            warn!("item {}: abandoned at '{}': {}", item.id(), item.curr_state(), err);
            ItemOutcome::Failed(err)
        }
    };

    ItemReport {
        id: item.id().clone(),
        outcome,
        transitions: progress.transitions,
        deviations: progress.deviations,
    }
}

/// What a parallel worker hands back: every item it was given, the reports
/// of the items it finished, and the panic that stopped it, if any
struct Partition<T> {
    items: Vec<Item<T>>,
    reports: Vec<ItemReport>,
    panic: Option<Box<dyn Any + Send>>,
}

/// Reconciles a partition in order, stopping at the first handler panic
fn reconcile_partition<T>(graph: &StateGraph<T>, mut items: Vec<Item<T>>, max_replans: u32) -> Partition<T> {
    let mut reports = Vec::with_capacity(items.len());
    let mut caught = None;
    for item in items.iter_mut() {
        match panic::catch_unwind(AssertUnwindSafe(|| reconcile_item(graph, item, max_replans))) {
            Ok(report) => reports.push(report),
            Err(payload) => {
                warn!("item {}: handler panicked at '{}'", item.id(), item.curr_state());
                caught = Some(payload);
                break;
            }
        }
    }

    Partition {
        items,
        reports,
        panic: caught,
    }
}

fn log_pass(report: &PassReport) {
    info!(
        "pass: {} items, {} converged, {} failed, {} transitions, {} deviations",
        report.len(),
        report.converged().len(),
        report.failed().len(),
        report.transitions(),
        report.deviations()
    );
}

/// The reconciliation engine: a state graph plus the items it drives
#[derive(Debug)]
pub struct Reconciler<T> {
    graph: StateGraph<T>,
    registry: ItemRegistry<T>,
    config: ReconcilerConfig,
}

impl<T> Default for Reconciler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Reconciler<T> {
    pub fn new() -> Self {
        Self::with_config(ReconcilerConfig::default())
    }

    pub fn with_config(config: ReconcilerConfig) -> Self {
        Self {
            graph: StateGraph::new(),
            registry: ItemRegistry::new(),
            config,
        }
    }

    pub fn graph(&self) -> &StateGraph<T> {
        &self.graph
    }

    pub fn registry(&self) -> &ItemRegistry<T> {
        &self.registry
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ReconcilerConfig) {
        self.config = config;
    }

    pub fn add_state(&mut self, name: impl Into<String>) {
        self.graph.add_state(name);
    }

    pub fn add_states<I>(&mut self, names: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.graph.add_states(names);
    }

    pub fn add_edge(&mut self, edge: TransitionEdge<T>) -> Result<(), GraphError> {
        self.graph.add_edge(edge)
    }

    pub fn add_edges<I>(&mut self, edges: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = TransitionEdge<T>>,
    {
        self.graph.add_edges(edges)
    }

    pub fn add_item(&mut self, item: Item<T>) -> Result<ItemId, RegistryError> {
        self.registry.add_item(item)
    }

    pub fn remove_item(&mut self, id: &ItemId) -> Result<Item<T>, RegistryError> {
        self.registry.remove_item(id)
    }

    pub fn get_item(&self, id: &ItemId) -> Result<&Item<T>, RegistryError> {
        self.registry.get_item(id)
    }

    pub fn get_item_ids(&self) -> Vec<ItemId> {
        self.registry.get_item_ids()
    }

    pub fn get_items(&self) -> Vec<(&ItemId, &Item<T>)> {
        self.registry.get_items()
    }

    pub fn get_item_curr_state(&self, id: &ItemId) -> Result<&str, RegistryError> {
        self.registry.get_item_curr_state(id)
    }

    pub fn get_item_desired_state(&self, id: &ItemId) -> Result<&str, RegistryError> {
        self.registry.get_item_desired_state(id)
    }

    pub fn update_item_states(
        &mut self,
        id: &ItemId,
        curr: impl Into<String>,
        desired: impl Into<String>,
    ) -> Result<(), RegistryError> {
        self.registry.update_item_states(id, curr, desired)
    }

    /// Plans an item's path without executing anything
    pub fn plan_for(&self, id: &ItemId) -> Result<Plan, ReconcileError> {
        let item = self.registry.get_item(id)?;
        Ok(self
            .graph
            .shortest_path(item.curr_state(), item.desired_state())?)
    }

    /// Runs one reconciliation pass on the calling thread
    ///
    /// Only items that were discrepant when the pass started are visited.
    /// Each item's final state is written back through the registry, so
    /// converged items drop out of the discrepant set.
    pub fn fix_items(&mut self) -> PassReport {
        let snapshot = self.registry.discrepant_ids();
        let mut report = PassReport::default();

        for id in snapshot {
            let Some(item) = self.registry.item_mut(&id) else {
                continue;
            };
            let mut item_report = reconcile_item(&self.graph, item, self.config.max_replans);
            let (curr, desired) = (item.curr_state().to_string(), item.desired_state().to_string());

            if let Err(err) = self.registry.update_item_states(&id, curr, desired) {
                item_report.outcome = ItemOutcome::Failed(err.into());
            }
            report.items.push(item_report);
        }

        log_pass(&report);
        report
    }
}

impl<T: Send> Reconciler<T> {
    /// Runs one pass with the snapshot split across `workers` threads
    ///
    /// Every item is moved to exactly one worker; the graph is shared
    /// read-only. Items are returned to the registry once all workers finish,
    /// and only then is a handler panic resumed on the calling thread. A
    /// worker stops at the item whose handler panicked.
    pub fn fix_items_parallel(&mut self, workers: usize) -> PassReport {
        let snapshot = self.registry.discrepant_ids();
        let items = self.registry.take_items(&snapshot);
        if items.is_empty() {
            let report = PassReport::default();
            log_pass(&report);
            return report;
        }

        let workers = workers.clamp(1, items.len());
        let chunk_size = items.len().div_ceil(workers);
        let mut partitions: Vec<Vec<Item<T>>> = Vec::with_capacity(workers);
        let mut remaining = items.into_iter();
        loop {
            let chunk: Vec<Item<T>> = remaining.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            partitions.push(chunk);
        }
        debug!("parallel pass: {} partitions of up to {}", partitions.len(), chunk_size);

        let graph = &self.graph;
        let max_replans = self.config.max_replans;
        let finished: Vec<thread::Result<Partition<T>>> = thread::scope(|scope| {
            let handles: Vec<_> = partitions
                .into_iter()
                .map(|items| scope.spawn(move || reconcile_partition(graph, items, max_replans)))
                .collect();
            handles.into_iter().map(|handle| handle.join()).collect()
        });

        let mut report = PassReport::default();
        let mut first_panic = None;
        for joined in finished {
            match joined {
                Ok(partition) => {
                    self.registry.restore_items(partition.items);
                    report.items.extend(partition.reports);
                    first_panic = first_panic.or(partition.panic);
                }
                Err(payload) => first_panic = first_panic.or(Some(payload)),
            }
        }

        // every item is back in the registry before a handler panic resumes
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }

        log_pass(&report);
        report
    }

    /// Runs one pass, in parallel when the config asks for more than one worker
    pub fn run_pass(&mut self) -> PassReport {
        if self.config.workers > 1 {
            self.fix_items_parallel(self.config.workers)
        } else {
            self.fix_items()
        }
    }

    /// Repeats passes until nothing is discrepant, a pass makes no
    /// transitions, or `max_passes` is reached
    pub fn run_until_settled(&mut self, max_passes: usize) -> Vec<PassReport> {
        let mut reports = Vec::new();
        for _ in 0..max_passes {
            if self.registry.discrepant_count() == 0 {
                break;
            }
            let report = self.run_pass();
            let stuck = report.transitions() == 0;
            reports.push(report);
            if stuck {
                break;
            }
        }
        reports
    }
}
