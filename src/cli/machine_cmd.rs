//! Commands operating on a machine file (check, plan, run)

use std::collections::BTreeMap;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use serde::Serialize;

use super::output::Output;
use crate::domain::{ItemId, Reconciler};
use crate::storage::{Config, MachineFile, ReconcilerSettings, Trace};

/// Settings shared by every machine command
pub struct MachineArgs<'a> {
    pub config_path: Option<&'a Path>,
    /// Flag and environment overrides, the top config layer
    pub overrides: ReconcilerSettings,
}

/// Loads the user config and the machine file, then builds the reconciler
fn load(path: &Path, args: &MachineArgs) -> Result<Reconciler<Trace>> {
    let user = Config::load(args.config_path)?;
    let machine = MachineFile::load(path)?;

    let config = user
        .reconciler
        .merge(machine.reconciler)
        .merge(args.overrides)
        .resolve()?;
    log::debug!("loaded {} with {:?}", path.display(), config);

    machine
        .build(config)
        .with_context(|| format!("Invalid machine file: {}", path.display()))
}

#[derive(Serialize)]
struct CheckSummary {
    states: usize,
    edges: usize,
    items: usize,
    discrepant: usize,
    max_replans: u32,
    workers: usize,
}

/// Validates a machine file
pub fn check(output: &Output, path: &Path, args: &MachineArgs) -> Result<ExitCode> {
    let reconciler = load(path, args)?;
    let summary = CheckSummary {
        states: reconciler.graph().state_count(),
        edges: reconciler.graph().edge_count(),
        items: reconciler.registry().len(),
        discrepant: reconciler.registry().discrepant_count(),
        max_replans: reconciler.config().max_replans,
        workers: reconciler.config().workers,
    };

    if output.is_json() {
        output.data(&summary);
    } else {
        output.status(&format!(
            "{}: {} states, {} edges, {} items ({} discrepant)",
            path.display(),
            summary.states,
            summary.edges,
            summary.items,
            summary.discrepant
        ));
    }

    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct PlanView {
    id: String,
    current: String,
    desired: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transitions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Prints planned paths without firing any edge
///
/// Without `--item`, every discrepant item is planned. An unplannable item
/// is reported, not treated as a command failure.
pub fn plan(
    output: &Output,
    path: &Path,
    item: Option<&str>,
    args: &MachineArgs,
) -> Result<ExitCode> {
    let reconciler = load(path, args)?;

    let ids = match item {
        Some(raw) => {
            let id: ItemId = raw.parse()?;
            reconciler.get_item(&id)?;
            vec![id]
        }
        None => reconciler.registry().discrepant_ids(),
    };

    let mut views = Vec::with_capacity(ids.len());
    for id in ids {
        let item = reconciler.get_item(&id)?;
        let mut view = PlanView {
            id: id.to_string(),
            current: item.curr_state().to_string(),
            desired: item.desired_state().to_string(),
            path: None,
            transitions: None,
            error: None,
        };
        match reconciler.plan_for(&id) {
            Ok(plan) => {
                view.transitions = Some(plan.transition_count());
                view.path = Some(plan.nodes().iter().map(ToString::to_string).collect());
            }
            Err(e) => view.error = Some(e.to_string()),
        }
        views.push(view);
    }

    if output.is_json() {
        output.data(&views);
    } else if views.is_empty() {
        output.status("Nothing to reconcile");
    } else {
        for view in &views {
            let route = match (&view.path, &view.error) {
                (Some(path), _) => path.join(" -> "),
                (None, Some(error)) => format!("unreachable: {}", error),
                (None, None) => String::new(),
            };
            output.row(&[view.id.as_str(), route.as_str()]);
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct PassView {
    pass: usize,
    items: usize,
    converged: usize,
    failed: usize,
    transitions: usize,
    deviations: usize,
}

#[derive(Serialize)]
struct ItemView {
    id: String,
    state: String,
    desired: String,
    converged: bool,
    trace: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct RunView {
    passes: Vec<PassView>,
    items: Vec<ItemView>,
}

/// Reconciles until settled or out of passes
///
/// Exits with failure when any item is still discrepant afterwards.
pub fn run(output: &Output, path: &Path, passes: usize, args: &MachineArgs) -> Result<ExitCode> {
    let mut reconciler = load(path, args)?;
    let reports = reconciler.run_until_settled(passes);

    // Latest failure per item; a later convergence clears it.
    let mut errors: BTreeMap<ItemId, String> = BTreeMap::new();
    for report in &reports {
        for item in &report.items {
            match item.error() {
                Some(err) => errors.insert(item.id.clone(), err.to_string()),
                None => errors.remove(&item.id),
            };
        }
    }

    let view = RunView {
        passes: reports
            .iter()
            .enumerate()
            .map(|(n, report)| PassView {
                pass: n + 1,
                items: report.len(),
                converged: report.converged().len(),
                failed: report.failed().len(),
                transitions: report.transitions(),
                deviations: report.deviations(),
            })
            .collect(),
        items: reconciler
            .get_items()
            .into_iter()
            .map(|(id, item)| ItemView {
                id: id.to_string(),
                state: item.curr_state().to_string(),
                desired: item.desired_state().to_string(),
                converged: !item.is_discrepant(),
                trace: item.payload().clone(),
                error: errors.get(id).cloned(),
            })
            .collect(),
    };

    if output.is_json() {
        output.data(&view);
    } else {
        for pass in &view.passes {
            output.line(format!(
                "pass {}: {} converged, {} failed, {} transitions, {} deviations",
                pass.pass, pass.converged, pass.failed, pass.transitions, pass.deviations
            ));
        }
        for item in &view.items {
            let state = if item.converged {
                item.state.clone()
            } else {
                format!("{} (desired {})", item.state, item.desired)
            };
            output.row(&[item.id.as_str(), state.as_str(), item.trace.join(" ").as_str()]);
            if let Some(error) = &item.error {
                output.line(format!("  {}", error));
            }
        }
    }

    if reconciler.registry().discrepant_count() > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
