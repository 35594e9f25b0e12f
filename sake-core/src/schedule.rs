//! Subgraph selection (ties closure + ancestors), level decomposition, and
//! the staleness decision. Recon and live execution share every decision
//! made here; only what's done with the answer differs (print vs. run).

use crate::graph::{Graph, TargetName, TiesMap};
use petgraph::graph::NodeIndex;
use sake_types::FingerprintStoreDocument;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Flags that influence scheduling and execution, threaded through instead
/// of relying on process-wide state.
#[derive(Clone, Copy, Debug, Default)]
pub struct Settings {
    pub force: bool,
    pub recon: bool,
    pub parallel: bool,
    pub quiet: bool,
    pub verbose: bool,
}

pub struct Selection {
    /// The tie-closed request, before ancestor expansion — what the ties
    /// notice reports when it was enlarged.
    pub tie_closed: HashSet<TargetName>,
    /// `tie_closed` plus every transitive producer of its dependencies —
    /// the actual set of nodes scheduling and execution operate over.
    pub effective: HashSet<TargetName>,
    pub ties_enlarged: bool,
}

fn close_ties(ties: &TiesMap, requested: &HashSet<TargetName>) -> (HashSet<TargetName>, bool) {
    let mut set = requested.clone();
    loop {
        let mut changed = false;
        let snapshot: Vec<TargetName> = set.iter().cloned().collect();
        for name in snapshot {
            if let Some(others) = ties.get(&name) {
                for other in others {
                    if set.insert(other.clone()) {
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }
    let enlarged = set.len() > requested.len();
    (set, enlarged)
}

fn ancestors_closure(graph: &Graph, targets: &HashSet<TargetName>) -> HashSet<TargetName> {
    let mut result = targets.clone();
    let mut stack: Vec<NodeIndex> = targets.iter().filter_map(|n| graph.node(n)).collect();
    while let Some(idx) = stack.pop() {
        for pred in graph.predecessors(idx) {
            let name = graph.name_of(pred).to_string();
            if result.insert(name) {
                stack.push(pred);
            }
        }
    }
    result
}

/// Computes the effective subgraph for a user-requested target set. An
/// empty `requested` set means "every root" — callers resolve that before
/// calling this (see `sake`'s orchestration), since "root" depends on
/// whether `all` was declared.
pub fn select(graph: &Graph, ties: &TiesMap, requested: &HashSet<TargetName>) -> Selection {
    let (tie_closed, ties_enlarged) = close_ties(ties, requested);
    let effective = ancestors_closure(graph, &tie_closed);
    Selection {
        tie_closed,
        effective,
        ties_enlarged,
    }
}

fn within(graph: &Graph, neighbors: Vec<NodeIndex>, effective: &HashSet<NodeIndex>) -> Vec<NodeIndex> {
    neighbors.into_iter().filter(|n| effective.contains(n)).collect()
}

/// Sink-first level decomposition: `L0` is every node with
/// no successor in the effective DAG, `L_{k+1}` is the predecessors of
/// `L_k`; the full list is then reversed so producers precede consumers,
/// and each node keeps only its earliest (post-reversal) occurrence.
/// Every level is sorted alphabetically for determinism.
pub fn compute_levels(graph: &Graph, effective: &HashSet<TargetName>) -> Vec<Vec<TargetName>> {
    let effective_idxs: HashSet<NodeIndex> = effective.iter().filter_map(|n| graph.node(n)).collect();

    let mut raw_levels: Vec<HashSet<NodeIndex>> = Vec::new();
    let mut current: HashSet<NodeIndex> = effective_idxs
        .iter()
        .copied()
        .filter(|&idx| within(graph, graph.successors(idx), &effective_idxs).is_empty())
        .collect();

    while !current.is_empty() {
        raw_levels.push(current.clone());
        let mut next = HashSet::new();
        for &idx in &current {
            for pred in within(graph, graph.predecessors(idx), &effective_idxs) {
                next.insert(pred);
            }
        }
        current = next;
    }

    raw_levels.reverse();

    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for level in raw_levels {
        let mut names: Vec<TargetName> = level
            .into_iter()
            .filter(|idx| seen.insert(*idx))
            .map(|idx| graph.name_of(idx).to_string())
            .collect();
        names.sort();
        if !names.is_empty() {
            result.push(names);
        }
    }
    result
}

/// Flattens levels into the serial execution order, preserving per-level
/// alphabetic order.
pub fn flatten_serial(levels: &[Vec<TargetName>]) -> Vec<TargetName> {
    levels.iter().flatten().cloned().collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StaleReason {
    Forced,
    MissingOutput(String),
    NoDependencies,
    MissingFromMemory(String),
    MissingFromStore(String),
    HashChanged(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StalenessDecision {
    Fresh,
    Stale(StaleReason),
}

impl StalenessDecision {
    pub fn is_stale(&self) -> bool {
        matches!(self, StalenessDecision::Stale(_))
    }
}

/// Decides whether a target must run, given its already wildcard-resolved
/// `outputs`/`dependencies` (concrete relative paths), the in-memory hash
/// table `memory`, and the loaded store. Shared verbatim between recon and
/// live modes.
pub fn decide_staleness(
    resolved_outputs: &[String],
    resolved_dependencies: &[String],
    cwd: &Path,
    memory: &HashMap<String, String>,
    store: &FingerprintStoreDocument,
    settings: &Settings,
) -> StalenessDecision {
    if settings.force {
        return StalenessDecision::Stale(StaleReason::Forced);
    }

    // Only individually-declared output paths are checked for existence; a
    // target declaring no `output` at all (a phony target driven purely by
    // its `dependencies`) falls straight through to the hash comparison
    // below, matching `needs_to_run` in the original `sake`.
    for output in resolved_outputs {
        if !cwd.join(output).is_file() {
            return StalenessDecision::Stale(StaleReason::MissingOutput(output.clone()));
        }
    }

    if resolved_dependencies.is_empty() {
        return StalenessDecision::Stale(StaleReason::NoDependencies);
    }

    for dep in resolved_dependencies {
        let current_hash = match memory.get(dep) {
            Some(h) => h,
            None => return StalenessDecision::Stale(StaleReason::MissingFromMemory(dep.clone())),
        };
        let stored = match store.files.get(dep) {
            Some(fp) => fp,
            None => return StalenessDecision::Stale(StaleReason::MissingFromStore(dep.clone())),
        };
        if &stored.sha != current_hash {
            return StalenessDecision::Stale(StaleReason::HashChanged(dep.clone()));
        }
    }

    StalenessDecision::Fresh
}
