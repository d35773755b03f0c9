//! Solution Graph
//!
//! The solution graph is the planner's output: for each enforceable
//! constraint, exactly one selected method. The directed graph formed by
//! input-variable→method and method→output-variable edges is a DAG.
//!
//! This module also provides the same-type downstream walkers the evaluator
//! is built on: method→variable (which variables are stale) and
//! method→method (which activations must run). Both walks follow only
//! *primary* input edges — a prior-flagged read does not propagate
//! staleness.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use crate::graph::cgraph::ConstraintGraph;
use crate::ids::{ConstraintId, MethodId, VarId};

#[derive(Debug, Clone)]
struct Selection {
    method: MethodId,
    outputs: Vec<VarId>,
}

/// One selected method per enforceable constraint.
#[derive(Debug, Clone, Default)]
pub struct SolutionGraph {
    selections: IndexMap<ConstraintId, Selection>,
    /// Reverse index: variable -> the selected method writing it.
    writers: HashMap<VarId, MethodId>,
}

impl SolutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `cid` is enforced by `mid`, writing `outputs`.
    ///
    /// Replaces any previous selection for the constraint.
    pub fn select(&mut self, cid: ConstraintId, mid: MethodId, outputs: &[VarId]) {
        self.unselect(&cid);
        for out in outputs {
            self.writers.insert(out.clone(), mid.clone());
        }
        self.selections.insert(
            cid,
            Selection {
                method: mid,
                outputs: outputs.to_vec(),
            },
        );
    }

    /// Drop the selection for `cid`, if any.
    pub fn unselect(&mut self, cid: &ConstraintId) {
        if let Some(previous) = self.selections.shift_remove(cid) {
            for out in &previous.outputs {
                if self.writers.get(out) == Some(&previous.method) {
                    self.writers.remove(out);
                }
            }
        }
    }

    /// The selected method for a constraint.
    pub fn selected_method(&self, cid: &ConstraintId) -> Option<&MethodId> {
        self.selections.get(cid).map(|s| &s.method)
    }

    /// Whether `mid` is selected for its constraint.
    pub fn is_selected(&self, mid: &MethodId) -> bool {
        self.selections.values().any(|s| &s.method == mid)
    }

    /// The selected method writing `vid`, if any.
    pub fn writer_of(&self, vid: &VarId) -> Option<&MethodId> {
        self.writers.get(vid)
    }

    /// Selected (constraint, method) pairs in selection order.
    pub fn selections(&self) -> impl Iterator<Item = (&ConstraintId, &MethodId)> {
        self.selections.iter().map(|(cid, s)| (cid, &s.method))
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}

/// Map each variable to the selected methods reading it as a primary input.
fn primary_readers(
    cg: &dyn ConstraintGraph,
    sg: &SolutionGraph,
) -> HashMap<VarId, Vec<MethodId>> {
    let mut readers: HashMap<VarId, Vec<MethodId>> = HashMap::new();
    for (_, mid) in sg.selections() {
        for input in cg.inputs_for(mid) {
            if !input.prior {
                readers.entry(input.variable).or_default().push(mid.clone());
            }
        }
    }
    readers
}

/// Variables transitively written downstream of the seed methods.
pub fn downstream_variables(
    cg: &dyn ConstraintGraph,
    sg: &SolutionGraph,
    seeds: &[MethodId],
) -> IndexSet<VarId> {
    let readers = primary_readers(cg, sg);
    let mut variables = IndexSet::new();
    let mut visited_methods = IndexSet::new();
    let mut queue: Vec<MethodId> = seeds.to_vec();

    while let Some(mid) = queue.pop() {
        if !visited_methods.insert(mid.clone()) {
            continue;
        }
        for out in cg.outputs_for(&mid) {
            if variables.insert(out.clone()) {
                if let Some(next) = readers.get(&out) {
                    queue.extend(next.iter().cloned());
                }
            }
        }
    }

    variables
}

/// Selected methods transitively downstream of the seed methods, seeds
/// included.
pub fn downstream_methods(
    cg: &dyn ConstraintGraph,
    sg: &SolutionGraph,
    seeds: &[MethodId],
) -> IndexSet<MethodId> {
    let readers = primary_readers(cg, sg);
    let mut methods = IndexSet::new();
    let mut queue: Vec<MethodId> = seeds.to_vec();

    while let Some(mid) = queue.pop() {
        if !methods.insert(mid.clone()) {
            continue;
        }
        for out in cg.outputs_for(&mid) {
            if let Some(next) = readers.get(&out) {
                queue.extend(next.iter().cloned());
            }
        }
    }

    methods
}
