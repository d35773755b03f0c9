//! Evaluator
//!
//! Runs the selected methods whose outputs are transitively downstream of
//! the constraints needing evaluation, in topological order, and commits the
//! promised outputs into the variables.
//!
//! # Pass Structure
//!
//! 1. Map each constraint needing evaluation to its selected method.
//! 2. Commit pre-existing promises on every downstream variable — the
//!    *initial edit commit* that makes edited values visible to the methods
//!    about to run.
//! 3. Intersect the downstream methods (stays excluded) with the
//!    topological order.
//! 4. Invoke each scheduled method; install its output promises and commit
//!    the ready ones at once so later methods read fresh values. Each
//!    activation is handed to the enablement analyzer by the caller.
//! 5. A final commit sweep over the downstream variables picks up anything
//!    still promise-bearing; unresolved promises leave their variables
//!    pending and are returned so the caller can hook settlement.
//!
//! The evaluator never blocks: a deferred output only marks its variable
//! pending.

use indexmap::{IndexMap, IndexSet};
use tracing::warn;

use crate::graph::{downstream_methods, downstream_variables, ConstraintGraph, SolutionGraph};
use crate::ids::{ConstraintId, MethodId, VarId};
use crate::vars::{
    Activation, CommitOutcome, Constraint, MethodValue, Promise, Value, Variable,
};

/// What one evaluation pass did.
pub struct Evaluation {
    /// Activations in scheduled order.
    pub activations: Vec<Activation>,
    /// Variables left pending: (variable, promise generation, promise).
    /// The caller registers settlement hooks for these.
    pub pending_hooks: Vec<(VarId, u64, Promise)>,
    /// Net change to the model's pending count.
    pub pending_delta: i64,
}

fn commit(
    variable: &Variable,
    pending_hooks: &mut Vec<(VarId, u64, Promise)>,
    pending_delta: &mut i64,
) {
    match variable.commit_promise() {
        CommitOutcome::Noop => {}
        CommitOutcome::Committed { was_pending, .. } => {
            if was_pending {
                *pending_delta -= 1;
            }
        }
        CommitOutcome::StillPending {
            newly_pending,
            generation,
            promise,
        } => {
            if newly_pending {
                *pending_delta += 1;
                pending_hooks.push((variable.id().clone(), generation, promise));
            }
        }
    }
}

/// Run one evaluation pass over the constraints in `need_evaluating`.
pub fn evaluate(
    cg: &dyn ConstraintGraph,
    sg: &SolutionGraph,
    topomids: &[MethodId],
    variables: &IndexMap<VarId, Variable>,
    constraints: &IndexMap<ConstraintId, Constraint>,
    need_evaluating: &IndexSet<ConstraintId>,
) -> Evaluation {
    let mut activations = Vec::new();
    let mut pending_hooks = Vec::new();
    let mut pending_delta = 0i64;

    // 1. Constraints to seed methods.
    let seeds: Vec<MethodId> = need_evaluating
        .iter()
        .filter_map(|cid| sg.selected_method(cid).cloned())
        .collect();

    // 2. Initial edit commit over the downstream region.
    let downstream = downstream_variables(cg, sg, &seeds);
    for vid in &downstream {
        if let Some(variable) = variables.get(vid) {
            commit(variable, &mut pending_hooks, &mut pending_delta);
        }
    }

    // 3. Scheduled methods: downstream, stays excluded, topological order.
    let reached = downstream_methods(cg, sg, &seeds);
    let scheduled: Vec<MethodId> = topomids
        .iter()
        .filter(|mid| !mid.is_stay() && reached.contains(*mid))
        .cloned()
        .collect();

    // 4. Invoke in order, committing ready outputs as we go.
    for mid in &scheduled {
        let Some(cid) = cg.constraint_for_method(mid) else {
            continue;
        };
        let Some(method) = constraints.get(&cid).and_then(|c| c.method(mid)) else {
            warn!(method = %mid, constraint = %cid, "selected method missing from registry");
            continue;
        };

        let input_values: Vec<Value> = method
            .inputs()
            .iter()
            .map(|input| {
                variables
                    .get(&input.variable)
                    .map(|v| v.value())
                    .unwrap_or(Value::Null)
            })
            .collect();

        let slots = method.invoke(&input_values);
        if slots.len() != method.outputs().len() {
            warn!(
                method = %mid,
                declared = method.outputs().len(),
                got = slots.len(),
                "method produced wrong number of outputs; activation dropped"
            );
            continue;
        }

        let mut outputs = Vec::with_capacity(slots.len());
        for (out_vid, slot) in method.outputs().iter().zip(slots) {
            let promise = match slot {
                MethodValue::Ready(value) => Promise::resolved(value),
                MethodValue::Deferred(promise) => promise,
            };
            if let Some(variable) = variables.get(out_vid) {
                variable.install_promise(promise.clone(), Some(mid.clone()));
                commit(variable, &mut pending_hooks, &mut pending_delta);
            }
            outputs.push((out_vid.clone(), promise));
        }

        activations.push(Activation {
            constraint: cid,
            method: mid.clone(),
            inputs: method
                .inputs()
                .iter()
                .cloned()
                .zip(input_values)
                .collect(),
            outputs,
        });
    }

    // 5. Final sweep.
    for vid in &downstream {
        if let Some(variable) = variables.get(vid) {
            commit(variable, &mut pending_hooks, &mut pending_delta);
        }
    }

    Evaluation {
        activations,
        pending_hooks,
        pending_delta,
    }
}
