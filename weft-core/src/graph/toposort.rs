//! Topological Scheduler
//!
//! Sorts the selected methods into an evaluation order consistent with the
//! solution graph: every method appears after the methods producing any of
//! its primary inputs.
//!
//! # Algorithm
//!
//! Kahn's algorithm over the method→method graph induced by the writer map
//! (method w precedes method m when w writes one of m's non-prior inputs).
//! Where several methods are simultaneously ready, the *strongest*
//! constraint goes first, using the comparator handed in by the planner.
//! The order is therefore stable across identical graphs and strengths,
//! which is what the stay-priority snapshot stored back into the planner
//! relies on.

use std::cmp::Ordering;
use std::collections::HashMap;

use indexmap::IndexMap;

use crate::graph::cgraph::ConstraintGraph;
use crate::graph::sgraph::SolutionGraph;
use crate::ids::{ConstraintId, MethodId};

/// Strength comparator: `Greater` means the first constraint is stronger.
pub type StrengthCompare<'a> = &'a dyn Fn(&ConstraintId, &ConstraintId) -> Ordering;

/// Selected method ids in evaluation order.
///
/// Ties between simultaneously ready methods break toward the stronger
/// constraint, then by method id for determinism.
pub fn toposort(
    cg: &dyn ConstraintGraph,
    sg: &SolutionGraph,
    compare: StrengthCompare<'_>,
) -> Vec<MethodId> {
    // Predecessor counts over selected methods.
    let mut preds: IndexMap<MethodId, usize> = IndexMap::new();
    let mut succs: HashMap<MethodId, Vec<MethodId>> = HashMap::new();

    for (_, mid) in sg.selections() {
        preds.entry(mid.clone()).or_insert(0);
        for input in cg.inputs_for(mid) {
            if input.prior {
                continue;
            }
            if let Some(writer) = sg.writer_of(&input.variable) {
                if writer != mid {
                    *preds.entry(mid.clone()).or_insert(0) += 1;
                    succs.entry(writer.clone()).or_default().push(mid.clone());
                }
            }
        }
    }

    let mut ready: Vec<MethodId> = preds
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(mid, _)| mid.clone())
        .collect();

    let mut order = Vec::with_capacity(preds.len());

    while !ready.is_empty() {
        // Strongest constraint first among the ready methods.
        let best = ready
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                let ca = cg.constraint_for_method(a);
                let cb = cg.constraint_for_method(b);
                match (ca, cb) {
                    (Some(ca), Some(cb)) => {
                        compare(&ca, &cb).then_with(|| b.cmp(a))
                    }
                    _ => b.cmp(a),
                }
            })
            .map(|(i, _)| i)
            .unwrap_or(0);

        let mid = ready.swap_remove(best);
        order.push(mid.clone());

        if let Some(next) = succs.get(&mid) {
            for succ in next {
                if let Some(count) = preds.get_mut(succ) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.push(succ.clone());
                    }
                }
            }
        }
    }

    debug_assert_eq!(
        order.len(),
        preds.len(),
        "solution graph handed to toposort contains a cycle"
    );

    order
}
