//! QuickPlan
//!
//! A retraction-based incremental planner over constraint hierarchies.
//!
//! # Algorithm
//!
//! Planning runs free-variable elimination: a variable is *free* when only
//! one unplanned constraint uses it, and a constraint can be planned once
//! one of its methods writes only free variables. Eliminating constraints in
//! that way visits the dataflow in reverse topological order, so the
//! resulting selection is acyclic and conflict-free by construction.
//!
//! When elimination deadlocks, the remaining constraints are overconstrained
//! and the weakest optional among them is retracted; elimination restarts.
//! If a deadlocked remainder contains only required constraints the plan
//! fails and the previous solution stays in place.
//!
//! Retracted optionals get a re-admission pass, strongest first: dropping a
//! weak blocker can make an earlier casualty enforceable again.
//!
//! Method tie-breaks are by declaration order; candidate iteration follows
//! the constraint graph's insertion order, so identical inputs always plan
//! to identical solutions.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use crate::graph::{ConstraintGraph, SolutionGraph};
use crate::ids::{ConstraintId, MethodId, VarId};
use crate::plan::strength::StrengthOrder;
use crate::plan::Planner;

/// The default planner.
#[derive(Debug, Default)]
pub struct QuickPlanner {
    strengths: StrengthOrder,
    sgraph: SolutionGraph,
}

/// Result of one elimination run.
struct Elimination {
    selections: Vec<(ConstraintId, MethodId, Vec<VarId>)>,
    remaining: Vec<ConstraintId>,
}

impl QuickPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables a constraint uses for planning purposes: primary inputs and
    /// outputs of every method. Prior reads do not constrain the plan.
    fn planning_vars(cg: &dyn ConstraintGraph, cid: &ConstraintId) -> IndexSet<VarId> {
        let mut vars = IndexSet::new();
        for mid in cg.methods_of(cid) {
            for input in cg.inputs_for(&mid) {
                if !input.prior {
                    vars.insert(input.variable);
                }
            }
            for output in cg.outputs_for(&mid) {
                vars.insert(output);
            }
        }
        vars
    }

    /// Run free-variable elimination over `candidates`.
    fn eliminate(cg: &dyn ConstraintGraph, candidates: &IndexSet<ConstraintId>) -> Elimination {
        // variable -> unplanned constraints using it
        let mut users: HashMap<VarId, IndexSet<ConstraintId>> = HashMap::new();
        let mut vars_of: IndexMap<ConstraintId, IndexSet<VarId>> = IndexMap::new();
        for cid in candidates {
            let vars = Self::planning_vars(cg, cid);
            for var in &vars {
                users.entry(var.clone()).or_default().insert(cid.clone());
            }
            vars_of.insert(cid.clone(), vars);
        }

        let mut selections = Vec::new();
        let mut unplanned: IndexSet<ConstraintId> = candidates.clone();

        loop {
            let mut progressed = false;

            let round: Vec<ConstraintId> = unplanned.iter().cloned().collect();
            for cid in round {
                let chosen = cg.methods_of(&cid).into_iter().find_map(|mid| {
                    let outputs = cg.outputs_for(&mid);
                    let all_free = outputs.iter().all(|out| {
                        users
                            .get(out)
                            .map(|u| u.len() == 1 && u.contains(&cid))
                            .unwrap_or(true)
                    });
                    all_free.then_some((mid, outputs))
                });

                if let Some((mid, outputs)) = chosen {
                    if let Some(vars) = vars_of.get(&cid) {
                        for var in vars {
                            if let Some(u) = users.get_mut(var) {
                                u.shift_remove(&cid);
                            }
                        }
                    }
                    unplanned.shift_remove(&cid);
                    selections.push((cid, mid, outputs));
                    progressed = true;
                }
            }

            if !progressed {
                break;
            }
        }

        Elimination {
            selections,
            remaining: unplanned.into_iter().collect(),
        }
    }

    /// Plan over `candidates`, retracting weakest optionals on deadlock.
    ///
    /// Returns the selections on success, or `None` when a deadlocked
    /// remainder contains no retractable optional.
    fn plan_with_retraction(
        &self,
        cg: &dyn ConstraintGraph,
        mut candidates: IndexSet<ConstraintId>,
        excluded: &mut Vec<ConstraintId>,
    ) -> Option<Vec<(ConstraintId, MethodId, Vec<VarId>)>> {
        loop {
            let outcome = Self::eliminate(cg, &candidates);
            if outcome.remaining.is_empty() {
                return Some(outcome.selections);
            }

            let weakest = outcome
                .remaining
                .iter()
                .filter(|cid| self.strengths.contains(cid))
                .min_by(|a, b| self.strengths.compare(a, b))
                .cloned()?;

            candidates.shift_remove(&weakest);
            excluded.push(weakest);
        }
    }
}

impl Planner for QuickPlanner {
    fn plan(&mut self, cg: &dyn ConstraintGraph, _changed: &IndexSet<ConstraintId>) -> bool {
        let all: IndexSet<ConstraintId> = cg.constraints().into_iter().collect();

        let mut excluded = Vec::new();
        let Some(mut selections) =
            self.plan_with_retraction(cg, all.clone(), &mut excluded)
        else {
            return false;
        };

        // Re-admission: a retracted optional may be enforceable once the
        // blocker that deadlocked it was itself retracted.
        excluded.sort_by(|a, b| self.strengths.compare(b, a));
        let mut admitted: IndexSet<ConstraintId> = all
            .iter()
            .filter(|cid| !excluded.contains(cid))
            .cloned()
            .collect();
        for cid in excluded {
            let mut trial = admitted.clone();
            trial.insert(cid.clone());
            let outcome = Self::eliminate(cg, &trial);
            if outcome.remaining.is_empty() {
                admitted = trial;
                selections = outcome.selections;
            }
        }

        let mut sgraph = SolutionGraph::new();
        for (cid, mid, outputs) in selections {
            sgraph.select(cid, mid, &outputs);
        }
        self.sgraph = sgraph;
        true
    }

    fn sgraph(&self) -> &SolutionGraph {
        &self.sgraph
    }

    fn optionals(&self) -> Vec<ConstraintId> {
        self.strengths.snapshot()
    }

    fn set_optionals(&mut self, list: Vec<ConstraintId>) {
        self.strengths.restore(list);
    }

    fn set_max_strength(&mut self, cid: ConstraintId) {
        self.strengths.set_max(cid);
    }

    fn set_min_strength(&mut self, cid: ConstraintId) {
        self.strengths.set_min(cid);
    }

    fn remove_optional(&mut self, cid: &ConstraintId) {
        self.strengths.remove(cid);
    }

    fn compare(&self, a: &ConstraintId, b: &ConstraintId) -> std::cmp::Ordering {
        self.strengths.compare(a, b)
    }
}
