//! Update Bookkeeping
//!
//! The update loop batches work between scheduler ticks in three pending
//! sets:
//!
//! - `need_updating` — components whose composition changed,
//! - `need_enforcing` — constraints whose selection must be re-planned,
//! - `need_evaluating` — constraints whose selected method must re-run.
//!
//! This module also implements *touch promotion*: editing or touching a
//! variable promotes its stay to max strength and propagates the promotion
//! along touch dependencies, so the most recently touched state wins the
//! next plan.

use indexmap::{IndexMap, IndexSet};

use crate::ids::ConstraintId;
use crate::plan::Planner;
use crate::vars::{Constraint, OptionalLevel};

/// Directed promotion edges between constraints.
pub type TouchDeps = IndexMap<ConstraintId, IndexSet<ConstraintId>>;

/// The update loop's batched pending work.
#[derive(Debug, Default)]
pub struct PendingSets {
    /// Components whose composition changed, by registration id.
    pub need_updating: IndexSet<u64>,
    pub need_enforcing: IndexSet<ConstraintId>,
    pub need_evaluating: IndexSet<ConstraintId>,
}

impl PendingSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.need_updating.is_empty()
            && self.need_enforcing.is_empty()
            && self.need_evaluating.is_empty()
    }
}

/// Propagate a max-strength promotion from `origin` along touch
/// dependencies.
///
/// Breadth-first from the originating stay, visiting only constraints with a
/// non-`Default` optional level and never re-visiting; within each BFS
/// generation, stronger constraints come first. The collected constraints
/// are then promoted in *reverse* order, so the origin ends strongest.
///
/// Returns the visited constraints in collection order; the caller marks the
/// unselected ones as needing enforcement.
pub fn do_promotions(
    origin: &ConstraintId,
    touch_deps: &TouchDeps,
    constraints: &IndexMap<ConstraintId, Constraint>,
    planner: &mut dyn Planner,
) -> Vec<ConstraintId> {
    let mut collected: Vec<ConstraintId> = Vec::new();
    let mut visited: IndexSet<ConstraintId> = IndexSet::new();

    let mut generation = vec![origin.clone()];
    visited.insert(origin.clone());
    collected.push(origin.clone());

    while !generation.is_empty() {
        let mut next: Vec<ConstraintId> = Vec::new();
        for cid in &generation {
            if let Some(successors) = touch_deps.get(cid) {
                for succ in successors {
                    if visited.contains(succ) {
                        continue;
                    }
                    let promotable = constraints
                        .get(succ)
                        .map(|c| c.optional() != OptionalLevel::Default)
                        .unwrap_or(false);
                    if !promotable {
                        continue;
                    }
                    visited.insert(succ.clone());
                    next.push(succ.clone());
                }
            }
        }
        next.sort_by(|a, b| planner.compare(b, a));
        collected.extend(next.iter().cloned());
        generation = next;
    }

    for cid in collected.iter().rev() {
        planner.set_max_strength(cid.clone());
    }

    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::VarId;
    use crate::plan::{new_planner, PlannerKind};
    use crate::vars::{Method, MethodValue};

    fn cid(c: &str) -> ConstraintId {
        ConstraintId::new(c)
    }

    fn optional_constraint(id: &str) -> Constraint {
        Constraint::builder(id)
            .optional(OptionalLevel::Max)
            .method(
                Method::builder(format!("{id}!m"))
                    .input("x")
                    .output("y")
                    .body(|inputs| vec![MethodValue::Ready(inputs[0].clone())])
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    fn touch_set(ids: &[&str]) -> TouchDeps {
        let mut deps = TouchDeps::new();
        for from in ids {
            for to in ids {
                if from != to {
                    deps.entry(cid(from)).or_default().insert(cid(to));
                }
            }
        }
        deps
    }

    #[test]
    fn origin_ends_strongest() {
        let mut planner = new_planner(PlannerKind::QuickPlanner);
        let mut constraints = IndexMap::new();
        for id in ["t1", "t2", "t3"] {
            constraints.insert(cid(id), optional_constraint(id));
            planner.set_max_strength(cid(id));
        }
        let deps = touch_set(&["t1", "t2", "t3"]);

        let collected = do_promotions(&cid("t1"), &deps, &constraints, planner.as_mut());

        assert_eq!(collected[0], cid("t1"));
        assert_eq!(collected.len(), 3);
        // After promotion the origin outranks everything it visited.
        assert_eq!(
            planner.compare(&cid("t1"), &cid("t2")),
            std::cmp::Ordering::Greater
        );
        assert_eq!(
            planner.compare(&cid("t1"), &cid("t3")),
            std::cmp::Ordering::Greater
        );
    }

    #[test]
    fn generation_order_respects_strength() {
        let mut planner = new_planner(PlannerKind::QuickPlanner);
        let mut constraints = IndexMap::new();
        for id in ["t1", "t2", "t3"] {
            constraints.insert(cid(id), optional_constraint(id));
        }
        // t3 stronger than t2 before the touch.
        planner.set_max_strength(cid("t2"));
        planner.set_max_strength(cid("t3"));
        planner.set_max_strength(cid("t1"));
        let deps = touch_set(&["t1", "t2", "t3"]);

        let collected = do_promotions(&cid("t1"), &deps, &constraints, planner.as_mut());

        // Within the generation, the stronger constraint is collected first.
        assert_eq!(collected, vec![cid("t1"), cid("t3"), cid("t2")]);
        // Reverse-order promotion: t2 promoted first, then t3, then t1.
        assert_eq!(
            planner.optionals(),
            vec![cid("t2"), cid("t3"), cid("t1")]
        );
    }

    #[test]
    fn required_constraints_are_not_visited() {
        let mut planner = new_planner(PlannerKind::QuickPlanner);
        let mut constraints = IndexMap::new();
        constraints.insert(cid("t1"), optional_constraint("t1"));
        // A required constraint in the touch set is skipped.
        constraints.insert(
            cid("req"),
            Constraint::builder("req")
                .method(
                    Method::builder("req!m")
                        .input("x")
                        .output("y")
                        .body(|inputs| vec![MethodValue::Ready(inputs[0].clone())])
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        );
        planner.set_max_strength(cid("t1"));
        let deps = touch_set(&["t1", "req"]);

        let collected = do_promotions(&cid("t1"), &deps, &constraints, planner.as_mut());
        assert_eq!(collected, vec![cid("t1")]);
    }

    #[test]
    fn stays_propagate_through_touch_deps() {
        let mut planner = new_planner(PlannerKind::QuickPlanner);
        let mut constraints = IndexMap::new();
        let a_stay = VarId::new("a").stay_constraint();
        let b_stay = VarId::new("b").stay_constraint();
        constraints.insert(
            a_stay.clone(),
            Constraint::stay(&VarId::new("a"), OptionalLevel::Default),
        );
        constraints.insert(
            b_stay.clone(),
            Constraint::stay(&VarId::new("b"), OptionalLevel::Default),
        );
        planner.set_max_strength(a_stay.clone());
        planner.set_max_strength(b_stay.clone());

        let mut deps = TouchDeps::new();
        deps.entry(a_stay.clone()).or_default().insert(b_stay.clone());

        let collected = do_promotions(&a_stay, &deps, &constraints, planner.as_mut());
        assert_eq!(collected, vec![a_stay.clone(), b_stay.clone()]);
        assert_eq!(
            planner.compare(&a_stay, &b_stay),
            std::cmp::Ordering::Greater
        );
    }
}
