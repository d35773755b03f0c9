//! Planning
//!
//! The planner chooses one method per enforceable constraint so that the
//! selected methods form an acyclic dataflow, preferring stronger
//! constraints. Strength is a total order: required constraints outrank all
//! optionals; optionals (stays included) live in an indexed order that touch
//! promotions rearrange.
//!
//! Planners are replaceable at runtime: the strength order is carried across
//! through [`Planner::optionals`] / [`Planner::set_optionals`].

mod quickplan;
mod strength;

use std::cmp::Ordering;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::graph::{ConstraintGraph, SolutionGraph};
use crate::ids::ConstraintId;

pub use quickplan::QuickPlanner;
pub use strength::StrengthOrder;

/// A planning strategy.
///
/// The planner owns the current solution graph and the strength order over
/// optional constraints. `plan` produces a new solution; on failure (a
/// required constraint cannot be enforced) the previous solution stays in
/// place and `plan` returns false.
pub trait Planner: Send + Sync {
    /// Re-plan. `changed` names the constraints whose enforcement status or
    /// strength moved since the last plan.
    fn plan(&mut self, cg: &dyn ConstraintGraph, changed: &IndexSet<ConstraintId>) -> bool;

    /// The current solution graph (the previous one after a failed plan).
    fn sgraph(&self) -> &SolutionGraph;

    /// Snapshot of the optional order, weakest first.
    fn optionals(&self) -> Vec<ConstraintId>;

    /// Install an optional order (see [`StrengthOrder::restore`]).
    fn set_optionals(&mut self, list: Vec<ConstraintId>);

    /// Promote to the strongest end of the optional order.
    fn set_max_strength(&mut self, cid: ConstraintId);

    /// Demote to the weakest end of the optional order.
    fn set_min_strength(&mut self, cid: ConstraintId);

    /// Forget an optional constraint entirely.
    fn remove_optional(&mut self, cid: &ConstraintId);

    /// Compare two constraints by strength; `Greater` means `a` is stronger.
    fn compare(&self, a: &ConstraintId, b: &ConstraintId) -> Ordering;
}

/// Selectable planner implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlannerKind {
    #[default]
    QuickPlanner,
}

/// Construct a planner of the given kind.
pub fn new_planner(kind: PlannerKind) -> Box<dyn Planner> {
    match kind {
        PlannerKind::QuickPlanner => Box::new(QuickPlanner::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_default_planner() {
        let planner = new_planner(PlannerKind::default());
        assert!(planner.sgraph().is_empty());
        assert!(planner.optionals().is_empty());
    }

    #[test]
    fn optionals_carry_across_planners() {
        let mut old = new_planner(PlannerKind::QuickPlanner);
        old.set_max_strength(ConstraintId::new("a"));
        old.set_max_strength(ConstraintId::new("b"));

        let mut new = new_planner(PlannerKind::QuickPlanner);
        new.set_optionals(old.optionals());

        assert_eq!(new.optionals(), old.optionals());
        assert_eq!(
            new.compare(&ConstraintId::new("b"), &ConstraintId::new("a")),
            Ordering::Greater
        );
    }
}
