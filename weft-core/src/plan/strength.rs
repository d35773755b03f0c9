//! Strength Order
//!
//! A total order over constraint ids used by the planner. Optional
//! constraints (stays included) live in an indexed ordered container from
//! weakest to strongest; ids not present are *required* and outrank every
//! optional. Promotion moves a constraint to one end of the optional range.
//!
//! The order survives planner replacement through `snapshot`/`restore`.

use std::cmp::Ordering;

use indexmap::IndexSet;

use crate::ids::ConstraintId;

/// Indexed total order over optional constraints, weakest first.
#[derive(Debug, Clone, Default)]
pub struct StrengthOrder {
    order: IndexSet<ConstraintId>,
}

impl StrengthOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `cid` is registered as optional.
    pub fn contains(&self, cid: &ConstraintId) -> bool {
        self.order.contains(cid)
    }

    /// Position from the weak end; `None` for required constraints.
    pub fn rank(&self, cid: &ConstraintId) -> Option<usize> {
        self.order.get_index_of(cid)
    }

    /// Move (or add) `cid` at the strongest end of the optional range.
    pub fn set_max(&mut self, cid: ConstraintId) {
        self.order.shift_remove(&cid);
        self.order.insert(cid);
    }

    /// Move (or add) `cid` at the weakest end of the optional range.
    pub fn set_min(&mut self, cid: ConstraintId) {
        self.order.shift_remove(&cid);
        self.order.shift_insert(0, cid);
    }

    /// Remove `cid` from the optional order.
    pub fn remove(&mut self, cid: &ConstraintId) {
        self.order.shift_remove(cid);
    }

    /// Compare two constraints by strength.
    ///
    /// `Greater` means `a` is stronger. Required constraints outrank all
    /// optionals; two required constraints order by id so the relation stays
    /// total and deterministic.
    pub fn compare(&self, a: &ConstraintId, b: &ConstraintId) -> Ordering {
        match (self.rank(a), self.rank(b)) {
            (Some(ra), Some(rb)) => ra.cmp(&rb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.cmp(b),
        }
    }

    /// The optional order, weakest first.
    pub fn snapshot(&self) -> Vec<ConstraintId> {
        self.order.iter().cloned().collect()
    }

    /// Install a new optional order.
    ///
    /// Ids in `list` occupy the strong end in the given (weakest-first)
    /// order; previously known ids missing from `list` keep their relative
    /// order at the weak end. `restore(snapshot())` is exact.
    pub fn restore(&mut self, list: Vec<ConstraintId>) {
        let mut rebuilt: IndexSet<ConstraintId> = self
            .order
            .iter()
            .filter(|cid| !list.contains(cid))
            .cloned()
            .collect();
        rebuilt.extend(list);
        self.order = rebuilt;
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
