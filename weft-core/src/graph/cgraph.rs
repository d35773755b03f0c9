//! Constraint Graph
//!
//! The constraint graph is the full bipartite declaration: variables on one
//! side, methods on the other, with methods grouped into constraints. It
//! answers the adjacency queries the planner and the walkers are built on.
//!
//! # Failure Semantics
//!
//! Mutations are idempotent on re-adds of the same id; removing an unknown
//! id is a silent no-op; queries over unknown ids return empty results.
//! Removing a variable still used by a constraint is a silent no-op — the
//! caller retains responsibility for ordering removals.

use std::collections::HashMap;
use std::sync::RwLock;

use indexmap::{IndexMap, IndexSet};

use crate::ids::{ConstraintId, MethodId, VarId};
use crate::vars::MethodInput;

/// Adjacency queries over the bipartite declaration.
pub trait ConstraintGraph: Send + Sync {
    fn add_variable(&mut self, vid: VarId);

    /// Remove a variable. A no-op while any constraint still uses it.
    fn remove_variable(&mut self, vid: &VarId);

    /// Add a method belonging to constraint `cid`.
    fn add_method(
        &mut self,
        mid: MethodId,
        cid: ConstraintId,
        inputs: Vec<MethodInput>,
        outputs: Vec<VarId>,
    );

    /// Remove a method. Dropping the last method of a constraint drops the
    /// constraint.
    fn remove_method(&mut self, mid: &MethodId);

    fn variables(&self) -> Vec<VarId>;
    fn methods(&self) -> Vec<MethodId>;
    fn constraints(&self) -> Vec<ConstraintId>;

    /// Methods belonging to a constraint, in insertion order.
    fn methods_of(&self, cid: &ConstraintId) -> Vec<MethodId>;

    /// Constraints with at least one method reading or writing `vid`.
    fn constraints_which_use(&self, vid: &VarId) -> Vec<ConstraintId>;

    fn constraint_for_method(&self, mid: &MethodId) -> Option<ConstraintId>;
    fn inputs_for(&self, mid: &MethodId) -> Vec<MethodInput>;
    fn outputs_for(&self, mid: &MethodId) -> Vec<VarId>;

    fn contains_variable(&self, vid: &VarId) -> bool;
    fn contains_constraint(&self, cid: &ConstraintId) -> bool;
}

#[derive(Debug, Clone)]
struct MethodRecord {
    constraint: ConstraintId,
    inputs: Vec<MethodInput>,
    outputs: Vec<VarId>,
}

/// Constraint graph with memoized reverse adjacency.
///
/// Forward queries read the primary maps directly; the reverse query
/// `constraints_which_use` is memoized per variable and the memo is
/// invalidated by every mutation.
pub struct CachingConstraintGraph {
    variables: IndexSet<VarId>,
    methods: IndexMap<MethodId, MethodRecord>,
    constraints: IndexMap<ConstraintId, IndexSet<MethodId>>,
    /// Memo: variable -> constraints using it.
    users: RwLock<HashMap<VarId, Vec<ConstraintId>>>,
}

impl CachingConstraintGraph {
    pub fn new() -> Self {
        Self {
            variables: IndexSet::new(),
            methods: IndexMap::new(),
            constraints: IndexMap::new(),
            users: RwLock::new(HashMap::new()),
        }
    }

    fn invalidate(&mut self) {
        self.users
            .write()
            .expect("cgraph cache lock poisoned")
            .clear();
    }

    fn compute_users(&self, vid: &VarId) -> Vec<ConstraintId> {
        let mut users = IndexSet::new();
        for record in self.methods.values() {
            let touches = record.inputs.iter().any(|i| &i.variable == vid)
                || record.outputs.iter().any(|o| o == vid);
            if touches {
                users.insert(record.constraint.clone());
            }
        }
        users.into_iter().collect()
    }
}

impl Default for CachingConstraintGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintGraph for CachingConstraintGraph {
    fn add_variable(&mut self, vid: VarId) {
        if self.variables.insert(vid) {
            self.invalidate();
        }
    }

    fn remove_variable(&mut self, vid: &VarId) {
        if !self.constraints_which_use(vid).is_empty() {
            return;
        }
        if self.variables.shift_remove(vid) {
            self.invalidate();
        }
    }

    fn add_method(
        &mut self,
        mid: MethodId,
        cid: ConstraintId,
        inputs: Vec<MethodInput>,
        outputs: Vec<VarId>,
    ) {
        if let Some(existing) = self.methods.get(&mid) {
            // Re-add of a known id: detach from its old constraint first.
            let old_cid = existing.constraint.clone();
            if old_cid != cid {
                if let Some(mids) = self.constraints.get_mut(&old_cid) {
                    mids.shift_remove(&mid);
                    if mids.is_empty() {
                        self.constraints.shift_remove(&old_cid);
                    }
                }
            }
        }

        self.constraints
            .entry(cid.clone())
            .or_default()
            .insert(mid.clone());
        self.methods.insert(
            mid,
            MethodRecord {
                constraint: cid,
                inputs,
                outputs,
            },
        );
        self.invalidate();
    }

    fn remove_method(&mut self, mid: &MethodId) {
        let Some(record) = self.methods.shift_remove(mid) else {
            return;
        };
        if let Some(mids) = self.constraints.get_mut(&record.constraint) {
            mids.shift_remove(mid);
            if mids.is_empty() {
                self.constraints.shift_remove(&record.constraint);
            }
        }
        self.invalidate();
    }

    fn variables(&self) -> Vec<VarId> {
        self.variables.iter().cloned().collect()
    }

    fn methods(&self) -> Vec<MethodId> {
        self.methods.keys().cloned().collect()
    }

    fn constraints(&self) -> Vec<ConstraintId> {
        self.constraints.keys().cloned().collect()
    }

    fn methods_of(&self, cid: &ConstraintId) -> Vec<MethodId> {
        self.constraints
            .get(cid)
            .map(|mids| mids.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn constraints_which_use(&self, vid: &VarId) -> Vec<ConstraintId> {
        if let Some(users) = self
            .users
            .read()
            .expect("cgraph cache lock poisoned")
            .get(vid)
        {
            return users.clone();
        }

        let users = self.compute_users(vid);
        self.users
            .write()
            .expect("cgraph cache lock poisoned")
            .insert(vid.clone(), users.clone());
        users
    }

    fn constraint_for_method(&self, mid: &MethodId) -> Option<ConstraintId> {
        self.methods.get(mid).map(|r| r.constraint.clone())
    }

    fn inputs_for(&self, mid: &MethodId) -> Vec<MethodInput> {
        self.methods
            .get(mid)
            .map(|r| r.inputs.clone())
            .unwrap_or_default()
    }

    fn outputs_for(&self, mid: &MethodId) -> Vec<VarId> {
        self.methods
            .get(mid)
            .map(|r| r.outputs.clone())
            .unwrap_or_default()
    }

    fn contains_variable(&self, vid: &VarId) -> bool {
        self.variables.contains(vid)
    }

    fn contains_constraint(&self, cid: &ConstraintId) -> bool {
        self.constraints.contains_key(cid)
    }
}

impl std::fmt::Debug for CachingConstraintGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingConstraintGraph")
            .field("variables", &self.variables.len())
            .field("methods", &self.methods.len())
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(v: &str) -> MethodInput {
        MethodInput {
            variable: VarId::new(v),
            prior: false,
        }
    }

    fn graph_ab() -> CachingConstraintGraph {
        let mut g = CachingConstraintGraph::new();
        g.add_variable(VarId::new("a"));
        g.add_variable(VarId::new("b"));
        g.add_method(
            MethodId::new("c!m1"),
            ConstraintId::new("c"),
            vec![input("a")],
            vec![VarId::new("b")],
        );
        g.add_method(
            MethodId::new("c!m2"),
            ConstraintId::new("c"),
            vec![input("b")],
            vec![VarId::new("a")],
        );
        g
    }

    #[test]
    fn forward_queries() {
        let g = graph_ab();

        assert_eq!(g.methods_of(&ConstraintId::new("c")).len(), 2);
        assert_eq!(
            g.constraint_for_method(&MethodId::new("c!m1")),
            Some(ConstraintId::new("c"))
        );
        assert_eq!(g.outputs_for(&MethodId::new("c!m1")), vec![VarId::new("b")]);
        assert_eq!(g.inputs_for(&MethodId::new("c!m2"))[0].variable, VarId::new("b"));
    }

    #[test]
    fn reverse_query_is_cached_and_invalidated() {
        let mut g = graph_ab();

        let users = g.constraints_which_use(&VarId::new("a"));
        assert_eq!(users, vec![ConstraintId::new("c")]);
        // Cached now.
        assert!(g
            .users
            .read()
            .unwrap()
            .contains_key(&VarId::new("a")));

        g.add_method(
            MethodId::new("d!m1"),
            ConstraintId::new("d"),
            vec![input("a")],
            vec![VarId::new("b")],
        );
        // Mutation cleared the memo.
        assert!(g.users.read().unwrap().is_empty());
        assert_eq!(g.constraints_which_use(&VarId::new("a")).len(), 2);
    }

    #[test]
    fn unknown_ids_return_empty() {
        let g = graph_ab();

        assert!(g.methods_of(&ConstraintId::new("nope")).is_empty());
        assert!(g.constraints_which_use(&VarId::new("nope")).is_empty());
        assert!(g.constraint_for_method(&MethodId::new("nope")).is_none());
        assert!(g.inputs_for(&MethodId::new("nope")).is_empty());
    }

    #[test]
    fn removing_used_variable_is_a_noop() {
        let mut g = graph_ab();

        g.remove_variable(&VarId::new("a"));
        assert!(g.contains_variable(&VarId::new("a")));
    }

    #[test]
    fn last_method_removal_drops_constraint() {
        let mut g = graph_ab();

        g.remove_method(&MethodId::new("c!m1"));
        assert!(g.contains_constraint(&ConstraintId::new("c")));

        g.remove_method(&MethodId::new("c!m2"));
        assert!(!g.contains_constraint(&ConstraintId::new("c")));

        // Variables are now unused and removable.
        g.remove_variable(&VarId::new("a"));
        assert!(!g.contains_variable(&VarId::new("a")));
    }

    #[test]
    fn re_add_is_idempotent() {
        let mut g = graph_ab();
        g.add_variable(VarId::new("a"));
        g.add_method(
            MethodId::new("c!m1"),
            ConstraintId::new("c"),
            vec![input("a")],
            vec![VarId::new("b")],
        );

        assert_eq!(g.variables().len(), 2);
        assert_eq!(g.methods_of(&ConstraintId::new("c")).len(), 2);
    }
}
