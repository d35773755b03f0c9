//! Components
//!
//! A component is the user-facing container the model consumes composition
//! from: a bundle of variables, constraints, outputs, and touch
//! dependencies. The model never walks a component directly — it asks for a
//! [`ComponentChanges`] diff against the composition last reported, and
//! applies removes before adds.
//!
//! Components notify the model through registered listeners when their
//! composition changes; the back-reference is a plain callback rather than
//! an ownership cycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use indexmap::{IndexMap, IndexSet};

use crate::ids::{ConstraintId, VarId};
use crate::vars::{Constraint, EqPredicate, OptionalLevel, Value};

/// Counter for component registration ids.
static COMPONENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Declaration of a variable: id, initial value, stay placement, equality.
#[derive(Clone)]
pub struct VariableDecl {
    pub id: VarId,
    pub init: Value,
    pub optional: OptionalLevel,
    pub eq: Option<EqPredicate>,
}

impl VariableDecl {
    pub fn new(id: impl Into<VarId>, init: Value) -> Self {
        Self {
            id: id.into(),
            init,
            optional: OptionalLevel::Default,
            eq: None,
        }
    }

    pub fn with_optional(mut self, level: OptionalLevel) -> Self {
        self.optional = level;
        self
    }

    pub fn with_eq(mut self, eq: EqPredicate) -> Self {
        self.eq = Some(eq);
        self
    }
}

impl std::fmt::Debug for VariableDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableDecl")
            .field("id", &self.id)
            .field("init", &self.init)
            .field("optional", &self.optional)
            .finish()
    }
}

/// A declared element being added.
#[derive(Debug, Clone)]
pub enum Element {
    Variable(VariableDecl),
    Constraint(Constraint),
    Output(VarId),
    TouchDep(ConstraintId, ConstraintId),
}

/// A declared element being removed, by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementRef {
    Variable(VarId),
    Constraint(ConstraintId),
    Output(VarId),
    TouchDep(ConstraintId, ConstraintId),
}

/// Composition diff handed to the model. Removes apply before adds.
#[derive(Debug, Default)]
pub struct ComponentChanges {
    pub adds: Vec<Element>,
    pub removes: Vec<ElementRef>,
}

/// Composition as last reported to the model.
#[derive(Debug, Clone, Default)]
struct Composition {
    variables: IndexSet<VarId>,
    constraints: IndexSet<ConstraintId>,
    /// Output multiset: variable -> declared count.
    outputs: HashMap<VarId, usize>,
    touch_deps: IndexSet<(ConstraintId, ConstraintId)>,
}

struct ComponentInner {
    variables: IndexMap<VarId, VariableDecl>,
    constraints: IndexMap<ConstraintId, Constraint>,
    outputs: Vec<VarId>,
    touch_deps: IndexSet<(ConstraintId, ConstraintId)>,
    reported: Composition,
    listeners: Vec<Arc<dyn Fn() + Send + Sync>>,
}

/// A user-facing composition container.
///
/// Cloning a `Component` produces another handle to the same contents.
pub struct Component {
    id: u64,
    inner: Arc<RwLock<ComponentInner>>,
}

impl Component {
    pub fn new() -> Self {
        Self {
            id: COMPONENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            inner: Arc::new(RwLock::new(ComponentInner {
                variables: IndexMap::new(),
                constraints: IndexMap::new(),
                outputs: Vec::new(),
                touch_deps: IndexSet::new(),
                reported: Composition::default(),
                listeners: Vec::new(),
            })),
        }
    }

    /// Registration id used by the model's pending sets.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Register a composition-change listener (the model's hook).
    pub(crate) fn on_change(&self, listener: Arc<dyn Fn() + Send + Sync>) {
        self.inner
            .write()
            .expect("component lock poisoned")
            .listeners
            .push(listener);
    }

    pub(crate) fn clear_listeners(&self) {
        self.inner
            .write()
            .expect("component lock poisoned")
            .listeners
            .clear();
    }

    fn notify(&self) {
        let listeners: Vec<Arc<dyn Fn() + Send + Sync>> = self
            .inner
            .read()
            .expect("component lock poisoned")
            .listeners
            .iter()
            .cloned()
            .collect();
        for listener in listeners {
            listener();
        }
    }

    pub fn add_variable(&self, decl: VariableDecl) {
        self.inner
            .write()
            .expect("component lock poisoned")
            .variables
            .insert(decl.id.clone(), decl);
        self.notify();
    }

    pub fn remove_variable(&self, vid: &VarId) {
        self.inner
            .write()
            .expect("component lock poisoned")
            .variables
            .shift_remove(vid);
        self.notify();
    }

    pub fn add_constraint(&self, constraint: Constraint) {
        self.inner
            .write()
            .expect("component lock poisoned")
            .constraints
            .insert(constraint.id().clone(), constraint);
        self.notify();
    }

    pub fn remove_constraint(&self, cid: &ConstraintId) {
        self.inner
            .write()
            .expect("component lock poisoned")
            .constraints
            .shift_remove(cid);
        self.notify();
    }

    pub fn add_output(&self, vid: impl Into<VarId>) {
        self.inner
            .write()
            .expect("component lock poisoned")
            .outputs
            .push(vid.into());
        self.notify();
    }

    pub fn remove_output(&self, vid: &VarId) {
        let mut inner = self.inner.write().expect("component lock poisoned");
        if let Some(pos) = inner.outputs.iter().position(|v| v == vid) {
            inner.outputs.remove(pos);
        }
        drop(inner);
        self.notify();
    }

    pub fn add_touch_dependency(
        &self,
        from: impl Into<ConstraintId>,
        to: impl Into<ConstraintId>,
    ) {
        self.inner
            .write()
            .expect("component lock poisoned")
            .touch_deps
            .insert((from.into(), to.into()));
        self.notify();
    }

    pub fn remove_touch_dependency(&self, from: &ConstraintId, to: &ConstraintId) {
        self.inner
            .write()
            .expect("component lock poisoned")
            .touch_deps
            .shift_remove(&(from.clone(), to.clone()));
        self.notify();
    }

    /// Diff the current composition against what was last reported.
    ///
    /// Updates the reported snapshot; removes are listed before adds apply.
    pub fn report_updates(&self) -> ComponentChanges {
        let mut inner = self.inner.write().expect("component lock poisoned");
        let mut changes = ComponentChanges::default();

        // Removes: reported items no longer declared.
        for vid in &inner.reported.variables {
            if !inner.variables.contains_key(vid) {
                changes.removes.push(ElementRef::Variable(vid.clone()));
            }
        }
        for cid in &inner.reported.constraints {
            if !inner.constraints.contains_key(cid) {
                changes.removes.push(ElementRef::Constraint(cid.clone()));
            }
        }
        let mut current_outputs: HashMap<VarId, usize> = HashMap::new();
        for vid in &inner.outputs {
            *current_outputs.entry(vid.clone()).or_insert(0) += 1;
        }
        for (vid, reported_count) in &inner.reported.outputs {
            let current = current_outputs.get(vid).copied().unwrap_or(0);
            for _ in current..*reported_count {
                changes.removes.push(ElementRef::Output(vid.clone()));
            }
        }
        for (from, to) in &inner.reported.touch_deps {
            if !inner.touch_deps.contains(&(from.clone(), to.clone())) {
                changes
                    .removes
                    .push(ElementRef::TouchDep(from.clone(), to.clone()));
            }
        }

        // Adds: declared items not yet reported.
        for (vid, decl) in &inner.variables {
            if !inner.reported.variables.contains(vid) {
                changes.adds.push(Element::Variable(decl.clone()));
            }
        }
        for (cid, constraint) in &inner.constraints {
            if !inner.reported.constraints.contains(cid) {
                changes.adds.push(Element::Constraint(constraint.clone()));
            }
        }
        for (vid, current) in &current_outputs {
            let reported = inner.reported.outputs.get(vid).copied().unwrap_or(0);
            for _ in reported..*current {
                changes.adds.push(Element::Output(vid.clone()));
            }
        }
        for (from, to) in &inner.touch_deps {
            if !inner.reported.touch_deps.contains(&(from.clone(), to.clone())) {
                changes
                    .adds
                    .push(Element::TouchDep(from.clone(), to.clone()));
            }
        }

        inner.reported = Composition {
            variables: inner.variables.keys().cloned().collect(),
            constraints: inner.constraints.keys().cloned().collect(),
            outputs: current_outputs,
            touch_deps: inner.touch_deps.clone(),
        };

        changes
    }

    /// Everything last reported, as removes. Used when the component is
    /// detached from a model; the reported snapshot is cleared.
    pub(crate) fn retract_all(&self) -> Vec<ElementRef> {
        let mut inner = self.inner.write().expect("component lock poisoned");
        let mut removes = Vec::new();
        for (from, to) in &inner.reported.touch_deps {
            removes.push(ElementRef::TouchDep(from.clone(), to.clone()));
        }
        for (vid, count) in &inner.reported.outputs {
            for _ in 0..*count {
                removes.push(ElementRef::Output(vid.clone()));
            }
        }
        for cid in &inner.reported.constraints {
            removes.push(ElementRef::Constraint(cid.clone()));
        }
        for vid in &inner.reported.variables {
            removes.push(ElementRef::Variable(vid.clone()));
        }
        inner.reported = Composition::default();
        removes
    }
}

impl Clone for Component {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for Component {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("component lock poisoned");
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("variables", &inner.variables.len())
            .field("constraints", &inner.constraints.len())
            .field("outputs", &inner.outputs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::{Method, MethodValue};
    use std::sync::atomic::AtomicI32;

    fn constraint(id: &str) -> Constraint {
        Constraint::builder(id)
            .method(
                Method::builder(format!("{id}!m"))
                    .input("a")
                    .output("b")
                    .body(|inputs| vec![MethodValue::Ready(inputs[0].clone())])
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn first_report_lists_everything_as_adds() {
        let component = Component::new();
        component.add_variable(VariableDecl::new("a", Value::from(0i64)));
        component.add_variable(VariableDecl::new("b", Value::from(0i64)));
        component.add_constraint(constraint("c"));
        component.add_output("b");

        let changes = component.report_updates();
        assert!(changes.removes.is_empty());
        assert_eq!(changes.adds.len(), 4);
    }

    #[test]
    fn second_report_is_empty_when_unchanged() {
        let component = Component::new();
        component.add_variable(VariableDecl::new("a", Value::from(0i64)));
        component.report_updates();

        let changes = component.report_updates();
        assert!(changes.adds.is_empty());
        assert!(changes.removes.is_empty());
    }

    #[test]
    fn removal_is_diffed() {
        let component = Component::new();
        component.add_variable(VariableDecl::new("a", Value::from(0i64)));
        component.add_output("a");
        component.report_updates();

        component.remove_output(&VarId::new("a"));
        component.remove_variable(&VarId::new("a"));

        let changes = component.report_updates();
        assert!(changes.adds.is_empty());
        assert_eq!(changes.removes.len(), 2);
        assert!(changes.removes.contains(&ElementRef::Variable(VarId::new("a"))));
        assert!(changes.removes.contains(&ElementRef::Output(VarId::new("a"))));
    }

    #[test]
    fn outputs_are_refcounted_in_diffs() {
        let component = Component::new();
        component.add_output("a");
        component.add_output("a");
        let changes = component.report_updates();
        assert_eq!(changes.adds.len(), 2);

        component.remove_output(&VarId::new("a"));
        let changes = component.report_updates();
        assert_eq!(changes.removes.len(), 1);
    }

    #[test]
    fn listeners_fire_on_mutation() {
        let component = Component::new();
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        component.on_change(Arc::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        component.add_variable(VariableDecl::new("a", Value::Null));
        component.add_output("a");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn retract_all_reverses_the_reported_composition() {
        let component = Component::new();
        component.add_variable(VariableDecl::new("a", Value::Null));
        component.add_constraint(constraint("c"));
        component.report_updates();

        let removes = component.retract_all();
        assert_eq!(removes.len(), 2);
        // Constraints retract before variables.
        assert!(matches!(removes[0], ElementRef::Constraint(_)));
        assert!(matches!(removes[1], ElementRef::Variable(_)));

        // Nothing reported anymore: next report re-adds everything.
        let changes = component.report_updates();
        assert_eq!(changes.adds.len(), 2);
    }
}
