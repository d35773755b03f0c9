//! Property Model
//!
//! The model is the engine's facade and update loop. It owns the constraint
//! graph, the planner, the variable and constraint registries, the pending
//! sets, and the `solved` signal, and it drives the plan → schedule →
//! evaluate → relabel pipeline once per batched update.
//!
//! # How Updates Work
//!
//! 1. Any mutation (edit, touch, add/remove, component change) records a
//!    change: `solved` drops to false and one update task is scheduled at
//!    [`SYSTEM_UPDATE_PRIORITY`]. Mutations between ticks coalesce.
//!
//! 2. The update drains component diffs, re-plans over the constraints
//!    needing enforcement, snapshots the topological order, rebuilds the
//!    stay-priority list, refreshes source flags, then evaluates the
//!    constraints needing evaluation and relabels enablement.
//!
//! 3. `solved` returns to true once no variable is pending and no update is
//!    queued. Asynchronous method outputs keep it false until they settle.
//!
//! # Thread Safety
//!
//! All state sits behind one lock; scheduled tasks and promise settlements
//! re-enter through a weak handle. The engine is logically single-threaded:
//! everything serializes through the model's inner lock and the cooperative
//! scheduler.

mod component;

use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::graph::{toposort, CachingConstraintGraph, ConstraintGraph};
use crate::ids::{ConstraintId, MethodId, VarId};
use crate::plan::{new_planner, Planner, PlannerKind};
use crate::reactive::{Scheduler, Signal, SIGNAL_PRIORITY, SYSTEM_UPDATE_PRIORITY};
use crate::solver::{do_promotions, evaluate, EnablementAnalyzer, PendingSets, TouchDeps};
use crate::vars::{
    Constraint, OptionalLevel, Promise, Settled, SettleOutcome, Value, Variable,
};

pub use component::{Component, ComponentChanges, Element, ElementRef, VariableDecl};

/// Global configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub default_planner: PlannerKind,
    /// Forward a newly emerging source's value downstream in the same
    /// update.
    pub forward_emerging_sources: bool,
    /// Schedule an update on every recorded change (disable for manual
    /// driving in tests).
    pub schedule_update_on_change: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_planner: PlannerKind::default(),
            forward_emerging_sources: false,
            schedule_update_on_change: true,
        }
    }
}

/// Out-of-band engine events surfaced to the user.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    /// Required constraints could not all be enforced; the previous solution
    /// is retained and `solved` stays false.
    NoSolution { unenforced: Vec<ConstraintId> },
}

/// Read-only snapshot of the constraint graph.
#[derive(Debug, Clone, Serialize)]
pub struct CGraphSnapshot {
    pub variables: Vec<VarId>,
    pub methods: Vec<MethodSnapshot>,
    pub constraints: Vec<ConstraintSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodSnapshot {
    pub id: MethodId,
    pub constraint: ConstraintId,
    /// Inputs with their prior flags.
    pub inputs: Vec<(VarId, bool)>,
    pub outputs: Vec<VarId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstraintSnapshot {
    pub id: ConstraintId,
    pub methods: Vec<MethodId>,
}

/// Read-only snapshot of the solution graph.
#[derive(Debug, Clone, Serialize)]
pub struct SGraphSnapshot {
    pub selections: Vec<(ConstraintId, MethodId)>,
}

/// Re-entry handle for scheduled tasks and promise settlements.
#[derive(Clone)]
struct ModelCtx {
    weak: Weak<RwLock<ModelInner>>,
    scheduler: Scheduler,
}

struct ModelInner {
    config: ModelConfig,
    cgraph: CachingConstraintGraph,
    planner: Box<dyn Planner>,
    variables: IndexMap<VarId, Variable>,
    constraints: IndexMap<ConstraintId, Constraint>,
    /// Output refcounts.
    outputs: IndexMap<VarId, usize>,
    touch_deps: TouchDeps,
    components: IndexMap<u64, Component>,
    pending: PendingSets,
    analyzer: EnablementAnalyzer,
    /// Topological order snapshot from the last successful plan.
    topomids: Vec<MethodId>,
    pending_count: i64,
    solved_state: bool,
    update_scheduled: bool,
    relabel_needed: bool,
    solved: Signal<bool>,
    events: Signal<ModelEvent>,
}

/// The property model: a multi-way dataflow constraint system.
///
/// Cloning a `PropertyModel` produces another handle to the same engine.
pub struct PropertyModel {
    inner: Arc<RwLock<ModelInner>>,
    scheduler: Scheduler,
}

impl PropertyModel {
    pub fn new() -> Self {
        Self::with_config(ModelConfig::default())
    }

    pub fn with_config(config: ModelConfig) -> Self {
        let scheduler = Scheduler::new();
        let solved = Signal::with_value(scheduler.clone(), true);
        let events = Signal::new(scheduler.clone());
        let planner = new_planner(config.default_planner);

        let inner = ModelInner {
            config,
            cgraph: CachingConstraintGraph::new(),
            planner,
            variables: IndexMap::new(),
            constraints: IndexMap::new(),
            outputs: IndexMap::new(),
            touch_deps: TouchDeps::new(),
            components: IndexMap::new(),
            pending: PendingSets::new(),
            analyzer: EnablementAnalyzer::new(),
            topomids: Vec::new(),
            pending_count: 0,
            solved_state: true,
            update_scheduled: false,
            relabel_needed: false,
            solved,
            events,
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
            scheduler,
        }
    }

    fn ctx(&self) -> ModelCtx {
        ModelCtx {
            weak: Arc::downgrade(&self.inner),
            scheduler: self.scheduler.clone(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ModelInner> {
        self.inner.write().expect("model lock poisoned")
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ModelInner> {
        self.inner.read().expect("model lock poisoned")
    }

    /// The cooperative scheduler driving this model.
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    /// Drain the scheduler: deliver signals and run any queued update.
    pub fn drain(&self) {
        self.scheduler.run_until_idle();
    }

    /// Force a synchronous update, then drain the scheduler.
    pub fn update(&self) {
        let ctx = self.ctx();
        self.write().perform_update(&ctx);
        self.scheduler.run_until_idle();
    }

    /// The scheduled `solved` signal.
    pub fn solved(&self) -> Signal<bool> {
        self.read().solved.clone()
    }

    /// Engine events (no-solution and the like).
    pub fn events(&self) -> Signal<ModelEvent> {
        self.read().events.clone()
    }

    /// Whether the model is currently solved.
    pub fn is_solved(&self) -> bool {
        self.read().solved_state
    }

    /// A handle to a registered variable.
    pub fn variable(&self, vid: &VarId) -> Option<Variable> {
        self.read().variables.get(vid).cloned()
    }

    /// Convenience: a registered variable's current value.
    pub fn value(&self, vid: &VarId) -> Option<Value> {
        self.read().variables.get(vid).map(|v| v.value())
    }

    // ------------------------------------------------------------------
    // Direct mutators
    // ------------------------------------------------------------------

    pub fn add_variable(&self, decl: VariableDecl) {
        let ctx = self.ctx();
        self.write().apply_add_variable(decl, &ctx);
    }

    pub fn remove_variable(&self, vid: &VarId) {
        let ctx = self.ctx();
        self.write().apply_remove_variable(vid, &ctx);
    }

    pub fn add_constraint(&self, constraint: Constraint) {
        let ctx = self.ctx();
        self.write().apply_add_constraint(constraint, &ctx);
    }

    pub fn remove_constraint(&self, cid: &ConstraintId) {
        let ctx = self.ctx();
        self.write().apply_remove_constraint(cid, &ctx);
    }

    /// Declare a variable as an output. Outputs are refcounted.
    pub fn add_output(&self, vid: impl Into<VarId>) {
        let ctx = self.ctx();
        self.write().apply_add_output(vid.into(), &ctx);
    }

    pub fn remove_output(&self, vid: &VarId) {
        let ctx = self.ctx();
        self.write().apply_remove_output(vid, &ctx);
    }

    pub fn add_touch_dependency(
        &self,
        from: impl Into<ConstraintId>,
        to: impl Into<ConstraintId>,
    ) {
        self.write()
            .touch_deps
            .entry(from.into())
            .or_default()
            .insert(to.into());
    }

    pub fn remove_touch_dependency(&self, from: &ConstraintId, to: &ConstraintId) {
        let mut inner = self.write();
        if let Some(tos) = inner.touch_deps.get_mut(from) {
            tos.shift_remove(to);
        }
    }

    /// Connect every ordered pair in `set` with a touch dependency.
    pub fn add_touch_set(&self, set: &[ConstraintId]) {
        let mut inner = self.write();
        for from in set {
            for to in set {
                if from != to {
                    inner
                        .touch_deps
                        .entry(from.clone())
                        .or_default()
                        .insert(to.clone());
                }
            }
        }
    }

    pub fn remove_touch_set(&self, set: &[ConstraintId]) {
        let mut inner = self.write();
        for from in set {
            for to in set {
                if let Some(tos) = inner.touch_deps.get_mut(from) {
                    tos.shift_remove(to);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    pub fn add_component(&self, component: &Component) {
        let ctx = self.ctx();
        let id = component.id();
        let listener_ctx = ctx.clone();
        component.on_change(Arc::new(move || {
            if let Some(inner) = listener_ctx.weak.upgrade() {
                let mut inner = inner.write().expect("model lock poisoned");
                inner.pending.need_updating.insert(id);
                inner.record_change(&listener_ctx);
            }
        }));

        let mut inner = self.write();
        inner.components.insert(id, component.clone());
        inner.pending.need_updating.insert(id);
        inner.record_change(&ctx);
    }

    pub fn remove_component(&self, component: &Component) {
        let ctx = self.ctx();
        component.clear_listeners();
        let removes = component.retract_all();

        let mut inner = self.write();
        inner.components.shift_remove(&component.id());
        for element in removes {
            inner.apply_element_remove(element, &ctx);
        }
        inner.record_change(&ctx);
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    /// Set a variable's value.
    ///
    /// An edit whose value equals the current one degrades to a touch:
    /// strengths are promoted but nothing re-evaluates.
    pub fn edit(&self, vid: impl Into<VarId>, value: impl Into<Value>) {
        let ctx = self.ctx();
        self.write().apply_edit(vid.into(), value.into(), &ctx);
    }

    /// Touch a variable: promote its stay (and touch dependencies) without
    /// changing its value.
    pub fn touch(&self, vid: &VarId) {
        let ctx = self.ctx();
        self.write().apply_touch(vid, &ctx);
    }

    // ------------------------------------------------------------------
    // Planner
    // ------------------------------------------------------------------

    /// Replace the planner, carrying the strength order across and
    /// re-marking every constraint for enforcement.
    pub fn switch_to_new_planner(&self, kind: PlannerKind) {
        let ctx = self.ctx();
        let mut inner = self.write();
        let optionals = inner.planner.optionals();
        let mut planner = new_planner(kind);
        planner.set_optionals(optionals);
        inner.planner = planner;
        inner.topomids.clear();
        let all: Vec<ConstraintId> = inner.cgraph.constraints();
        inner.pending.need_enforcing.extend(all);
        inner.record_change(&ctx);
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Snapshot of the planner's optional strength order, weakest first.
    pub fn strength_order(&self) -> Vec<ConstraintId> {
        self.read().planner.optionals()
    }

    /// Read-only snapshot of the constraint graph.
    pub fn cgraph(&self) -> CGraphSnapshot {
        let inner = self.read();
        let methods = inner
            .cgraph
            .methods()
            .into_iter()
            .filter_map(|mid| {
                let constraint = inner.cgraph.constraint_for_method(&mid)?;
                Some(MethodSnapshot {
                    inputs: inner
                        .cgraph
                        .inputs_for(&mid)
                        .into_iter()
                        .map(|i| (i.variable, i.prior))
                        .collect(),
                    outputs: inner.cgraph.outputs_for(&mid),
                    id: mid,
                    constraint,
                })
            })
            .collect();
        CGraphSnapshot {
            variables: inner.cgraph.variables(),
            constraints: inner
                .cgraph
                .constraints()
                .into_iter()
                .map(|cid| ConstraintSnapshot {
                    methods: inner.cgraph.methods_of(&cid),
                    id: cid,
                })
                .collect(),
            methods,
        }
    }

    /// Read-only snapshot of the solution graph.
    pub fn sgraph(&self) -> SGraphSnapshot {
        let inner = self.read();
        SGraphSnapshot {
            selections: inner
                .planner
                .sgraph()
                .selections()
                .map(|(c, m)| (c.clone(), m.clone()))
                .collect(),
        }
    }
}

impl Clone for PropertyModel {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl Default for PropertyModel {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Update loop
// ----------------------------------------------------------------------------

impl ModelInner {
    /// Note a change: drop `solved` and schedule one batched update.
    fn record_change(&mut self, ctx: &ModelCtx) {
        if self.solved_state {
            self.solved_state = false;
            self.solved.emit(false);
        }
        if self.config.schedule_update_on_change && !self.update_scheduled {
            self.update_scheduled = true;
            let task_ctx = ctx.clone();
            ctx.scheduler.schedule(SYSTEM_UPDATE_PRIORITY, move || {
                if let Some(inner) = task_ctx.weak.upgrade() {
                    let mut inner = inner.write().expect("model lock poisoned");
                    inner.perform_update(&task_ctx);
                }
            });
        }
    }

    /// One full update: drain components, plan, evaluate, raise `solved`.
    fn perform_update(&mut self, ctx: &ModelCtx) {
        self.update_scheduled = false;

        // 1. Drain component composition diffs; removes before adds.
        let component_ids = std::mem::take(&mut self.pending.need_updating);
        for id in component_ids {
            let Some(component) = self.components.get(&id).cloned() else {
                continue;
            };
            let changes = component.report_updates();
            for element in changes.removes {
                self.apply_element_remove(element, ctx);
            }
            for element in changes.adds {
                self.apply_element_add(element, ctx);
            }
        }

        // 2. Plan over the constraints needing enforcement.
        if !self.pending.need_enforcing.is_empty() {
            let changed = std::mem::take(&mut self.pending.need_enforcing);
            let previous: IndexMap<ConstraintId, MethodId> = self
                .planner
                .sgraph()
                .selections()
                .map(|(c, m)| (c.clone(), m.clone()))
                .collect();

            if !self.planner.plan(&self.cgraph, &changed) {
                let unenforced: Vec<ConstraintId> = self
                    .constraints
                    .values()
                    .filter(|c| {
                        c.is_required()
                            && self.planner.sgraph().selected_method(c.id()).is_none()
                    })
                    .map(|c| c.id().clone())
                    .collect();
                warn!(?unenforced, "no solution: required constraints unenforceable");
                self.events.emit(ModelEvent::NoSolution { unenforced });
                // Restore so a later mutation retries.
                self.pending.need_enforcing = changed;
                return;
            }

            self.after_plan(&previous);
        }

        // 3. Evaluate.
        if !self.pending.need_evaluating.is_empty() {
            let seeds = std::mem::take(&mut self.pending.need_evaluating);
            self.analyzer.begin_pass();
            let evaluation = evaluate(
                &self.cgraph,
                self.planner.sgraph(),
                &self.topomids,
                &self.variables,
                &self.constraints,
                &seeds,
            );
            for activation in &evaluation.activations {
                self.analyzer.method_scheduled(activation);
            }
            self.pending_count += evaluation.pending_delta;

            for (vid, generation, promise) in evaluation.pending_hooks {
                let hook_ctx = ctx.clone();
                promise.on_settled(move |outcome: &Settled| {
                    let outcome = outcome.clone();
                    let task_ctx = hook_ctx.clone();
                    hook_ctx.scheduler.schedule(SIGNAL_PRIORITY, move || {
                        if let Some(inner) = task_ctx.weak.upgrade() {
                            let mut inner = inner.write().expect("model lock poisoned");
                            inner.on_variable_settled(&vid, generation, outcome, &task_ctx);
                        }
                    });
                });
            }
            self.relabel_needed = true;
        }

        if self.relabel_needed {
            let outputs: Vec<VarId> = self
                .outputs
                .iter()
                .flat_map(|(vid, count)| std::iter::repeat(vid.clone()).take(*count))
                .collect();
            self.analyzer.relabel(
                &self.cgraph,
                self.planner.sgraph(),
                &self.topomids,
                &outputs,
                &self.variables,
            );
            self.relabel_needed = false;
        }

        // 4. Raise solved: no variable pending and no further update queued.
        if self.pending_count == 0 && !self.update_scheduled && !self.solved_state {
            self.solved_state = true;
            self.solved.emit(true);
        }
    }

    /// Post-plan bookkeeping: topological snapshot, stay priorities,
    /// superseded promises, source flags, emerging sources, evaluation
    /// marks for reselected constraints.
    fn after_plan(&mut self, previous: &IndexMap<ConstraintId, MethodId>) {
        let compare = |a: &ConstraintId, b: &ConstraintId| self.planner.compare(a, b);
        self.topomids = toposort(&self.cgraph, self.planner.sgraph(), &compare);

        // Stay-priority rebuild: scan the topological order in reverse so
        // downstream stays end weakest and sources end strongest.
        let mut priorities: Vec<ConstraintId> = Vec::new();
        for mid in self.topomids.iter().rev() {
            let Some(cid) = self.cgraph.constraint_for_method(mid) else {
                continue;
            };
            let optional = cid.is_stay()
                || self
                    .constraints
                    .get(&cid)
                    .map(|c| c.optional() != OptionalLevel::Default)
                    .unwrap_or(false);
            if optional && !priorities.contains(&cid) {
                priorities.push(cid);
            }
        }
        self.planner.set_optionals(priorities);

        // Superseded promises, source flags, emerging sources.
        let mut dropped_pending = 0i64;
        let mut emerging: Vec<VarId> = Vec::new();
        {
            let sg = self.planner.sgraph();
            for (vid, variable) in &self.variables {
                if variable.has_promise() {
                    let superseded = match variable.promise_origin() {
                        Some(mid) => !sg.is_selected(&mid),
                        None => sg.selected_method(&vid.stay_constraint()).is_none(),
                    };
                    if superseded && variable.drop_promise() {
                        dropped_pending += 1;
                    }
                }

                let now_source = sg.selected_method(&vid.stay_constraint()).is_some();
                if now_source && !variable.is_source() && self.config.forward_emerging_sources
                {
                    emerging.push(vid.clone());
                }
                variable.set_source(now_source);
            }
        }
        self.pending_count -= dropped_pending;

        for vid in emerging {
            if let Some(variable) = self.variables.get(&vid) {
                variable.install_promise(Promise::resolved(variable.value()), None);
                if variable.mark_pending() {
                    self.pending_count += 1;
                }
            }
            self.pending.need_evaluating.insert(vid.stay_constraint());
        }

        // A constraint whose selection changed must re-run its method.
        let reselected: Vec<ConstraintId> = self
            .planner
            .sgraph()
            .selections()
            .filter(|(cid, mid)| !mid.is_stay() && previous.get(*cid) != Some(*mid))
            .map(|(cid, _)| cid.clone())
            .collect();
        for cid in reselected {
            self.pending.need_evaluating.insert(cid);
        }
    }

    /// An asynchronous method output settled.
    fn on_variable_settled(
        &mut self,
        vid: &VarId,
        generation: u64,
        outcome: Settled,
        ctx: &ModelCtx,
    ) {
        let Some(variable) = self.variables.get(vid).cloned() else {
            return;
        };

        match variable.apply_settled(generation, outcome) {
            SettleOutcome::Stale => {}
            SettleOutcome::Applied {
                changed,
                was_pending,
            } => {
                if was_pending {
                    self.pending_count -= 1;
                }
                if changed {
                    // Downstream of this variable recomputes next update.
                    self.pending.need_evaluating.insert(vid.stay_constraint());
                    self.record_change(ctx);
                }
                if self.pending_count == 0
                    && !self.update_scheduled
                    && self.pending.is_empty()
                    && !self.solved_state
                {
                    self.solved_state = true;
                    self.solved.emit(true);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Element application
    // ------------------------------------------------------------------

    fn apply_element_add(&mut self, element: Element, ctx: &ModelCtx) {
        match element {
            Element::Variable(decl) => self.apply_add_variable(decl, ctx),
            Element::Constraint(constraint) => self.apply_add_constraint(constraint, ctx),
            Element::Output(vid) => self.apply_add_output(vid, ctx),
            Element::TouchDep(from, to) => {
                self.touch_deps.entry(from).or_default().insert(to);
            }
        }
    }

    fn apply_element_remove(&mut self, element: ElementRef, ctx: &ModelCtx) {
        match element {
            ElementRef::Variable(vid) => self.apply_remove_variable(&vid, ctx),
            ElementRef::Constraint(cid) => self.apply_remove_constraint(&cid, ctx),
            ElementRef::Output(vid) => self.apply_remove_output(&vid, ctx),
            ElementRef::TouchDep(from, to) => {
                if let Some(tos) = self.touch_deps.get_mut(&from) {
                    tos.shift_remove(&to);
                }
            }
        }
    }

    fn apply_add_variable(&mut self, decl: VariableDecl, ctx: &ModelCtx) {
        if self.variables.contains_key(&decl.id) {
            return;
        }

        let vid = decl.id.clone();
        let mut variable =
            Variable::new(vid.clone(), decl.init, &ctx.scheduler).with_optional(decl.optional);
        if let Some(eq) = decl.eq {
            variable = variable.with_eq(eq);
        }
        self.variables.insert(vid.clone(), variable);
        self.cgraph.add_variable(vid.clone());

        // Every variable gets its implicit stay.
        let stay = Constraint::stay(&vid, decl.optional);
        for method in stay.methods() {
            self.cgraph.add_method(
                method.id().clone(),
                stay.id().clone(),
                method.inputs().to_vec(),
                method.outputs().to_vec(),
            );
        }
        match stay.optional() {
            OptionalLevel::Min => self.planner.set_min_strength(stay.id().clone()),
            _ => self.planner.set_max_strength(stay.id().clone()),
        }
        self.pending.need_enforcing.insert(stay.id().clone());
        self.constraints.insert(stay.id().clone(), stay);
        self.record_change(ctx);
    }

    fn apply_remove_variable(&mut self, vid: &VarId, ctx: &ModelCtx) {
        if !self.variables.contains_key(vid) {
            return;
        }
        let stay_cid = vid.stay_constraint();
        let in_use = self
            .cgraph
            .constraints_which_use(vid)
            .into_iter()
            .any(|cid| cid != stay_cid);
        if in_use {
            // Caller retains responsibility for removal ordering.
            return;
        }

        self.apply_remove_constraint(&stay_cid, ctx);
        self.cgraph.remove_variable(vid);
        if let Some(variable) = self.variables.shift_remove(vid) {
            if variable.drop_promise() {
                self.pending_count -= 1;
            }
        }
        if self.outputs.shift_remove(vid).is_some() {
            self.relabel_needed = true;
        }
        self.record_change(ctx);
    }

    fn apply_add_constraint(&mut self, constraint: Constraint, ctx: &ModelCtx) {
        let cid = constraint.id().clone();
        if self.constraints.contains_key(&cid) {
            return;
        }
        for vid in constraint.variables() {
            if !self.variables.contains_key(vid) {
                warn!(constraint = %cid, variable = %vid, "constraint references unknown variable; dropped");
                return;
            }
        }

        for method in constraint.methods() {
            self.cgraph.add_method(
                method.id().clone(),
                cid.clone(),
                method.inputs().to_vec(),
                method.outputs().to_vec(),
            );
        }
        match constraint.optional() {
            OptionalLevel::Max => self.planner.set_max_strength(cid.clone()),
            OptionalLevel::Min => self.planner.set_min_strength(cid.clone()),
            OptionalLevel::Default => {}
        }
        if let Some(touch_vars) = constraint.touch_variables() {
            for tv in touch_vars {
                self.touch_deps
                    .entry(tv.stay_constraint())
                    .or_default()
                    .insert(cid.clone());
            }
        }
        self.pending.need_enforcing.insert(cid.clone());
        self.constraints.insert(cid, constraint);
        self.record_change(ctx);
    }

    fn apply_remove_constraint(&mut self, cid: &ConstraintId, ctx: &ModelCtx) {
        let Some(constraint) = self.constraints.shift_remove(cid) else {
            return;
        };
        for method in constraint.methods() {
            self.cgraph.remove_method(method.id());
        }
        self.planner.remove_optional(cid);
        self.touch_deps.shift_remove(cid);
        for tos in self.touch_deps.values_mut() {
            tos.shift_remove(cid);
        }
        self.pending.need_enforcing.insert(cid.clone());
        self.record_change(ctx);
    }

    fn apply_add_output(&mut self, vid: VarId, ctx: &ModelCtx) {
        *self.outputs.entry(vid).or_insert(0) += 1;
        self.relabel_needed = true;
        self.record_change(ctx);
    }

    fn apply_remove_output(&mut self, vid: &VarId, ctx: &ModelCtx) {
        if let Some(count) = self.outputs.get_mut(vid) {
            *count -= 1;
            if *count == 0 {
                self.outputs.shift_remove(vid);
            }
            self.relabel_needed = true;
            self.record_change(ctx);
        }
    }

    // ------------------------------------------------------------------
    // Edits and touches
    // ------------------------------------------------------------------

    /// Promote a variable's stay and propagate touch dependencies; mark
    /// promoted-but-unselected constraints for enforcement.
    fn promote(&mut self, vid: &VarId) {
        let origin = vid.stay_constraint();
        let collected = do_promotions(
            &origin,
            &self.touch_deps,
            &self.constraints,
            self.planner.as_mut(),
        );
        for cid in collected {
            if self.planner.sgraph().selected_method(&cid).is_none() {
                self.pending.need_enforcing.insert(cid);
            }
        }
    }

    fn apply_edit(&mut self, vid: VarId, value: Value, ctx: &ModelCtx) {
        let Some(variable) = self.variables.get(&vid).cloned() else {
            warn!(variable = %vid, "edit of unknown variable ignored");
            return;
        };

        let touched_only = !variable.is_pending()
            && variable.values_equal(&variable.value(), &value);

        self.promote(&vid);

        if !touched_only {
            variable.install_promise(Promise::resolved(value), None);
            if variable.mark_pending() {
                self.pending_count += 1;
            }
            self.pending.need_evaluating.insert(vid.stay_constraint());
        }
        self.record_change(ctx);
    }

    fn apply_touch(&mut self, vid: &VarId, ctx: &ModelCtx) {
        if !self.variables.contains_key(vid) {
            warn!(variable = %vid, "touch of unknown variable ignored");
            return;
        }
        self.promote(vid);
        self.record_change(ctx);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::{Method, MethodValue};

    fn vid(v: &str) -> VarId {
        VarId::new(v)
    }

    fn ready_int(n: i64) -> Vec<MethodValue> {
        vec![MethodValue::Ready(Value::from(n))]
    }

    fn offset_constraint(id: &str, a: &str, b: &str, offset: i64) -> Constraint {
        let forward = Method::builder(format!("{id}!{a}->{b}"))
            .input(a)
            .output(b)
            .body(move |inputs| ready_int(inputs[0].as_int().unwrap_or(0) + offset))
            .build()
            .unwrap();
        let backward = Method::builder(format!("{id}!{b}->{a}"))
            .input(b)
            .output(a)
            .body(move |inputs| ready_int(inputs[0].as_int().unwrap_or(0) - offset))
            .build()
            .unwrap();
        Constraint::builder(id)
            .method(forward)
            .method(backward)
            .build()
            .unwrap()
    }

    fn model_ab() -> PropertyModel {
        let model = PropertyModel::new();
        model.add_variable(VariableDecl::new("a", Value::from(0i64)));
        model.add_variable(VariableDecl::new("b", Value::from(0i64)));
        model.add_constraint(offset_constraint("c1", "a", "b", 1));
        model.update();
        model
    }

    #[test]
    fn initial_update_solves() {
        let model = model_ab();
        assert!(model.is_solved());
        // c1 enforced in some direction.
        let sgraph = model.sgraph();
        assert!(sgraph
            .selections
            .iter()
            .any(|(cid, _)| cid == &ConstraintId::new("c1")));
    }

    #[test]
    fn edit_recomputes_downstream() {
        let model = model_ab();
        model.edit("a", 10i64);
        assert!(!model.is_solved());
        model.update();

        assert_eq!(model.value(&vid("a")), Some(Value::from(10i64)));
        assert_eq!(model.value(&vid("b")), Some(Value::from(11i64)));
        assert!(model.is_solved());
    }

    #[test]
    fn reverse_edit_flips_dataflow() {
        let model = model_ab();
        model.edit("a", 10i64);
        model.update();
        model.edit("b", 100i64);
        model.update();

        assert_eq!(model.value(&vid("b")), Some(Value::from(100i64)));
        assert_eq!(model.value(&vid("a")), Some(Value::from(99i64)));
        let a = model.variable(&vid("a")).unwrap();
        let b = model.variable(&vid("b")).unwrap();
        assert!(b.is_source());
        assert!(!a.is_source());
    }

    #[test]
    fn coalesced_edits_apply_last_value() {
        let model = model_ab();
        model.edit("a", 1i64);
        model.edit("a", 2i64);
        model.edit("a", 3i64);
        model.update();

        assert_eq!(model.value(&vid("a")), Some(Value::from(3i64)));
        assert_eq!(model.value(&vid("b")), Some(Value::from(4i64)));
    }

    #[test]
    fn solved_signal_round_trips() {
        let model = model_ab();
        let seen = Arc::new(RwLock::new(Vec::new()));
        let seen_clone = seen.clone();
        model.solved().subscribe(move |s: &bool| {
            seen_clone.write().unwrap().push(*s);
        });
        model.drain();

        model.edit("a", 5i64);
        model.drain();

        let observed = seen.read().unwrap().clone();
        // Replay true, then false on edit, then true after the scheduled
        // update completes.
        assert_eq!(observed.first(), Some(&true));
        assert!(observed.contains(&false));
        assert_eq!(observed.last(), Some(&true));
        assert!(model.is_solved());
    }

    #[test]
    fn scheduled_update_runs_from_drain() {
        let model = model_ab();
        model.edit("a", 7i64);
        // No explicit update: drain runs the scheduled one.
        model.drain();
        assert_eq!(model.value(&vid("b")), Some(Value::from(8i64)));
        assert!(model.is_solved());
    }

    #[test]
    fn unknown_edit_is_ignored() {
        let model = model_ab();
        model.edit("nope", 1i64);
        model.update();
        assert!(model.is_solved());
    }

    #[test]
    fn remove_constraint_restores_stays() {
        let model = model_ab();
        model.edit("a", 10i64);
        model.update();

        model.remove_constraint(&ConstraintId::new("c1"));
        model.update();

        // Both variables are now independent sources.
        assert!(model.variable(&vid("a")).unwrap().is_source());
        assert!(model.variable(&vid("b")).unwrap().is_source());
        model.edit("a", 42i64);
        model.update();
        assert_eq!(model.value(&vid("b")), Some(Value::from(11i64)));
    }

    #[test]
    fn remove_variable_in_use_is_noop() {
        let model = model_ab();
        model.remove_variable(&vid("a"));
        model.update();
        assert!(model.variable(&vid("a")).is_some());

        model.remove_constraint(&ConstraintId::new("c1"));
        model.update();
        model.remove_variable(&vid("a"));
        model.update();
        assert!(model.variable(&vid("a")).is_none());
    }

    #[test]
    fn no_solution_keeps_previous_values_and_stays_unsolved() {
        let model = model_ab();
        model.edit("a", 10i64);
        model.update();

        let seen = Arc::new(RwLock::new(Vec::new()));
        let seen_clone = seen.clone();
        model.events().subscribe(move |e: &ModelEvent| {
            seen_clone.write().unwrap().push(e.clone());
        });

        // Two required constraints that both insist on writing a and b.
        let pin_a = Method::builder("pa").output("a").body(|_| ready_int(1)).build().unwrap();
        let pin_b = Method::builder("pb").output("b").body(|_| ready_int(2)).build().unwrap();
        let c2 = Constraint::builder("c2").method(pin_a).build().unwrap();
        let c3 = Constraint::builder("c3").method(pin_b).build().unwrap();
        model.add_constraint(c2);
        model.add_constraint(c3);
        // c1 (two-way) + pins on both of its variables is unsatisfiable.
        model.update();

        assert!(!model.is_solved());
        assert!(matches!(
            seen.read().unwrap().last(),
            Some(ModelEvent::NoSolution { .. })
        ));
        // Previous solved values retained.
        assert_eq!(model.value(&vid("a")), Some(Value::from(10i64)));
        assert_eq!(model.value(&vid("b")), Some(Value::from(11i64)));
    }

    #[test]
    fn switch_planner_preserves_behavior() {
        let model = model_ab();
        model.edit("b", 50i64);
        model.update();

        model.switch_to_new_planner(PlannerKind::QuickPlanner);
        model.update();
        assert!(model.is_solved());

        // b's stay is still strongest: dataflow stays reversed.
        assert_eq!(model.value(&vid("a")), Some(Value::from(49i64)));
        let b = model.variable(&vid("b")).unwrap();
        assert!(b.is_source());
    }
}
