//! Variables
//!
//! A Variable holds a current value plus the planner- and evaluator-facing
//! bookkeeping: the pending flag (an edit or upstream method has not yet
//! committed), the source flag (its stay is selected — the variable is a
//! dataflow root), the enablement labels, and an optional attached promise.
//!
//! The exposed value is observable through a [`Signal`] carrying
//! `Result<Value, MethodError>`: committed values arrive as `Ok`, method
//! runtime failures as `Err`. An equality predicate suppresses no-op
//! emissions.
//!
//! # Promise Slot
//!
//! At most one promise is attached at a time. Installing a new promise
//! *supersedes* the previous one: the generation counter advances and any
//! late settlement of the old promise is dropped for this variable.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::ids::{MethodId, VarId};
use crate::reactive::{Scheduler, Signal};
use crate::vars::constraint::OptionalLevel;
use crate::vars::promise::{Promise, Settled};
use crate::vars::value::{EqPredicate, Value};

/// Three-valued truth used by the enablement analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fuzzy {
    Yes,
    Maybe,
    No,
}

struct VarState {
    value: Value,
    optional: OptionalLevel,
    pending: bool,
    source: bool,
    contributing: Fuzzy,
    relevant: Fuzzy,
    eq: Option<EqPredicate>,
    /// Attached promise, if an edit or method activation is in flight.
    promise: Option<Promise>,
    /// Method whose activation installed the promise; `None` for edits.
    origin: Option<MethodId>,
    /// Advances whenever the promise slot changes; guards late settlements.
    generation: u64,
}

/// Outcome of committing a variable's attached promise.
#[derive(Debug)]
pub(crate) enum CommitOutcome {
    /// No promise was attached.
    Noop,
    /// The promise had settled; the outcome was applied and the slot cleared.
    Committed { changed: bool, was_pending: bool },
    /// The promise is still pending; the variable is now marked pending.
    StillPending {
        newly_pending: bool,
        generation: u64,
        promise: Promise,
    },
}

/// Outcome of applying an asynchronous settlement.
#[derive(Debug)]
pub(crate) enum SettleOutcome {
    /// The settlement belonged to a superseded promise; dropped.
    Stale,
    Applied { changed: bool, was_pending: bool },
}

/// A variable handle.
///
/// Cloning a `Variable` produces another handle to the same state.
pub struct Variable {
    id: VarId,
    state: Arc<RwLock<VarState>>,
    signal: Signal<Settled>,
}

impl Variable {
    /// Create a variable with an initial value.
    pub fn new(id: impl Into<VarId>, init: Value, scheduler: &Scheduler) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(RwLock::new(VarState {
                value: init.clone(),
                optional: OptionalLevel::Default,
                pending: false,
                source: false,
                contributing: Fuzzy::No,
                relevant: Fuzzy::No,
                eq: None,
                promise: None,
                origin: None,
                generation: 0,
            })),
            signal: Signal::with_value(scheduler.clone(), Ok(init)),
        }
    }

    /// Set the optional level used when placing this variable's stay.
    pub fn with_optional(self, level: OptionalLevel) -> Self {
        self.state.write().expect("variable lock poisoned").optional = level;
        self
    }

    /// Attach a custom equality predicate.
    pub fn with_eq(self, eq: EqPredicate) -> Self {
        self.state.write().expect("variable lock poisoned").eq = Some(eq);
        self
    }

    pub fn id(&self) -> &VarId {
        &self.id
    }

    /// The current exposed value.
    pub fn value(&self) -> Value {
        self.state
            .read()
            .expect("variable lock poisoned")
            .value
            .clone()
    }

    pub fn optional(&self) -> OptionalLevel {
        self.state.read().expect("variable lock poisoned").optional
    }

    /// Whether an edit or upstream method has not yet committed.
    pub fn is_pending(&self) -> bool {
        self.state.read().expect("variable lock poisoned").pending
    }

    /// Whether this variable's stay is selected (a dataflow root).
    pub fn is_source(&self) -> bool {
        self.state.read().expect("variable lock poisoned").source
    }

    pub fn contributing(&self) -> Fuzzy {
        self.state
            .read()
            .expect("variable lock poisoned")
            .contributing
    }

    pub fn relevant(&self) -> Fuzzy {
        self.state.read().expect("variable lock poisoned").relevant
    }

    /// The exposed value stream: `Ok` on commit, `Err` on method failure.
    pub fn signal(&self) -> &Signal<Settled> {
        &self.signal
    }

    /// Check two values for equality under this variable's predicate.
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        let state = self.state.read().expect("variable lock poisoned");
        match &state.eq {
            Some(eq) => eq(a, b),
            None => a == b,
        }
    }

    pub(crate) fn set_source(&self, source: bool) {
        self.state.write().expect("variable lock poisoned").source = source;
    }

    pub(crate) fn set_labels(&self, contributing: Fuzzy, relevant: Fuzzy) {
        let mut state = self.state.write().expect("variable lock poisoned");
        state.contributing = contributing;
        state.relevant = relevant;
    }

    /// The method whose promise is currently attached, if any.
    pub(crate) fn promise_origin(&self) -> Option<MethodId> {
        self.state
            .read()
            .expect("variable lock poisoned")
            .origin
            .clone()
    }

    pub(crate) fn has_promise(&self) -> bool {
        self.state
            .read()
            .expect("variable lock poisoned")
            .promise
            .is_some()
    }

    /// Attach a promise, superseding any previous one.
    ///
    /// Returns the new generation; settlements carrying an older generation
    /// are dropped.
    pub(crate) fn install_promise(
        &self,
        promise: Promise,
        origin: Option<MethodId>,
    ) -> u64 {
        let mut state = self.state.write().expect("variable lock poisoned");
        state.generation += 1;
        state.promise = Some(promise);
        state.origin = origin;
        state.generation
    }

    /// Mark the variable pending.
    ///
    /// Returns true if it was not already pending; the caller owns the
    /// pending-count bookkeeping.
    pub(crate) fn mark_pending(&self) -> bool {
        let mut state = self.state.write().expect("variable lock poisoned");
        let newly = !state.pending;
        state.pending = true;
        newly
    }

    /// Detach the attached promise without applying it.
    ///
    /// Returns true if the variable was pending (the caller owns the
    /// pending-count bookkeeping).
    pub(crate) fn drop_promise(&self) -> bool {
        let mut state = self.state.write().expect("variable lock poisoned");
        state.generation += 1;
        state.promise = None;
        state.origin = None;
        let was_pending = state.pending;
        state.pending = false;
        was_pending
    }

    /// Commit the attached promise.
    ///
    /// If settled, the outcome is applied to the exposed value and the slot
    /// cleared. If still pending, the variable is marked pending and the
    /// caller is handed the promise so it can register a settlement hook.
    pub(crate) fn commit_promise(&self) -> CommitOutcome {
        let (apply, outcome) = {
            let mut state = self.state.write().expect("variable lock poisoned");
            let Some(promise) = state.promise.clone() else {
                return CommitOutcome::Noop;
            };

            match promise.settled() {
                Some(settled) => {
                    state.promise = None;
                    state.origin = None;
                    let was_pending = state.pending;
                    state.pending = false;
                    (Some((settled, was_pending)), None)
                }
                None => {
                    let newly_pending = !state.pending;
                    state.pending = true;
                    (
                        None,
                        Some(CommitOutcome::StillPending {
                            newly_pending,
                            generation: state.generation,
                            promise,
                        }),
                    )
                }
            }
        };

        match (apply, outcome) {
            (Some((settled, was_pending)), _) => {
                let changed = self.apply(settled);
                CommitOutcome::Committed {
                    changed,
                    was_pending,
                }
            }
            (None, Some(outcome)) => outcome,
            _ => unreachable!("commit_promise covers both arms"),
        }
    }

    /// Apply an asynchronous settlement that arrived for `generation`.
    pub(crate) fn apply_settled(&self, generation: u64, settled: Settled) -> SettleOutcome {
        let was_pending = {
            let mut state = self.state.write().expect("variable lock poisoned");
            if state.generation != generation || state.promise.is_none() {
                return SettleOutcome::Stale;
            }
            state.promise = None;
            state.origin = None;
            let was_pending = state.pending;
            state.pending = false;
            was_pending
        };

        let changed = self.apply(settled);
        SettleOutcome::Applied {
            changed,
            was_pending,
        }
    }

    /// Apply a settled outcome to the exposed value.
    ///
    /// `Ok` values pass through the equality predicate to suppress no-op
    /// emissions; `Err` outcomes leave the value in place and surface the
    /// error on the signal.
    fn apply(&self, settled: Settled) -> bool {
        match settled {
            Ok(new_value) => {
                let changed = {
                    let mut state = self.state.write().expect("variable lock poisoned");
                    let equal = match &state.eq {
                        Some(eq) => eq(&state.value, &new_value),
                        None => state.value == new_value,
                    };
                    if !equal {
                        state.value = new_value.clone();
                    }
                    !equal
                };
                if changed {
                    self.signal.emit(Ok(new_value));
                }
                changed
            }
            Err(error) => {
                self.signal.emit(Err(error));
                false
            }
        }
    }
}

impl Clone for Variable {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            state: Arc::clone(&self.state),
            signal: self.signal.clone(),
        }
    }
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().expect("variable lock poisoned");
        f.debug_struct("Variable")
            .field("id", &self.id)
            .field("value", &state.value)
            .field("pending", &state.pending)
            .field("source", &state.source)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MethodError;
    use std::sync::Mutex;

    fn variable(init: i64) -> (Variable, Scheduler) {
        let scheduler = Scheduler::new();
        let v = Variable::new("v", Value::from(init), &scheduler);
        (v, scheduler)
    }

    #[test]
    fn commit_of_resolved_promise_updates_value() {
        let (v, _s) = variable(0);
        v.install_promise(Promise::resolved(Value::from(5i64)), None);

        match v.commit_promise() {
            CommitOutcome::Committed { changed, .. } => assert!(changed),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(v.value(), Value::from(5i64));
        assert!(!v.is_pending());
    }

    #[test]
    fn commit_suppresses_no_op_update() {
        let (v, scheduler) = variable(5);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        v.signal().subscribe(move |outcome: &Settled| {
            seen_clone.lock().unwrap().push(outcome.clone());
        });
        scheduler.run_until_idle();
        let replayed = seen.lock().unwrap().len();

        v.install_promise(Promise::resolved(Value::from(5i64)), None);
        match v.commit_promise() {
            CommitOutcome::Committed { changed, .. } => assert!(!changed),
            other => panic!("unexpected outcome: {other:?}"),
        }
        scheduler.run_until_idle();
        assert_eq!(seen.lock().unwrap().len(), replayed);
    }

    #[test]
    fn commit_of_pending_promise_marks_pending() {
        let (v, _s) = variable(0);
        let promise = Promise::new();
        v.install_promise(promise.clone(), None);

        match v.commit_promise() {
            CommitOutcome::StillPending { newly_pending, .. } => assert!(newly_pending),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(v.is_pending());
        // Value unchanged until settlement.
        assert_eq!(v.value(), Value::from(0i64));
    }

    #[test]
    fn stale_settlement_is_dropped() {
        let (v, _s) = variable(0);
        let first = Promise::new();
        let generation = v.install_promise(first, None);

        // A newer promise supersedes the first.
        v.install_promise(Promise::new(), None);

        let outcome = v.apply_settled(generation, Ok(Value::from(7i64)));
        assert!(matches!(outcome, SettleOutcome::Stale));
        assert_eq!(v.value(), Value::from(0i64));
    }

    #[test]
    fn settlement_applies_for_current_generation() {
        let (v, _s) = variable(0);
        let promise = Promise::new();
        let generation = v.install_promise(promise, None);
        v.commit_promise();

        let outcome = v.apply_settled(generation, Ok(Value::from(7i64)));
        match outcome {
            SettleOutcome::Applied {
                changed,
                was_pending,
            } => {
                assert!(changed);
                assert!(was_pending);
            }
            SettleOutcome::Stale => panic!("settlement dropped"),
        }
        assert_eq!(v.value(), Value::from(7i64));
        assert!(!v.is_pending());
    }

    #[test]
    fn rejection_surfaces_on_signal_and_keeps_value() {
        let (v, scheduler) = variable(3);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        v.signal().subscribe(move |outcome: &Settled| {
            seen_clone.lock().unwrap().push(outcome.clone());
        });
        scheduler.run_until_idle();

        let promise = Promise::new();
        let generation = v.install_promise(promise, None);
        v.commit_promise();
        v.apply_settled(
            generation,
            Err(MethodError::Rejected {
                method: "m".into(),
                reason: "boom".into(),
            }),
        );
        scheduler.run_until_idle();

        assert_eq!(v.value(), Value::from(3i64));
        assert!(matches!(seen.lock().unwrap().last(), Some(Err(_))));
    }

    #[test]
    fn custom_eq_predicate_suppresses_updates() {
        let scheduler = Scheduler::new();
        // Compare floats with a tolerance.
        let v = Variable::new("v", Value::from(1.0), &scheduler).with_eq(Arc::new(
            |a: &Value, b: &Value| match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => (x - y).abs() < 1e-6,
                _ => a == b,
            },
        ));

        v.install_promise(Promise::resolved(Value::from(1.0 + 1e-9)), None);
        match v.commit_promise() {
            CommitOutcome::Committed { changed, .. } => assert!(!changed),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
