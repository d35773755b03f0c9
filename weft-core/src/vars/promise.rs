//! Promises
//!
//! A Promise is the engine's settle-once asynchronous value. Methods that
//! cannot produce an output synchronously return a pending promise; whoever
//! computes the value later resolves (or rejects) it, and registered
//! callbacks fire exactly once.
//!
//! # How Promises Work
//!
//! 1. A promise starts `Pending`, or is created already settled.
//!
//! 2. The first `resolve`/`reject` wins; later settlement attempts are
//!    silently ignored.
//!
//! 3. `on_settled` callbacks registered before settlement run at settlement
//!    time; callbacks registered after settlement run immediately.
//!
//! Callbacks are invoked with no promise lock held, so they may re-enter the
//! engine (typically by scheduling work on the cooperative scheduler).

use std::sync::{Arc, Mutex};

use crate::error::MethodError;
use crate::vars::value::Value;

/// Outcome of a settled promise.
pub type Settled = Result<Value, MethodError>;

type SettleCallback = Box<dyn FnOnce(&Settled) + Send>;

struct PromiseInner {
    state: Option<Settled>,
    callbacks: Vec<SettleCallback>,
}

/// A settle-once asynchronous value.
///
/// Cloning a `Promise` produces another handle to the same settlement.
pub struct Promise {
    inner: Arc<Mutex<PromiseInner>>,
}

impl Promise {
    /// Create a pending promise.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PromiseInner {
                state: None,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Create a promise already resolved with `value`.
    pub fn resolved(value: Value) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PromiseInner {
                state: Some(Ok(value)),
                callbacks: Vec::new(),
            })),
        }
    }

    /// Create a promise already rejected with `error`.
    pub fn rejected(error: MethodError) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PromiseInner {
                state: Some(Err(error)),
                callbacks: Vec::new(),
            })),
        }
    }

    /// Resolve the promise with a value.
    ///
    /// A no-op if the promise is already settled.
    pub fn resolve(&self, value: Value) {
        self.settle(Ok(value));
    }

    /// Reject the promise with an error.
    ///
    /// A no-op if the promise is already settled.
    pub fn reject(&self, error: MethodError) {
        self.settle(Err(error));
    }

    fn settle(&self, outcome: Settled) {
        let callbacks = {
            let mut inner = self.inner.lock().expect("promise lock poisoned");
            if inner.state.is_some() {
                return;
            }
            inner.state = Some(outcome.clone());
            std::mem::take(&mut inner.callbacks)
        };

        // Run callbacks with the lock released.
        for callback in callbacks {
            callback(&outcome);
        }
    }

    /// Whether the promise has settled.
    pub fn is_settled(&self) -> bool {
        self.inner
            .lock()
            .expect("promise lock poisoned")
            .state
            .is_some()
    }

    /// The settled outcome, if any.
    pub fn settled(&self) -> Option<Settled> {
        self.inner
            .lock()
            .expect("promise lock poisoned")
            .state
            .clone()
    }

    /// Register a callback to run once the promise settles.
    ///
    /// Runs immediately if the promise is already settled.
    pub fn on_settled<F>(&self, callback: F)
    where
        F: FnOnce(&Settled) + Send + 'static,
    {
        let mut inner = self.inner.lock().expect("promise lock poisoned");
        match inner.state.clone() {
            Some(outcome) => {
                drop(inner);
                callback(&outcome);
            }
            None => {
                inner.callbacks.push(Box::new(callback));
            }
        }
    }
}

impl Clone for Promise {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Promise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("settled", &self.settled())
            .finish()
    }
}
