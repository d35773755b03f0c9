//! Signal Implementation
//!
//! A Signal is the engine's outward-facing reactive primitive. It carries a
//! stream of values to subscribers and replays the latest value to anyone
//! who subscribes late.
//!
//! # How Signals Work
//!
//! 1. `emit` records the new value and schedules one propagation task on the
//!    cooperative scheduler at [`SIGNAL_PRIORITY`].
//!
//! 2. Multiple emits between scheduler ticks coalesce: subscribers observe
//!    only the latest value when the propagation task runs.
//!
//! 3. Subscribing replays the last emitted value immediately, so observers
//!    never miss state that settled before they attached.
//!
//! # Thread Safety
//!
//! The value and subscriber list are protected by a RwLock. Propagation runs
//! on the scheduler with no signal lock held, so subscribers may freely read
//! other signals or talk back to the model.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use super::scheduler::{Scheduler, SIGNAL_PRIORITY};
use super::subscriber::SubscriberId;

/// Counter for generating unique signal IDs.
static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique signal ID.
fn next_signal_id() -> u64 {
    SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct SignalInner<T> {
    /// Last emitted value, replayed to late subscribers.
    last: Option<T>,
    subscribers: Vec<(SubscriberId, Callback<T>)>,
    /// Whether a propagation task is already queued.
    emit_scheduled: bool,
}

/// A scheduled broadcast signal holding values of type T.
///
/// Cloning a `Signal` produces another handle to the same stream.
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: u64,
    inner: Arc<RwLock<SignalInner<T>>>,
    scheduler: Scheduler,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with no initial value.
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            id: next_signal_id(),
            inner: Arc::new(RwLock::new(SignalInner {
                last: None,
                subscribers: Vec::new(),
                emit_scheduled: false,
            })),
            scheduler,
        }
    }

    /// Create a new signal seeded with an initial value.
    ///
    /// The initial value is replayed to subscribers but not propagated as
    /// an emission.
    pub fn with_value(scheduler: Scheduler, value: T) -> Self {
        let signal = Self::new(scheduler);
        signal
            .inner
            .write()
            .expect("signal lock poisoned")
            .last = Some(value);
        signal
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The last emitted (or seeded) value, if any.
    pub fn get(&self) -> Option<T> {
        self.inner
            .read()
            .expect("signal lock poisoned")
            .last
            .clone()
    }

    /// Subscribe to the signal.
    ///
    /// If a value has already been emitted, the callback is invoked with it
    /// immediately (replay). Returns the id to pass to [`Signal::unsubscribe`].
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        let callback: Callback<T> = Arc::new(callback);

        let replay = {
            let mut inner = self.inner.write().expect("signal lock poisoned");
            inner.subscribers.push((id, Arc::clone(&callback)));
            inner.last.clone()
        };

        if let Some(value) = replay {
            callback(&value);
        }

        id
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner
            .write()
            .expect("signal lock poisoned")
            .subscribers
            .retain(|(sub, _)| *sub != id);
    }

    /// Emit a new value.
    ///
    /// The value is stored immediately; subscriber notification is scheduled
    /// on the cooperative scheduler. Consecutive emits before the scheduled
    /// tick collapse into a single notification carrying the latest value.
    pub fn emit(&self, value: T) {
        let schedule = {
            let mut inner = self.inner.write().expect("signal lock poisoned");
            inner.last = Some(value);
            if inner.emit_scheduled {
                false
            } else {
                inner.emit_scheduled = true;
                true
            }
        };

        if schedule {
            let weak: Weak<RwLock<SignalInner<T>>> = Arc::downgrade(&self.inner);
            self.scheduler.schedule(SIGNAL_PRIORITY, move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let (value, subscribers) = {
                    let mut inner = inner.write().expect("signal lock poisoned");
                    inner.emit_scheduled = false;
                    let value = inner.last.clone();
                    let subscribers: Vec<Callback<T>> = inner
                        .subscribers
                        .iter()
                        .map(|(_, cb)| Arc::clone(cb))
                        .collect();
                    (value, subscribers)
                };
                if let Some(value) = value {
                    for callback in subscribers {
                        callback(&value);
                    }
                }
            });
        }
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .read()
            .expect("signal lock poisoned")
            .subscribers
            .len()
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("last", &self.get())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn emit_is_scheduled_not_immediate() {
        let scheduler = Scheduler::new();
        let signal = Signal::new(scheduler.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        signal.subscribe(move |v: &i32| {
            seen_clone.lock().unwrap().push(*v);
        });

        signal.emit(1);
        assert!(seen.lock().unwrap().is_empty());

        scheduler.run_until_idle();
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn emits_between_ticks_coalesce() {
        let scheduler = Scheduler::new();
        let signal = Signal::new(scheduler.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        signal.subscribe(move |v: &i32| {
            seen_clone.lock().unwrap().push(*v);
        });

        signal.emit(1);
        signal.emit(2);
        signal.emit(3);
        scheduler.run_until_idle();

        // One notification, carrying the latest value.
        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }

    #[test]
    fn subscribe_replays_last_value() {
        let scheduler = Scheduler::new();
        let signal = Signal::new(scheduler.clone());

        signal.emit(42);
        scheduler.run_until_idle();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        signal.subscribe(move |v: &i32| {
            seen_clone.lock().unwrap().push(*v);
        });

        // Replay happens on subscribe, before any further emission.
        assert_eq!(*seen.lock().unwrap(), vec![42]);
    }

    #[test]
    fn with_value_seeds_replay() {
        let scheduler = Scheduler::new();
        let signal = Signal::with_value(scheduler.clone(), true);

        assert_eq!(signal.get(), Some(true));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        signal.subscribe(move |v: &bool| {
            seen_clone.lock().unwrap().push(*v);
        });
        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let scheduler = Scheduler::new();
        let signal = Signal::new(scheduler.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        let sub = signal.subscribe(move |v: &i32| {
            seen_clone.lock().unwrap().push(*v);
        });

        signal.emit(1);
        scheduler.run_until_idle();
        signal.unsubscribe(sub);
        signal.emit(2);
        scheduler.run_until_idle();

        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn clone_shares_stream() {
        let scheduler = Scheduler::new();
        let signal1 = Signal::new(scheduler.clone());
        let signal2 = signal1.clone();

        signal1.emit(7);
        scheduler.run_until_idle();

        assert_eq!(signal2.get(), Some(7));
        assert_eq!(signal1.id(), signal2.id());
    }
}
