//! Cooperative Scheduler
//!
//! The scheduler is a single-threaded priority task queue. All engine
//! activity that must not run re-entrantly — signal propagation, the batched
//! update loop, promise settlement — is funneled through it.
//!
//! # How It Works
//!
//! 1. Anyone holding a scheduler handle can enqueue a task at a priority.
//!
//! 2. `run_until_idle` drains the queue: lowest priority value first, FIFO
//!    within a priority. Tasks may enqueue further tasks; the drain continues
//!    until the queue is empty.
//!
//! 3. A re-entrant `run_until_idle` call (from inside a task) is a no-op;
//!    the outer drain picks up whatever the task enqueued.
//!
//! # Priorities
//!
//! Signal propagation runs at [`SIGNAL_PRIORITY`] (0). The batched model
//! update runs at [`SYSTEM_UPDATE_PRIORITY`] (1), so observers always see
//! values settled by the previous update before a new one starts.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

/// Priority of reactive signal propagation.
pub const SIGNAL_PRIORITY: u8 = 0;

/// Priority of the batched system update.
pub const SYSTEM_UPDATE_PRIORITY: u8 = 1;

/// A queued unit of work.
struct ScheduledTask {
    priority: u8,
    seq: u64,
    task: Box<dyn FnOnce() + Send>,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so lower (priority, seq) pops first.
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

/// The cooperative priority scheduler.
///
/// Cloning a `Scheduler` produces another handle to the same queue.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    queue: Mutex<BinaryHeap<ScheduledTask>>,
    seq: AtomicU64,
    draining: AtomicBool,
}

impl Scheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                queue: Mutex::new(BinaryHeap::new()),
                seq: AtomicU64::new(0),
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// Enqueue a task at the given priority.
    ///
    /// Tasks at the same priority run in the order they were enqueued.
    pub fn schedule<F>(&self, priority: u8, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let seq = self.inner.seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.inner
            .queue
            .lock()
            .expect("scheduler queue lock poisoned")
            .push(ScheduledTask {
                priority,
                seq,
                task: Box::new(task),
            });
    }

    /// Drain the queue, running tasks in priority order until it is empty.
    ///
    /// Re-entrant calls return immediately; the outermost drain handles any
    /// tasks enqueued by tasks.
    pub fn run_until_idle(&self) {
        if self.inner.draining.swap(true, AtomicOrdering::SeqCst) {
            return;
        }

        loop {
            let next = self
                .inner
                .queue
                .lock()
                .expect("scheduler queue lock poisoned")
                .pop();

            match next {
                Some(entry) => (entry.task)(),
                None => break,
            }
        }

        self.inner.draining.store(false, AtomicOrdering::SeqCst);
    }

    /// Check whether the queue is empty.
    pub fn is_idle(&self) -> bool {
        self.inner
            .queue
            .lock()
            .expect("scheduler queue lock poisoned")
            .is_empty()
    }

    /// Number of tasks currently queued.
    pub fn queued(&self) -> usize {
        self.inner
            .queue
            .lock()
            .expect("scheduler queue lock poisoned")
            .len()
    }
}

impl Clone for Scheduler {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn tasks_run_in_priority_order() {
        let scheduler = Scheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (priority, tag) in [(1u8, "update"), (0, "signal-a"), (0, "signal-b")] {
            let order = order.clone();
            scheduler.schedule(priority, move || {
                order.lock().unwrap().push(tag);
            });
        }

        scheduler.run_until_idle();

        let order = order.lock().unwrap();
        assert_eq!(*order, vec!["signal-a", "signal-b", "update"]);
    }

    #[test]
    fn tasks_may_enqueue_tasks() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicI32::new(0));

        let inner_count = count.clone();
        let inner_scheduler = scheduler.clone();
        scheduler.schedule(SIGNAL_PRIORITY, move || {
            inner_count.fetch_add(1, Ordering::SeqCst);
            let c = inner_count.clone();
            inner_scheduler.schedule(SIGNAL_PRIORITY, move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        });

        scheduler.run_until_idle();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn reentrant_drain_is_noop() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicI32::new(0));

        let inner_count = count.clone();
        let inner_scheduler = scheduler.clone();
        scheduler.schedule(SIGNAL_PRIORITY, move || {
            let c = inner_count.clone();
            inner_scheduler.schedule(SIGNAL_PRIORITY, move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
            // Draining from inside a task must not recurse.
            inner_scheduler.run_until_idle();
            assert_eq!(inner_count.load(Ordering::SeqCst), 0);
        });

        scheduler.run_until_idle();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fifo_within_priority() {
        let scheduler = Scheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            scheduler.schedule(SYSTEM_UPDATE_PRIORITY, move || {
                order.lock().unwrap().push(i);
            });
        }

        scheduler.run_until_idle();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
