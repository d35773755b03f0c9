//! Subscriber identifiers for the reactive system.
//!
//! A subscriber is any observer attached to a signal. Subscriptions are
//! identified so they can be removed without holding on to the callback.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a signal subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}
