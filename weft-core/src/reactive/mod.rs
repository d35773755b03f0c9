//! Reactive Primitives
//!
//! This module implements the engine's reactive plumbing: broadcast signals
//! and the cooperative priority scheduler they propagate through.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal carries a stream of values to subscribers, replaying the latest
//! value on subscribe. Emission is *scheduled*: values are stored at once,
//! but subscribers are notified from the scheduler, and emissions between
//! ticks coalesce to the latest value.
//!
//! ## Scheduler
//!
//! The Scheduler is a single-threaded cooperative priority queue. Signal
//! propagation runs at priority 0; the batched model update at priority 1.
//! This ordering lets observers of one update settle completely before the
//! next update begins.
//!
//! Every observer in the engine is a strict consumer, never a producer, so
//! subscriber graphs cannot form cycles.

mod scheduler;
mod signal;
mod subscriber;

pub use scheduler::{Scheduler, SIGNAL_PRIORITY, SYSTEM_UPDATE_PRIORITY};
pub use signal::Signal;
pub use subscriber::SubscriberId;
