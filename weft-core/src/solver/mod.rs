//! Solving Pipeline
//!
//! The pieces the update loop drives once per batch:
//!
//! 1. `update` — pending-set bookkeeping and touch promotion,
//! 2. the planner (see [`crate::plan`]) re-selects methods,
//! 3. `evaluate` — runs the scheduled methods and commits their promises,
//! 4. `enablement` — relabels variables against the declared outputs.
//!
//! All three submodules are pure with respect to scheduling: they mutate
//! variables and planner state but never touch the cooperative scheduler.
//! The model (see [`crate::model`]) owns sequencing and the `solved` signal.

mod enablement;
mod evaluate;
mod update;

pub use enablement::{Enablement, EnablementAnalyzer};
pub use evaluate::{evaluate, Evaluation};
pub use update::{do_promotions, PendingSets, TouchDeps};
