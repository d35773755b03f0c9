//! Constraint and Solution Graphs
//!
//! This module implements the structural half of the engine:
//!
//! - The *constraint graph* is the full bipartite declaration: variables and
//!   methods, with methods grouped into constraints. It only records shape —
//!   no values, no selection.
//! - The *solution graph* is the planner's output: one selected method per
//!   enforceable constraint, forming an acyclic dataflow.
//! - The *topological scheduler* turns a solution graph into an evaluation
//!   order, breaking ties by constraint strength.
//!
//! # Design Decisions
//!
//! 1. The graphs store ids only; the registries owning variables and
//!    constraints live in the model. This keeps every graph query cheap to
//!    snapshot and the planner free of value-level concerns.
//!
//! 2. Reverse adjacency (`constraints_which_use`) is memoized and
//!    invalidated on every mutation, since planning issues it repeatedly
//!    against an unchanged graph.
//!
//! 3. Prior-flagged reads are invisible to the walkers and the scheduler:
//!    a method reading a *previous* value does not depend on that value's
//!    writer.

mod cgraph;
mod sgraph;
mod toposort;

pub use cgraph::{CachingConstraintGraph, ConstraintGraph};
pub use sgraph::{downstream_methods, downstream_variables, SolutionGraph};
pub use toposort::{toposort, StrengthCompare};
