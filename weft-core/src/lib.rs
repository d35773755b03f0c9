//! Weft Core
//!
//! This crate is the core runtime of Weft, a multi-way dataflow constraint
//! system ("property model"). It implements:
//!
//! - A bipartite constraint graph over variables and multi-method
//!   constraints, with cached adjacency queries
//! - An incremental retraction-based planner (QuickPlan) with a strength
//!   order over optional constraints
//! - A topological method scheduler with strength-based tie-breaks
//! - A promise-aware evaluator that never blocks on asynchronous methods
//! - Enablement analysis labelling variables against declared outputs
//! - A batched update loop driving plan → schedule → evaluate → relabel
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: broadcast signals and the cooperative priority scheduler
//! - `vars`: variables, methods, constraints, values, and promises
//! - `graph`: constraint graph, solution graph, and topological sorting
//! - `plan`: the planner trait, QuickPlan, and the strength order
//! - `solver`: evaluation, enablement analysis, and update bookkeeping
//! - `model`: the [`PropertyModel`] facade and component containers
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::{Constraint, Method, MethodValue, PropertyModel, Value, VariableDecl};
//!
//! let model = PropertyModel::new();
//! model.add_variable(VariableDecl::new("celsius", Value::from(0i64)));
//! model.add_variable(VariableDecl::new("fahrenheit", Value::from(32i64)));
//!
//! // One constraint, two methods: whichever end the user edits wins.
//! let c2f = Method::builder("c2f")
//!     .input("celsius")
//!     .output("fahrenheit")
//!     .body(|inputs| {
//!         let c = inputs[0].as_float().unwrap_or(0.0);
//!         vec![MethodValue::Ready(Value::from(c * 9.0 / 5.0 + 32.0))]
//!     })
//!     .build()?;
//! let f2c = Method::builder("f2c")
//!     .input("fahrenheit")
//!     .output("celsius")
//!     .body(|inputs| {
//!         let f = inputs[0].as_float().unwrap_or(0.0);
//!         vec![MethodValue::Ready(Value::from((f - 32.0) * 5.0 / 9.0))]
//!     })
//!     .build()?;
//! model.add_constraint(Constraint::builder("convert").method(c2f).method(f2c).build()?);
//!
//! model.edit("celsius", 100.0);
//! model.update();
//! // fahrenheit == 212.0
//! ```

pub mod error;
pub mod graph;
pub mod ids;
pub mod model;
pub mod plan;
pub mod reactive;
pub mod solver;
pub mod vars;

pub use error::{MethodError, SpecError};
pub use ids::{ConstraintId, MethodId, VarId};
pub use model::{
    CGraphSnapshot, Component, ComponentChanges, Element, ElementRef, ModelConfig, ModelEvent,
    PropertyModel, SGraphSnapshot, VariableDecl,
};
pub use plan::PlannerKind;
pub use reactive::{Scheduler, Signal, SIGNAL_PRIORITY, SYSTEM_UPDATE_PRIORITY};
pub use vars::{
    Constraint, Fuzzy, Method, MethodValue, OptionalLevel, Promise, Value, Variable,
};
