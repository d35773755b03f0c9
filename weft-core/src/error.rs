//! Error types for the constraint engine.
//!
//! The engine distinguishes misuse (malformed declarations, reported and
//! dropped), structural errors (silent no-ops), method runtime failures
//! (propagated into variable signals), and unenforceable required
//! constraints (a no-solution outcome carried on the model's event signal).
//! None of them leave the engine in an unusable state.

use crate::ids::{ConstraintId, MethodId, VarId};

/// Misuse detected while building a method or constraint declaration.
///
/// Declarations that fail validation are reported through the diagnostic
/// channel (`tracing::warn!`) and dropped; the engine continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("method {method}: output variable {variable} declared more than once")]
    DuplicateOutput { method: MethodId, variable: VarId },

    #[error("method {method}: variable {variable} is both input and output without a prior flag")]
    InputIsOutput { method: MethodId, variable: VarId },

    #[error("method {method}: body missing")]
    MissingBody { method: MethodId },

    #[error("method {method}: no output variables declared")]
    NoOutputs { method: MethodId },

    #[error("constraint {constraint}: no methods declared")]
    NoMethods { constraint: ConstraintId },
}

/// Runtime failure of a method activation.
///
/// Clonable so a single failure can be broadcast into the exposed signal of
/// every output variable the activation promised to write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MethodError {
    /// The method's promise was rejected.
    #[error("method {method} rejected: {reason}")]
    Rejected { method: MethodId, reason: String },

    /// The method body returned the wrong number of output slots.
    #[error("method {method} produced {got} outputs, declared {declared}")]
    BadArity {
        method: MethodId,
        declared: usize,
        got: usize,
    },
}
