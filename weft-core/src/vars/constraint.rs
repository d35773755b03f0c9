//! Constraints
//!
//! A constraint owns an ordered set of alternative methods, each writing a
//! different subset of the constraint's variables. The planner selects at
//! most one method per enforceable constraint.
//!
//! A constraint's optional level places it in the planner's strength order:
//! `Default` means *required* — the planner must enforce it or report
//! failure — while `Max`/`Min` mean optional, initially placed at the strong
//! or weak end of the optional order. Every variable's implicit stay
//! constraint is optional.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::SpecError;
use crate::ids::{ConstraintId, MethodId, VarId};
use crate::vars::method::Method;

/// Strength placement of an optional constraint.
///
/// `Default` marks a constraint as required (not part of the optional
/// order at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionalLevel {
    Max,
    Min,
    Default,
}

/// A validated constraint declaration.
#[derive(Debug, Clone)]
pub struct Constraint {
    id: ConstraintId,
    methods: Vec<Method>,
    variables: IndexSet<VarId>,
    optional: OptionalLevel,
    touch_variables: Option<IndexSet<VarId>>,
}

impl Constraint {
    /// Start building a constraint.
    pub fn builder(id: impl Into<ConstraintId>) -> ConstraintSpec {
        ConstraintSpec::new(id)
    }

    /// The implicit stay constraint for a variable.
    ///
    /// One stay method, optional at the variable's level (`Default` maps to
    /// `Max`: an edit should win over everything the user left alone, and a
    /// stay must never be required).
    pub fn stay(variable: &VarId, level: OptionalLevel) -> Self {
        let optional = match level {
            OptionalLevel::Min => OptionalLevel::Min,
            _ => OptionalLevel::Max,
        };
        let mut variables = IndexSet::new();
        variables.insert(variable.clone());
        Self {
            id: variable.stay_constraint(),
            methods: vec![Method::stay(variable)],
            variables,
            optional,
            touch_variables: None,
        }
    }

    pub fn id(&self) -> &ConstraintId {
        &self.id
    }

    /// Alternative methods in declaration order.
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Look up one of this constraint's methods by id.
    pub fn method(&self, mid: &MethodId) -> Option<&Method> {
        self.methods.iter().find(|m| m.id() == mid)
    }

    /// Union of variables touched by any method.
    pub fn variables(&self) -> &IndexSet<VarId> {
        &self.variables
    }

    pub fn optional(&self) -> OptionalLevel {
        self.optional
    }

    /// Whether the planner must enforce this constraint.
    pub fn is_required(&self) -> bool {
        self.optional == OptionalLevel::Default && !self.is_stay()
    }

    /// Whether this is a variable's implicit stay constraint.
    pub fn is_stay(&self) -> bool {
        self.id.is_stay()
    }

    /// Touch variables, if declared.
    pub fn touch_variables(&self) -> Option<&IndexSet<VarId>> {
        self.touch_variables.as_ref()
    }
}

/// Builder for [`Constraint`].
pub struct ConstraintSpec {
    id: ConstraintId,
    methods: Vec<Method>,
    optional: OptionalLevel,
    touch_variables: Option<IndexSet<VarId>>,
}

impl ConstraintSpec {
    pub fn new(id: impl Into<ConstraintId>) -> Self {
        Self {
            id: id.into(),
            methods: Vec::new(),
            optional: OptionalLevel::Default,
            touch_variables: None,
        }
    }

    /// Add an alternative method. Declaration order is the planner's
    /// tie-break order.
    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Set the optional level (`Default` = required).
    pub fn optional(mut self, level: OptionalLevel) -> Self {
        self.optional = level;
        self
    }

    /// Declare touch variables for this constraint.
    pub fn touch_variables<I, V>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<VarId>,
    {
        self.touch_variables = Some(variables.into_iter().map(Into::into).collect());
        self
    }

    /// Validate and build the constraint.
    pub fn build(self) -> Result<Constraint, SpecError> {
        if self.methods.is_empty() {
            return Err(SpecError::NoMethods {
                constraint: self.id,
            });
        }

        let mut variables = IndexSet::new();
        for method in &self.methods {
            for input in method.inputs() {
                variables.insert(input.variable.clone());
            }
            for output in method.outputs() {
                variables.insert(output.clone());
            }
        }

        Ok(Constraint {
            id: self.id,
            methods: self.methods,
            variables,
            optional: self.optional,
            touch_variables: self.touch_variables,
        })
    }
}
