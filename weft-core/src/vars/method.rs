//! Methods
//!
//! A method is one alternative way of satisfying a constraint: it reads a
//! subset of the constraint's variables and computes the rest. The body is
//! opaque to the engine — it receives the current input values and returns
//! one slot per declared output, each either an immediate value or a pending
//! promise.
//!
//! An input may carry a *prior* flag: the method reads the variable's
//! previous value, so the read does not order the method after the
//! variable's writer and is exempt from the self-cycle check.

use std::sync::Arc;

use crate::error::SpecError;
use crate::ids::{ConstraintId, MethodId, VarId};
use crate::vars::promise::Promise;
use crate::vars::value::Value;

/// One declared input of a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInput {
    pub variable: VarId,
    /// Read the variable's previous value; exempt from ordering and the
    /// self-cycle check.
    pub prior: bool,
}

/// One output slot produced by a method body.
pub enum MethodValue {
    /// The output is available now.
    Ready(Value),
    /// The output will settle later; the engine marks the variable pending.
    Deferred(Promise),
}

/// The opaque method body: input values in declaration order, one
/// [`MethodValue`] per declared output.
pub type MethodFn = Arc<dyn Fn(&[Value]) -> Vec<MethodValue> + Send + Sync>;

/// A validated method declaration.
#[derive(Clone)]
pub struct Method {
    id: MethodId,
    inputs: Vec<MethodInput>,
    outputs: Vec<VarId>,
    body: MethodFn,
}

impl Method {
    /// Start building a method.
    pub fn builder(id: impl Into<MethodId>) -> MethodSpec {
        MethodSpec::new(id)
    }

    /// The implicit stay method for a variable: no inputs, one output.
    ///
    /// Stay methods are never invoked — the evaluator skips them — so the
    /// body is a placeholder.
    pub fn stay(variable: &VarId) -> Self {
        Self {
            id: variable.stay_method(),
            inputs: Vec::new(),
            outputs: vec![variable.clone()],
            body: Arc::new(|_| Vec::new()),
        }
    }

    pub fn id(&self) -> &MethodId {
        &self.id
    }

    pub fn inputs(&self) -> &[MethodInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[VarId] {
        &self.outputs
    }

    /// Whether this is a stay method.
    pub fn is_stay(&self) -> bool {
        self.id.is_stay()
    }

    /// Invoke the body with the given input values.
    pub fn invoke(&self, inputs: &[Value]) -> Vec<MethodValue> {
        (self.body)(inputs)
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("id", &self.id)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

/// Builder for [`Method`], validating the declaration on `build`.
pub struct MethodSpec {
    id: MethodId,
    inputs: Vec<MethodInput>,
    outputs: Vec<VarId>,
    body: Option<MethodFn>,
}

impl MethodSpec {
    pub fn new(id: impl Into<MethodId>) -> Self {
        Self {
            id: id.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            body: None,
        }
    }

    /// Declare an input read as the variable's current value.
    pub fn input(mut self, variable: impl Into<VarId>) -> Self {
        self.inputs.push(MethodInput {
            variable: variable.into(),
            prior: false,
        });
        self
    }

    /// Declare an input read as the variable's *prior* value.
    pub fn prior_input(mut self, variable: impl Into<VarId>) -> Self {
        self.inputs.push(MethodInput {
            variable: variable.into(),
            prior: true,
        });
        self
    }

    /// Declare an output.
    pub fn output(mut self, variable: impl Into<VarId>) -> Self {
        self.outputs.push(variable.into());
        self
    }

    /// Attach the method body.
    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn(&[Value]) -> Vec<MethodValue> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    /// Validate and build the method.
    ///
    /// Rejects duplicate outputs and inputs that are also outputs without
    /// the prior flag.
    pub fn build(self) -> Result<Method, SpecError> {
        if self.outputs.is_empty() {
            return Err(SpecError::NoOutputs { method: self.id });
        }

        for (i, out) in self.outputs.iter().enumerate() {
            if self.outputs[..i].contains(out) {
                return Err(SpecError::DuplicateOutput {
                    method: self.id.clone(),
                    variable: out.clone(),
                });
            }
        }

        for input in &self.inputs {
            if !input.prior && self.outputs.contains(&input.variable) {
                return Err(SpecError::InputIsOutput {
                    method: self.id.clone(),
                    variable: input.variable.clone(),
                });
            }
        }

        let body = self.body.ok_or(SpecError::MissingBody {
            method: self.id.clone(),
        })?;

        Ok(Method {
            id: self.id,
            inputs: self.inputs,
            outputs: self.outputs,
            body,
        })
    }
}

/// Record of one method execution, handed to the enablement analyzer.
#[derive(Debug, Clone)]
pub struct Activation {
    pub constraint: ConstraintId,
    pub method: MethodId,
    /// Inputs as declared, with the values the body consumed.
    pub inputs: Vec<(MethodInput, Value)>,
    /// One promise per declared output, in declaration order.
    pub outputs: Vec<(VarId, Promise)>,
}
