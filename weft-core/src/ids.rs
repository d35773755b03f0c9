//! Identifiers
//!
//! Variables, methods, and constraints are identified by stable string ids
//! chosen by the caller. Ids are newtypes over `Arc<str>` so handles clone
//! cheaply and hash without allocating.
//!
//! Every variable owns an implicit *stay* constraint (one method, no inputs,
//! one output) that keeps it at its current value. Stay ids are derived from
//! the variable id with a reserved suffix, so the mapping between a variable
//! and its stay works in both directions without a lookup table.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Suffix appended to a variable id to form its stay constraint id.
const STAY_SUFFIX: &str = "#stay";

/// Suffix appended to a variable id to form its stay method id.
const STAY_METHOD_SUFFIX: &str = "#stay!m";

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            /// Create an id from any string-like value.
            pub fn new(id: impl AsRef<str>) -> Self {
                Self(Arc::from(id.as_ref()))
            }

            /// Get the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(Arc::from(id))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:?})"), &*self.0)
            }
        }
    };
}

string_id! {
    /// Identifier of a variable.
    VarId
}

string_id! {
    /// Identifier of a method.
    MethodId
}

string_id! {
    /// Identifier of a constraint.
    ConstraintId
}

impl VarId {
    /// The id of this variable's implicit stay constraint.
    pub fn stay_constraint(&self) -> ConstraintId {
        ConstraintId::new(format!("{}{}", self.0, STAY_SUFFIX))
    }

    /// The id of this variable's implicit stay method.
    pub fn stay_method(&self) -> MethodId {
        MethodId::new(format!("{}{}", self.0, STAY_METHOD_SUFFIX))
    }
}

impl ConstraintId {
    /// Whether this id names a stay constraint.
    pub fn is_stay(&self) -> bool {
        self.0.ends_with(STAY_SUFFIX)
    }

    /// The variable whose stay this is, if this id names a stay constraint.
    pub fn stay_variable(&self) -> Option<VarId> {
        self.0.strip_suffix(STAY_SUFFIX).map(VarId::new)
    }
}

impl MethodId {
    /// Whether this id names a stay method.
    pub fn is_stay(&self) -> bool {
        self.0.ends_with(STAY_METHOD_SUFFIX)
    }
}
