//! Boundary with the remote debugger service
//!
//! The engine never speaks the wire protocol itself. Everything it needs from
//! the debugger is expressed by the [`DebuggerService`] trait:
//!
//! - [`DebuggerService::evaluate`] for one scoped expression
//! - bulk listings of package, argument and local variables
//!
//! How much of a value the service materializes in one call is bounded by a
//! [`LoadPolicy`]. Three standing policies are used:
//!
//! | policy        | follow ptrs | recurse | string | array | fields |
//! |---------------|-------------|---------|--------|-------|--------|
//! | `LONG`        | yes         | 1       | 64     | 16    | all    |
//! | `LONG_ARRAY`  | yes         | 1       | 64     | 64    | all    |
//! | `SHORT`       | no          | 0       | 64     | 0     | 3      |
//!
//! [`replay::ReplayService`] is an offline implementation backed by a recorded
//! session file.

pub mod expr;
pub mod replay;
pub mod value;

use crate::errors::EvalError;
use serde::{Deserialize, Serialize};
use value::RawValue;

/// Where an expression is evaluated: goroutine, frame and deferred call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalScope {
    pub goroutine_id: i64,
    pub frame: i32,
    pub deferred_call: i32,
}

/// Limits on how much of a value the service loads in one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadPolicy {
    pub follow_pointers: bool,
    pub max_variable_recurse: i32,
    /// Negative means unlimited
    pub max_string_len: i32,
    /// Negative means unlimited
    pub max_array_values: i32,
    /// Negative means unlimited
    pub max_struct_fields: i32,
}

impl LoadPolicy {
    /// Deep loads used for explicit expansion
    pub const LONG: LoadPolicy = LoadPolicy {
        follow_pointers: true,
        max_variable_recurse: 1,
        max_string_len: 64,
        max_array_values: 16,
        max_struct_fields: -1,
    };

    /// Loads used to fetch the tail of arrays, slices and maps
    pub const LONG_ARRAY: LoadPolicy = LoadPolicy {
        follow_pointers: true,
        max_variable_recurse: 1,
        max_string_len: 64,
        max_array_values: 64,
        max_struct_fields: -1,
    };

    /// Shallow loads used for inline, one-line summaries
    pub const SHORT: LoadPolicy = LoadPolicy {
        follow_pointers: false,
        max_variable_recurse: 0,
        max_string_len: 64,
        max_array_values: 0,
        max_struct_fields: 3,
    };
}

impl Default for LoadPolicy {
    fn default() -> Self {
        LoadPolicy::LONG
    }
}

/// The debugger collaborator consumed by the engine.
///
/// Implementations may block; the engine only calls [`evaluate`] from
/// background tasks and the bulk listings from an explicit refresh.
///
/// [`evaluate`]: DebuggerService::evaluate
pub trait DebuggerService: Send + Sync {
    fn evaluate(
        &self,
        scope: EvalScope,
        expr: &str,
        policy: LoadPolicy,
    ) -> Result<RawValue, EvalError>;

    /// Package-level variables whose name contains `filter`
    fn list_package_variables(
        &self,
        filter: &str,
        policy: LoadPolicy,
    ) -> Result<Vec<RawValue>, EvalError>;

    fn list_function_args(
        &self,
        scope: EvalScope,
        policy: LoadPolicy,
    ) -> Result<Vec<RawValue>, EvalError>;

    fn list_local_variables(
        &self,
        scope: EvalScope,
        policy: LoadPolicy,
    ) -> Result<Vec<RawValue>, EvalError>;
}
