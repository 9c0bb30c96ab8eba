//! Error types for the inspection engine
//!
//! This module defines the three error families the crate produces:
//!
//! - [`EvalError`]: the debugger service could not evaluate an expression or
//!   list a scope. Background loads never propagate these; they are stored on
//!   the affected node as its `unreadable` text.
//! - [`FormatterError`]: a formatter override was rejected.
//! - [`ConfigError`]: reading or writing the configuration or a recorded
//!   session failed.

use crate::remote::value::Kind;
use thiserror::Error;

/// Failures reported by a [`DebuggerService`](crate::remote::DebuggerService)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("could not parse {expr:?}: {message}")]
    Syntax { expr: String, message: String },

    #[error("could not find symbol value for {0}")]
    UnknownVariable(String),

    #[error("{type_name} has no member {field}")]
    NoSuchField { type_name: String, field: String },

    #[error("index out of bounds {index} (len {len})")]
    IndexOutOfRange { index: i64, len: i64 },

    #[error("no object recorded at {0:#x}")]
    NoObjectAt(u64),

    #[error("invalid indirect of {0}")]
    NotAddressable(String),

    #[error("frame {0} does not exist")]
    NoSuchFrame(i32),

    #[error("expression {0:?} is not supported")]
    Unsupported(String),

    #[error("debugger service unavailable: {0}")]
    Disconnected(String),
}

/// Rejected formatter operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatterError {
    /// The value has not been evaluated yet, so there is no address to key on
    #[error("{name} has no address; evaluate it before installing a format")]
    NoAddress { name: String },

    #[error("a {requested} format cannot be applied to a {kind:?} value")]
    KindMismatch { requested: &'static str, kind: Kind },

    #[error("custom formatters cannot be attached to builtin type {0}")]
    BuiltinType(String),
}

/// Configuration and session-file failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
