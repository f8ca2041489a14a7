//! Errors raised while compiling a segment tree.

use std::fmt;
use thiserror::Error;

/// What kind of whitelisted name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitelistKind {
    Field,
    Operator,
    Table,
}

impl fmt::Display for WhitelistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhitelistKind::Field => write!(f, "field"),
            WhitelistKind::Operator => write!(f, "operator"),
            WhitelistKind::Table => write!(f, "table"),
        }
    }
}

/// Validation failure for a segment tree.
///
/// Every variant carries the offending name or literal so that callers can
/// surface the error without walking the tree again.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Malformed tree: nil root, missing or mismatched payload, limits exceeded
    #[error("invalid segment tree: {0}")]
    Structural(String),

    /// Field, operator or table outside the registry
    #[error("{kind} `{name}` is not allowed")]
    WhitelistViolation { kind: WhitelistKind, name: String },

    /// Wrong number of values for an operator
    #[error("operator `{operator}` on `{field}` expects {expected} value(s), got {actual}")]
    Arity {
        field: String,
        operator: String,
        expected: usize,
        actual: usize,
    },

    /// Value or type tag that cannot be coerced
    #[error("type error on `{field}`: {message}")]
    Type { field: String, message: String },

    /// Value outside the closed set a rule accepts
    #[error("unsupported {rule} `{value}`")]
    DomainRule { rule: &'static str, value: String },
}

impl CompileError {
    pub(crate) fn structural(message: impl Into<String>) -> Self {
        CompileError::Structural(message.into())
    }

    pub(crate) fn not_allowed(kind: WhitelistKind, name: &str) -> Self {
        CompileError::WhitelistViolation {
            kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn arity(field: &str, operator: &str, expected: usize, actual: usize) -> Self {
        CompileError::Arity {
            field: field.to_string(),
            operator: operator.to_string(),
            expected,
            actual,
        }
    }

    pub(crate) fn type_error(field: &str, message: impl Into<String>) -> Self {
        CompileError::Type {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn domain(rule: &'static str, value: &str) -> Self {
        CompileError::DomainRule {
            rule,
            value: value.to_string(),
        }
    }
}
