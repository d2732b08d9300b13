//! Configuration errors surfaced to callers.
//!
//! Bounds faults are not represented here: they are programming errors and panic.

use thiserror::Error;

use crate::variable::ValueType;

pub type Result<T> = std::result::Result<T, BufferError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("`{name}` is a {actual} variable but a {expected} variable was given")]
    TypeMismatch {
        name: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("`{name}` is an enum variable with different constants")]
    EnumMismatch { name: String },

    #[error("no buffered variable named `{0}`")]
    UnknownVariable(String),

    #[error("no buffered registry with namespace `{0}`")]
    UnknownRegistry(String),

    #[error("namespace `{namespace}` is not under root `{root}`")]
    NamespaceMismatch { namespace: String, root: String },

    #[error("registry `{registry}` already has a variable named `{name}`")]
    DuplicateVariable { registry: String, name: String },

    #[error("registry `{registry}` already has a child named `{name}`")]
    DuplicateRegistry { registry: String, name: String },

    #[error("invalid name `{0}`: names must be non-empty and must not contain '.'")]
    InvalidName(String),

    #[error("ordinal {ordinal} out of range for `{name}` ({count} constants)")]
    InvalidOrdinal { name: String, ordinal: u8, count: usize },

    #[error("null is not allowed for `{0}`")]
    NullNotAllowed(String),

    #[error("enum types support at most {max} constants, got {count}")]
    TooManyEnumConstants { count: usize, max: usize },

    #[error("column for `{name}` has {actual} samples but the buffer holds {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}
