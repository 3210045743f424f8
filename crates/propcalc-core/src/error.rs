//! Error types for propcalc-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in propcalc-core
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A value could not be converted to the declared type of a property
    #[error("Value {actual} is not compatible with property '{property}' of type {expected}")]
    IncompatibleType {
        property: String,
        expected: &'static str,
        actual: String,
    },

    /// Property does not exist on the variable
    #[error("Variable '{variable}' has no property '{property}'")]
    UnknownProperty { variable: String, property: String },

    /// Variable not registered
    #[error("Variable '{0}' does not exist")]
    VariableNotFound(String),

    /// Variable name already registered
    #[error("Variable already exists: {0}")]
    DuplicateVariable(String),

    /// Variable name does not match the name grammar
    #[error("Invalid variable name: {0}")]
    InvalidName(String),

    /// Invalid value type for operation
    #[error("Invalid value type: expected {expected}, got {actual}")]
    InvalidValueType {
        expected: &'static str,
        actual: &'static str,
    },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }
}
