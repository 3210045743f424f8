//! Formula error types

use propcalc_core::Error as CoreError;
use std::fmt;
use thiserror::Error;

/// Result type for function implementations and other unpositioned failures
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Result type for parsing and evaluation
pub type ExpressionResult<T> = std::result::Result<T, ExpressionError>;

/// Errors that can occur during formula parsing or evaluation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// Malformed formula text
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// Unknown function
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Referenced variable is not registered
    #[error("Variable '{0}' does not exist")]
    VariableNotFound(String),

    /// Computed value cannot be converted to a property's declared type
    #[error("Value {actual} is not compatible with property '{property}' of type {expected}")]
    IncompatibleType {
        property: String,
        expected: String,
        actual: String,
    },

    /// Failure inside a function or operator
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Expression re-entered while being evaluated
    #[error("Circular reference detected in {0}")]
    CircularReference(String),

    /// An expression is already registered under the key
    #[error("Expression already exists: {0}")]
    DuplicateExpression(String),

    /// Any other failure reported by the host side
    #[error(transparent)]
    Core(CoreError),
}

impl From<CoreError> for FormulaError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::VariableNotFound(name) => FormulaError::VariableNotFound(name),
            CoreError::IncompatibleType {
                property,
                expected,
                actual,
            } => FormulaError::IncompatibleType {
                property,
                expected: expected.to_string(),
                actual,
            },
            CoreError::InvalidValueType { expected, actual } => {
                FormulaError::Evaluation(format!("expected {}, got {}", expected, actual))
            }
            other => FormulaError::Core(other),
        }
    }
}

/// Position of a node in the original formula text, in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub column: usize,
    pub length: usize,
}

impl Span {
    pub fn new(column: usize, length: usize) -> Self {
        Self { column, length }
    }
}

/// A [`FormulaError`] positioned in the formula text and tagged with the key
/// of the expression it was raised in.
///
/// The span and key are each stamped once: the innermost node that fails sets
/// the span, the nearest enclosing expression sets the key.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionError {
    pub error: FormulaError,
    pub span: Option<Span>,
    pub key: Option<String>,
}

impl ExpressionError {
    pub fn new(error: FormulaError) -> Self {
        Self {
            error,
            span: None,
            key: None,
        }
    }

    /// Syntax error at a position
    pub fn syntax<S: Into<String>>(message: S, column: usize, length: usize) -> Self {
        Self::new(FormulaError::Syntax(message.into())).at(Span::new(column, length))
    }

    /// Set the span unless one is already present
    pub fn at(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    /// Set the expression key unless one is already present
    pub fn with_key(mut self, key: &str) -> Self {
        if self.key.is_none() {
            self.key = Some(key.to_string());
        }
        self
    }

    /// Column of the failing node, 0 when unknown
    pub fn column(&self) -> usize {
        self.span.map_or(0, |s| s.column)
    }

    /// Length of the failing node, 0 when unknown
    pub fn length(&self) -> usize {
        self.span.map_or(0, |s| s.length)
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self.error, FormulaError::Syntax(_))
    }
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.key, self.span) {
            (Some(key), Some(span)) => {
                write!(f, "{} ({},{}): {}", key, span.column, span.length, self.error)
            }
            (Some(key), None) => write!(f, "{}: {}", key, self.error),
            (None, _) => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for ExpressionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<FormulaError> for ExpressionError {
    fn from(error: FormulaError) -> Self {
        Self::new(error)
    }
}

impl From<CoreError> for ExpressionError {
    fn from(error: CoreError) -> Self {
        Self::new(error.into())
    }
}
