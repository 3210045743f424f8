//! Error type for the calculator facade

use propcalc_core::Error as CoreError;
use propcalc_formula::{ExpressionError, FormulaError};
use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`Calculator`](crate::Calculator) operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Variable registry or host property failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Parse or evaluation failure, positioned in the formula text
    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

impl Error {
    /// The underlying formula error, if this is an expression failure
    pub fn formula_error(&self) -> Option<&FormulaError> {
        match self {
            Error::Expression(e) => Some(&e.error),
            Error::Core(_) => None,
        }
    }

    /// The expression failure, if any
    pub fn as_expression(&self) -> Option<&ExpressionError> {
        match self {
            Error::Expression(e) => Some(e),
            Error::Core(_) => None,
        }
    }
}

impl From<FormulaError> for Error {
    fn from(error: FormulaError) -> Self {
        Error::Expression(error.into())
    }
}
