//! Failures collected during batch recomputation

use parking_lot::Mutex;
use propcalc_formula::ExpressionError;
use std::fmt;

/// Errors raised while recomputing formulas in a batch.
///
/// A failing formula never aborts the batch; its error lands here, stamped
/// with the formula's key and position.
#[derive(Default)]
pub struct ExpressionErrors {
    errors: Mutex<Vec<ExpressionError>>,
}

impl ExpressionErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, error: ExpressionError) {
        tracing::debug!(error = %error, "formula failed");
        self.errors.lock().push(error);
    }

    /// Copy of the collected errors, oldest first
    pub fn snapshot(&self) -> Vec<ExpressionError> {
        self.errors.lock().clone()
    }

    /// Remove and return the collected errors
    pub fn take(&self) -> Vec<ExpressionError> {
        std::mem::take(&mut *self.errors.lock())
    }

    pub fn clear(&self) {
        self.errors.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    /// Whether an error was collected for `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.errors
            .lock()
            .iter()
            .any(|e| e.key.as_deref() == Some(key))
    }
}

impl fmt::Debug for ExpressionErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.errors.lock().iter()).finish()
    }
}
