//! Registry of formulas keyed by `variable.property`

use indexmap::IndexMap;
use parking_lot::RwLock;
use propcalc_formula::Expression;
use std::sync::Arc;

/// Shared, ordered map from key to [`Expression`].
///
/// The calculator owns the set; the change dispatcher holds a second handle so
/// it can invalidate buffers when it queues a formula.
#[derive(Debug, Default)]
pub struct ExpressionSet {
    entries: RwLock<IndexMap<String, Arc<Expression>>>,
}

impl ExpressionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<Expression>> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Insert or replace; the previous expression keeps its slot in the order
    pub fn insert(&self, expression: Expression) -> Option<Arc<Expression>> {
        let key = expression.key().to_string();
        self.entries.write().insert(key, Arc::new(expression))
    }

    pub fn remove(&self, key: &str) -> Option<Arc<Expression>> {
        self.entries.write().shift_remove(key)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Keys in registration order
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Current expressions, in registration order
    pub fn snapshot(&self) -> Vec<Arc<Expression>> {
        self.entries.read().values().cloned().collect()
    }

    /// Expressions for `keys`, skipping keys with no formula
    pub fn select(&self, keys: &[String]) -> Vec<Arc<Expression>> {
        let entries = self.entries.read();
        keys.iter().filter_map(|key| entries.get(key).cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Invalidate every buffer
    pub fn reset_buffers(&self) {
        for expression in self.entries.read().values() {
            expression.reset_buffer();
        }
    }

    /// Invalidate the buffer of `key`, if it has a formula
    pub fn reset_buffer(&self, key: &str) {
        if let Some(expression) = self.entries.read().get(key) {
            expression.reset_buffer();
        }
    }
}
