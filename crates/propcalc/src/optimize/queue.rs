//! Pending recomputations

use indexmap::IndexSet;
use parking_lot::Mutex;

/// Ordered, de-duplicated set of formula keys awaiting recomputation.
///
/// Every operation holds the lock for its whole duration, so a key pushed
/// while another thread drains is either part of that drain or stays queued.
#[derive(Debug, Default)]
pub struct ComputeQueue {
    pending: Mutex<IndexSet<String>>,
}

impl ComputeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `key`; returns false if it was already queued.
    ///
    /// `on_insert` runs under the lock, only for a newly queued key.
    pub fn push_with(&self, key: &str, on_insert: impl FnOnce()) -> bool {
        let mut pending = self.pending.lock();
        if pending.contains(key) {
            return false;
        }
        pending.insert(key.to_string());
        on_insert();
        true
    }

    pub fn push(&self, key: &str) -> bool {
        self.push_with(key, || {})
    }

    /// Take every queued key, leaving the queue empty
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending.lock()).into_iter().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pending.lock().contains(key)
    }

    /// Queued keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.pending.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn clear(&self) {
        self.pending.lock().clear();
    }
}
