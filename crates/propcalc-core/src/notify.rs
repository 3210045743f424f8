//! Property change notification
//!
//! Hosts implementing [`Optimizable`](crate::Optimizable) embed a
//! [`ChangeNotifier`] and call [`ChangeNotifier::notify`] whenever a property
//! changes. Listeners register with [`ChangeNotifier::subscribe`] and stay
//! registered for as long as the returned [`Subscription`] is alive.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Receives property change notifications
pub trait PropertyListener: Send + Sync {
    /// Called after `property` of the variable named `variable` changed
    fn property_changed(&self, variable: &str, property: &str);
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Arc<dyn PropertyListener>)>,
}

/// List of listeners for one host object
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: Arc<Mutex<Listeners>>,
}

impl ChangeNotifier {
    /// Create a notifier with no listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn subscribe(&self, listener: Arc<dyn PropertyListener>) -> Subscription {
        let mut listeners = self.listeners.lock();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, listener));

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Notify every registered listener.
    ///
    /// Listeners are called without the internal lock held, so a listener may
    /// subscribe, cancel, or trigger further notifications.
    pub fn notify(&self, variable: &str, property: &str) {
        let listeners: Vec<Arc<dyn PropertyListener>> = self
            .listeners
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener.property_changed(variable, property);
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().entries.len()
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Cancellation handle for a registered listener.
///
/// Dropping the handle removes the listener.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    /// Remove the listener now
    pub fn cancel(self) {}

    /// Whether the notifier this subscription belongs to still exists
    pub fn is_active(&self) -> bool {
        self.listeners.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
