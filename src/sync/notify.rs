//! Change-notification hub
//!
//! Listeners are called synchronously, in registration order, on whichever
//! thread published the change (often a background I/O task). They must not
//! assume they run on any particular thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::model::ColonySet;

/// Receives colony-set changes and user-facing notices.
pub trait ColonyListener: Send + Sync {
    /// The published collection changed.
    fn colonies_changed(&self, colonies: &Arc<ColonySet>);

    /// A message meant for the user (connection failures and the like).
    fn notice(&self, _message: &str) {}
}

impl<F> ColonyListener for F
where
    F: Fn(&Arc<ColonySet>) + Send + Sync,
{
    fn colonies_changed(&self, colonies: &Arc<ColonySet>) {
        self(colonies)
    }
}

/// Handle returned by `add_listener`, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ChangeHub {
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ColonyListener>)>>,
    next_id: AtomicU64,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn ColonyListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    /// Returns false if the listener was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Deliver `colonies` to every listener.
    pub fn fire(&self, colonies: &Arc<ColonySet>) {
        let listeners = self.snapshot();
        debug!(listeners = listeners.len(), colonies = colonies.len(), "Firing colony change");
        for listener in listeners {
            listener.colonies_changed(colonies);
        }
    }

    /// Deliver a user-facing notice to every listener.
    pub fn notice(&self, message: &str) {
        for listener in self.snapshot() {
            listener.notice(message);
        }
    }

    // Copy out so listeners can (un)register without deadlocking.
    fn snapshot(&self) -> Vec<Arc<dyn ColonyListener>> {
        self.listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}
