//! Copy-on-write colony snapshot store
//!
//! Readers take an `Arc<ColonySet>` and iterate it without holding any lock.
//! Writers build a new set and swap the pointer, then fire the hub.
//! Listeners see snapshots in the order they were published.

use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};

use super::merge::merge;
use super::notify::ChangeHub;
use crate::model::{Colony, ColonySet};

pub struct ColonyStore {
    current: RwLock<Arc<ColonySet>>,
    /// Held from building a snapshot until its listeners have run
    publishing: ReentrantMutex<()>,
    hub: Arc<ChangeHub>,
}

impl ColonyStore {
    pub fn new(initial: ColonySet, hub: Arc<ChangeHub>) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            publishing: ReentrantMutex::new(()),
            hub,
        }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<ColonySet> {
        Arc::clone(&self.current.read())
    }

    pub fn hub(&self) -> &Arc<ChangeHub> {
        &self.hub
    }

    /// Replace the whole collection and notify listeners.
    pub fn publish(&self, colonies: ColonySet) -> Arc<ColonySet> {
        self.swap(|_| colonies)
    }

    /// Insert or replace one colony and notify listeners.
    pub fn upsert(&self, colony: Colony) -> Arc<ColonySet> {
        self.swap(|current| {
            let mut next = current.clone();
            next.insert(colony);
            next
        })
    }

    /// Fold `supplement` over the current collection and notify listeners.
    pub fn merge_in(&self, supplement: &ColonySet) -> Arc<ColonySet> {
        self.swap(|current| merge(current, supplement))
    }

    // The write lock is held while the next set is built so concurrent
    // writers cannot lose each other's changes. Listeners run after its
    // release but before the next writer starts, so a slow listener can never
    // deliver an older snapshot after a newer one. The publish lock is
    // reentrant so a listener may write back to this store.
    fn swap(&self, build: impl FnOnce(&ColonySet) -> ColonySet) -> Arc<ColonySet> {
        let _publishing = self.publishing.lock();
        let published = {
            let mut current = self.current.write();
            let next = Arc::new(build(&current));
            *current = Arc::clone(&next);
            next
        };
        self.hub.fire(&published);
        published
    }
}
