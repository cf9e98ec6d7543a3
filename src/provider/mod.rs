//! Colony providers
//!
//! A provider owns one copy of the colony dataset and keeps it in step with a
//! backing store:
//! - `local`: `colonies.csv` + `colonies.json` on disk
//! - `network`: the colony server over TCP
//! - `composite`: the server, mirrored into the local files for offline use

pub mod composite;
pub mod local;
pub mod network;

use std::sync::Arc;

use crate::model::{Colony, ColonySet};
use crate::sync::ChangeHub;

// Re-exports
pub use composite::CompositeProvider;
pub use local::LocalStoreProvider;
pub use network::NetworkProvider;

/// Read/write access to the colony dataset.
///
/// Reads never block on I/O. Writes are fire-and-forget: the change is
/// visible in `colonies()` right away and persisted in the background.
pub trait ColonyProvider: Send + Sync {
    /// Most recently published snapshot.
    fn colonies(&self) -> Arc<ColonySet>;

    /// Push the whole in-memory collection to the backing store.
    fn update_colonies(&self);

    /// Publish one changed colony and write it through.
    fn update_colony(&self, colony: Colony);

    /// Where to register for change notifications.
    fn hub(&self) -> &Arc<ChangeHub>;
}
