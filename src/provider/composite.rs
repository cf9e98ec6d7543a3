//! Server provider mirrored into the local files
//!
//! The local store holds the superset: everything the server published,
//! merged over whatever only exists on disk. Reads come from there, so the
//! dataset survives the server being unreachable.

use std::sync::Arc;

use tracing::{debug, info};

use super::{ColonyProvider, LocalStoreProvider, NetworkProvider};
use crate::model::{Colony, ColonySet};
use crate::sync::{ChangeHub, ListenerId};

pub struct CompositeProvider {
    local: LocalStoreProvider,
    network: NetworkProvider,
    mirror: ListenerId,
}

impl CompositeProvider {
    pub fn new(local: LocalStoreProvider, network: NetworkProvider) -> Self {
        let target = local.clone();
        let mirror = network
            .hub()
            .add_listener(Arc::new(move |colonies: &Arc<ColonySet>| {
                debug!(colonies = colonies.len(), "Mirroring server snapshot to local store");
                target.merge_in(colonies);
            }));

        // Anything published before the mirror was registered
        let fetched = network.colonies();
        if !fetched.is_empty() {
            local.merge_in(&fetched);
        }

        info!(server = %network.server_address(), dir = %local.data_dir().display(), "Composite provider ready");
        Self {
            local,
            network,
            mirror,
        }
    }

    pub fn local(&self) -> &LocalStoreProvider {
        &self.local
    }

    pub fn network(&self) -> &NetworkProvider {
        &self.network
    }
}

impl ColonyProvider for CompositeProvider {
    fn colonies(&self) -> Arc<ColonySet> {
        self.local.colonies()
    }

    /// Push the merged collection to the server and rewrite the JSON file.
    fn update_colonies(&self) {
        self.network.push_all(self.local.colonies());
        self.local.update_colonies();
    }

    fn update_colony(&self, colony: Colony) {
        self.network.update_colony(colony);
    }

    fn hub(&self) -> &Arc<ChangeHub> {
        self.local.hub()
    }
}

impl Drop for CompositeProvider {
    fn drop(&mut self) {
        self.network.hub().remove_listener(self.mirror);
    }
}
