//! Server-backed provider
//!
//! Keeps the last collection fetched from the colony server as its snapshot.
//! Updates are published locally first, then submitted on the task pool.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use super::ColonyProvider;
use crate::config::ServerConfig;
use crate::error::{Result, SyncError};
use crate::model::{Colony, ColonySet};
use crate::net::protocol::parse_colonies_response;
use crate::net::{ConnectionState, Request, ServerConnection};
use crate::sync::{ChangeHub, ColonyStore};
use crate::worker::TaskPool;

#[derive(Clone)]
pub struct NetworkProvider {
    inner: Arc<NetworkInner>,
}

struct NetworkInner {
    connection: ServerConnection,
    store: ColonyStore,
    pool: TaskPool,
}

impl NetworkProvider {
    /// Build the provider without touching the network.
    pub fn new(config: ServerConfig, pool: TaskPool) -> Self {
        let hub = Arc::new(ChangeHub::new());
        let connection = ServerConnection::new(config, Arc::clone(&hub), pool.cancel_token());
        Self {
            inner: Arc::new(NetworkInner {
                connection,
                store: ColonyStore::new(ColonySet::new(), hub),
                pool,
            }),
        }
    }

    /// Build the provider and start the initial fetch in the background.
    pub fn connect(config: ServerConfig, pool: TaskPool) -> Self {
        let provider = Self::new(config, pool);
        provider.start();
        provider
    }

    /// Connect and fetch the collection on the task pool.
    pub fn start(&self) {
        let this = self.clone();
        self.inner.pool.spawn("initial-fetch", async move {
            if let Err(e) = this.refresh().await {
                this.report("get-colonies", &e);
            }
        });
    }

    pub fn server_address(&self) -> String {
        self.inner.connection.config().address()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.watch_state()
    }

    /// Drop the session; the next request reconnects.
    pub async fn disconnect(&self) {
        self.inner.connection.disconnect().await;
    }

    /// Fetch the full collection and publish it as the new snapshot.
    pub async fn refresh(&self) -> Result<Arc<ColonySet>> {
        let line = self.inner.connection.request(&Request::GetColonies).await?;
        let colonies = parse_colonies_response(&line)?;
        info!(
            server = %self.server_address(),
            colonies = colonies.len(),
            "Fetched colonies from server"
        );
        Ok(self.inner.store.publish(colonies))
    }

    /// Send one colony; returns the server's acknowledgement line.
    pub async fn submit_colony(&self, colony: &Colony) -> Result<String> {
        let ack = self.inner.connection.request(&Request::update(colony)).await?;
        debug!(id = colony.id(), ack = %ack, "Colony submitted");
        Ok(ack)
    }

    /// Send the current snapshot as the server's whole collection.
    pub async fn submit_all(&self) -> Result<String> {
        self.submit_set(&self.inner.store.snapshot()).await
    }

    pub async fn submit_set(&self, colonies: &ColonySet) -> Result<String> {
        let ack = self
            .inner
            .connection
            .request(&Request::update_all(colonies))
            .await?;
        info!(colonies = colonies.len(), ack = %ack, "Collection submitted");
        Ok(ack)
    }

    /// Submit `colonies` in the background.
    pub fn push_all(&self, colonies: Arc<ColonySet>) {
        let this = self.clone();
        self.inner.pool.spawn("update-all", async move {
            if let Err(e) = this.submit_set(&colonies).await {
                this.report("update_all", &e);
            }
        });
    }

    fn report(&self, operation: &str, e: &SyncError) {
        if matches!(e, SyncError::Cancelled) {
            debug!(operation, "Request cancelled");
            return;
        }
        error!(operation, server = %self.server_address(), error = %e, "Server request failed");
        if e.is_transport() {
            self.inner.store.hub().notice(&format!("Connection error: {e}"));
        }
    }
}

impl ColonyProvider for NetworkProvider {
    fn colonies(&self) -> Arc<ColonySet> {
        self.inner.store.snapshot()
    }

    fn update_colonies(&self) {
        self.push_all(self.inner.store.snapshot());
    }

    fn update_colony(&self, colony: Colony) {
        self.inner.store.upsert(colony.clone());
        let this = self.clone();
        self.inner.pool.spawn("update-colony", async move {
            if let Err(e) = this.submit_colony(&colony).await {
                this.report("update", &e);
            }
        });
    }

    fn hub(&self) -> &Arc<ChangeHub> {
        self.inner.store.hub()
    }
}
