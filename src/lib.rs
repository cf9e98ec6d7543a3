//! colony-sync: synchronization engine for georeferenced colony observations
//!
//! Keeps three copies of a colony dataset consistent:
//! - an in-memory snapshot every reader shares
//! - `colonies.csv` / `colonies.json` in a local data directory
//! - a remote colony server spoken to over newline-delimited JSON
//!
//! Plus the GPS calibration that maps field positions onto the site grid.

pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod net;
pub mod provider;
pub mod sync;
pub mod transform;
pub mod worker;

// Re-exports
pub use config::Config;
pub use error::{Result, SyncError};
pub use model::{Colony, ColonyId, ColonySet};
pub use provider::{ColonyProvider, CompositeProvider, LocalStoreProvider, NetworkProvider};
pub use sync::{ChangeHub, ColonyListener, ListenerId};
pub use transform::{CoordinateTransformer, MapPoint, TransformError};
pub use worker::TaskPool;
