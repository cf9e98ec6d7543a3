//! Sync engine - snapshot publishing, reconciliation and change fan-out
//!
//! Handles:
//! - Supplement-wins merging of colony collections
//! - Copy-on-write snapshot publishing
//! - Listener notification

pub mod merge;
pub mod notify;
pub mod store;

// Re-exports
pub use merge::merge;
pub use notify::{ChangeHub, ColonyListener, ListenerId};
pub use store::ColonyStore;
