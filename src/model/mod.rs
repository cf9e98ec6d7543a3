//! Colony data model
//!
//! - `Colony`: one georeferenced observation point
//! - `ColonySet`: insertion-ordered collection, unique by id

pub mod colony;
pub mod colony_set;

// Re-exports
pub use colony::{Colony, ColonyId};
pub use colony_set::ColonySet;
