//! The colony record
//!
//! A colony is a plain value. Shared copies live inside published
//! `ColonySet` snapshots; to change one, clone it, mutate the clone and hand
//! it back to a provider.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::codec::{json, CodecError};

/// Colony identifier, unique within a dataset.
pub type ColonyId = i32;

/// One field observation point.
#[derive(Debug, Clone, Default)]
pub struct Colony {
    id: ColonyId,
    /// Meters east of the southwest corner
    x: f64,
    /// Meters north of the southwest corner
    y: f64,
    active: bool,
    visited: bool,
    modified_at: Option<DateTime<Utc>>,
}

impl Colony {
    pub fn new(id: ColonyId, x: f64, y: f64, active: bool) -> Self {
        Self {
            id,
            x,
            y,
            active,
            visited: false,
            modified_at: None,
        }
    }

    pub fn id(&self) -> ColonyId {
        self.id
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_visited(&self) -> bool {
        self.visited
    }

    /// When a mutable field last changed, if ever.
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }

    pub fn set_x(&mut self, x: f64) {
        if self.x.to_bits() != x.to_bits() {
            self.x = x;
            self.touch();
        }
    }

    pub fn set_y(&mut self, y: f64) {
        if self.y.to_bits() != y.to_bits() {
            self.y = y;
            self.touch();
        }
    }

    pub fn set_active(&mut self, active: bool) {
        if self.active != active {
            self.active = active;
            self.touch();
        }
    }

    pub fn set_visited(&mut self, visited: bool) {
        if self.visited != visited {
            self.visited = visited;
            self.touch();
        }
    }

    /// Administrative rename. Does not count as a modification.
    pub fn set_id(&mut self, id: ColonyId) {
        self.id = id;
    }

    /// Overwrite the modification timestamp (decoders restore it verbatim).
    pub fn set_modified_at(&mut self, modified_at: Option<DateTime<Utc>>) {
        self.modified_at = modified_at;
    }

    /// JSON object representation used on the wire and in `colonies.json`.
    pub fn to_wire_format(&self) -> Value {
        json::encode(self)
    }

    /// Layer a (possibly partial) JSON object over this colony.
    ///
    /// Keys missing from `value` leave the current field untouched.
    pub fn update_from_wire(&mut self, value: &Value) -> Result<(), CodecError> {
        json::decode_into(self, value)
    }

    /// Build a colony from its JSON object representation.
    pub fn from_wire_format(value: &Value) -> Result<Self, CodecError> {
        json::decode(value)
    }

    fn touch(&mut self) {
        self.modified_at = Some(Utc::now());
    }
}

// Equality and hashing cover (id, x, y, active) only. `visited` and
// `modified_at` are deliberately left out.
impl PartialEq for Colony {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.active == other.active
            && self.x.to_bits() == other.x.to_bits()
            && self.y.to_bits() == other.y.to_bits()
    }
}

impl Eq for Colony {}

impl Hash for Colony {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.active.hash(state);
        self.x.to_bits().hash(state);
        self.y.to_bits().hash(state);
    }
}

impl fmt::Display for Colony {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Colony #{} at ({}, {}), {}",
            self.id,
            self.x,
            self.y,
            if self.active { "active" } else { "inactive" }
        )
    }
}
