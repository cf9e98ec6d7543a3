//! Insertion-ordered colony collection keyed by id

use indexmap::IndexMap;

use super::colony::{Colony, ColonyId};

/// A set of colonies, unique by id, iterated in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColonySet {
    colonies: IndexMap<ColonyId, Colony>,
}

impl ColonySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            colonies: IndexMap::with_capacity(capacity),
        }
    }

    /// Insert a colony. An existing entry with the same id is replaced in
    /// place and returned.
    pub fn insert(&mut self, colony: Colony) -> Option<Colony> {
        self.colonies.insert(colony.id(), colony)
    }

    pub fn get(&self, id: ColonyId) -> Option<&Colony> {
        self.colonies.get(&id)
    }

    pub fn contains(&self, id: ColonyId) -> bool {
        self.colonies.contains_key(&id)
    }

    /// Remove a colony, keeping the order of the others.
    pub fn remove(&mut self, id: ColonyId) -> Option<Colony> {
        self.colonies.shift_remove(&id)
    }

    pub fn len(&self) -> usize {
        self.colonies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colonies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Colony> {
        self.colonies.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = ColonyId> + '_ {
        self.colonies.keys().copied()
    }
}

impl FromIterator<Colony> for ColonySet {
    fn from_iter<I: IntoIterator<Item = Colony>>(iter: I) -> Self {
        let mut set = ColonySet::new();
        set.extend(iter);
        set
    }
}

impl Extend<Colony> for ColonySet {
    fn extend<I: IntoIterator<Item = Colony>>(&mut self, iter: I) {
        for colony in iter {
            self.insert(colony);
        }
    }
}

impl IntoIterator for ColonySet {
    type Item = Colony;
    type IntoIter = indexmap::map::IntoValues<ColonyId, Colony>;

    fn into_iter(self) -> Self::IntoIter {
        self.colonies.into_values()
    }
}

impl<'a> IntoIterator for &'a ColonySet {
    type Item = &'a Colony;
    type IntoIter = indexmap::map::Values<'a, ColonyId, Colony>;

    fn into_iter(self) -> Self::IntoIter {
        self.colonies.values()
    }
}
