//! Supplement-wins reconciliation of two colony collections
//!
//! Used at startup to fold `colonies.json` (local edits) over
//! `colonies.csv` (bulk import), and by the composite provider to fold a
//! server snapshot over the local copy.

use tracing::debug;

use crate::model::ColonySet;

/// Merge `supplement` over `base`.
///
/// - every id in either input appears exactly once
/// - for ids in both, the supplement's colony wins
/// - base order is kept; supplement-only colonies follow in their own order
/// - neither input is modified
pub fn merge(base: &ColonySet, supplement: &ColonySet) -> ColonySet {
    let mut result = ColonySet::with_capacity(base.len() + supplement.len());
    let mut overridden = 0usize;

    for colony in base {
        match supplement.get(colony.id()) {
            Some(newer) => {
                overridden += 1;
                result.insert(newer.clone());
            }
            None => {
                result.insert(colony.clone());
            }
        }
    }

    let mut added = 0usize;
    for colony in supplement {
        if !base.contains(colony.id()) {
            added += 1;
            result.insert(colony.clone());
        }
    }

    debug!(
        base = base.len(),
        supplement = supplement.len(),
        overridden,
        added,
        "Merged colony sets"
    );
    result
}
