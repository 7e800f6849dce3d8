//! Delta-after-0 / delta-after-1 overlay maps (§4.B).
//!
//! `Δ0`/`Δ1` are ordered maps `oid → tid` in the source model (§9:
//! "ordered-map semantics ... but must not depend on any particular
//! ordered-map implementation"). `BTreeMap` is used directly rather than
//! a hash map plus explicit sort, since the ordering is needed on every
//! rebuild and a hash map buys nothing extra here.

use ccache_types::{Oid, Tid};
use std::collections::BTreeMap;

/// A delta map: `oid → tid`, ascending by `oid`, capped at `limit`
/// entries purely as a signal (callers decide what to do at the cap —
/// this type never silently evicts).
#[derive(Debug, Clone, Default)]
pub struct DeltaMap {
    entries: BTreeMap<Oid, Tid>,
}

impl DeltaMap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, oid: Oid) -> Option<Tid> {
        self.entries.get(&oid).copied()
    }

    #[must_use]
    pub fn contains(&self, oid: Oid) -> bool {
        self.entries.contains_key(&oid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `tid` for `oid` only if no entry exists or the existing
    /// one is smaller (§3: "always the latest tid seen").
    pub fn insert_if_greater(&mut self, oid: Oid, tid: Tid) {
        self.entries
            .entry(oid)
            .and_modify(|existing| {
                if tid > *existing {
                    *existing = tid;
                }
            })
            .or_insert(tid);
    }

    /// Insert unconditionally, overwriting any existing value. Used by
    /// `after_tpc_finish` (§4.E), where the committing transaction's own
    /// tid is authoritative by construction.
    pub fn insert_unconditional(&mut self, oid: Oid, tid: Tid) {
        self.entries.insert(oid, tid);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Oid, Tid)> + '_ {
        self.entries.iter().map(|(&oid, &tid)| (oid, tid))
    }

    /// Build a delta map from `(oid, tid)` pairs sorted ascending by
    /// `oid` then by insertion order for a given `oid`; the last value
    /// seen for a repeated `oid` wins, matching `list_changes` ingestion
    /// in the rebuild path (§4.F).
    pub fn from_sorted_pairs(pairs: impl IntoIterator<Item = (Oid, Tid)>) -> Self {
        let mut map = Self::new();
        for (oid, tid) in pairs {
            map.entries.insert(oid, tid);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_if_greater_keeps_latest_tid() {
        let mut delta = DeltaMap::new();
        delta.insert_if_greater(Oid::new(1), Tid::new(10));
        delta.insert_if_greater(Oid::new(1), Tid::new(5));
        assert_eq!(delta.get(Oid::new(1)), Some(Tid::new(10)));
        delta.insert_if_greater(Oid::new(1), Tid::new(20));
        assert_eq!(delta.get(Oid::new(1)), Some(Tid::new(20)));
    }

    #[test]
    fn insert_unconditional_overwrites_regardless_of_order() {
        let mut delta = DeltaMap::new();
        delta.insert_if_greater(Oid::new(1), Tid::new(20));
        delta.insert_unconditional(Oid::new(1), Tid::new(15));
        assert_eq!(delta.get(Oid::new(1)), Some(Tid::new(15)));
    }

    #[test]
    fn from_sorted_pairs_keeps_last_value_per_oid() {
        let delta = DeltaMap::from_sorted_pairs([
            (Oid::new(1), Tid::new(10)),
            (Oid::new(2), Tid::new(5)),
            (Oid::new(1), Tid::new(30)),
        ]);
        assert_eq!(delta.get(Oid::new(1)), Some(Tid::new(30)));
        assert_eq!(delta.get(Oid::new(2)), Some(Tid::new(5)));
        assert_eq!(delta.len(), 2);
    }

    #[test]
    fn iteration_is_ascending_by_oid() {
        let delta = DeltaMap::from_sorted_pairs([
            (Oid::new(5), Tid::new(1)),
            (Oid::new(1), Tid::new(1)),
            (Oid::new(3), Tid::new(1)),
        ]);
        let oids: Vec<u64> = delta.iter().map(|(oid, _)| oid.get()).collect();
        assert_eq!(oids, vec![1, 3, 5]);
    }
}
