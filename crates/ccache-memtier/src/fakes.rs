//! In-memory fakes for tests and reference embedders: a second
//! (non-local) tier, and a database adapter over a plain in-process
//! object table.

use ccache_core::adapter::{Mover, Poller};
use ccache_core::tier::{Tier, TierResult};
use ccache_types::{Oid, State, Tid};
use parking_lot::Mutex;
use std::collections::HashMap;

/// A second tier with no notion of locality or stats gating — stands
/// in for a shared remote cache service in tests.
#[derive(Default)]
pub struct FakeRemoteTier {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeRemoteTier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tier for FakeRemoteTier {
    fn get(&self, key: &str) -> TierResult<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn get_multi(&self, keys: &[String]) -> TierResult<Vec<(String, Vec<u8>)>> {
        let guard = self.entries.lock();
        Ok(keys
            .iter()
            .filter_map(|key| guard.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    fn set(&self, key: &str, value: &[u8]) -> TierResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn set_multi(&self, items: &[(String, Vec<u8>)]) -> TierResult<()> {
        let mut guard = self.entries.lock();
        for (key, value) in items {
            guard.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn flush_all(&self) -> TierResult<()> {
        self.entries.lock().clear();
        Ok(())
    }

    fn disconnect(&self) -> TierResult<()> {
        Ok(())
    }
}

/// A database standing in for the adapter collaborator (§6): a plain
/// object table plus a commit log, from which `list_changes` is served
/// by range-filtering.
#[derive(Default)]
pub struct FakeAdapter {
    objects: Mutex<HashMap<Oid, (State, Tid)>>,
    commits: Mutex<Vec<(Tid, Vec<(Oid, Tid)>)>>,
}

impl FakeAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit `changes` at `tid`: each `oid` takes on `state` as its
    /// current version, and the pair is recorded for `list_changes`.
    pub fn commit(&self, tid: Tid, changes: Vec<(Oid, State)>) {
        let mut objects = self.objects.lock();
        let mut recorded = Vec::with_capacity(changes.len());
        for (oid, state) in changes {
            objects.insert(oid, (state, tid));
            recorded.push((oid, tid));
        }
        self.commits.lock().push((tid, recorded));
    }
}

impl<Cursor> Mover<Cursor> for FakeAdapter {
    fn load_current(&self, _cursor: &mut Cursor, oid: Oid) -> (Option<State>, Tid) {
        match self.objects.lock().get(&oid) {
            Some((state, tid)) => (Some(state.clone()), *tid),
            None => (None, Tid::ZERO),
        }
    }
}

impl<Cursor> Poller<Cursor> for FakeAdapter {
    fn list_changes(&self, _cursor: &mut Cursor, after_tid: Tid, upto_tid: Tid) -> Vec<(Oid, Tid)> {
        self.commits
            .lock()
            .iter()
            .filter(|(tid, _)| *tid > after_tid && *tid <= upto_tid)
            .flat_map(|(_, changes)| changes.iter().copied())
            .collect()
    }
}
