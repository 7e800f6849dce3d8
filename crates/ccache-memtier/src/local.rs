//! The reference process-local tier (`T₀`), §4.C / §5: "its own
//! implementation must provide its own internal synchronization for
//! `get`, `set`, `set_multi`, and iteration."
//!
//! This is a plain concurrent map: no eviction policy is implemented
//! (out of scope — §1's "implementing a general-purpose KV store" is an
//! explicit non-goal). `capacity`, when configured, is advisory
//! information surfaced through introspection only.

use ccache_core::tier::{Tier, TierResult, TierStats};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct LocalTier {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    hits: AtomicU64,
    sets: AtomicU64,
    capacity_bytes: Option<usize>,
}

impl LocalTier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            capacity_bytes: None,
        }
    }

    #[must_use]
    pub fn with_capacity_bytes(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes: Some(capacity_bytes),
            ..Self::new()
        }
    }
}

impl Default for LocalTier {
    fn default() -> Self {
        Self::new()
    }
}

impl Tier for LocalTier {
    fn get(&self, key: &str) -> TierResult<Option<Vec<u8>>> {
        let hit = self.entries.read().get(key).cloned();
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(hit)
    }

    fn get_multi(&self, keys: &[String]) -> TierResult<Vec<(String, Vec<u8>)>> {
        let guard = self.entries.read();
        let hits: Vec<(String, Vec<u8>)> = keys
            .iter()
            .filter_map(|key| guard.get(key).map(|value| (key.clone(), value.clone())))
            .collect();
        if !hits.is_empty() {
            self.hits.fetch_add(hits.len() as u64, Ordering::Relaxed);
        }
        Ok(hits)
    }

    fn set(&self, key: &str, value: &[u8]) -> TierResult<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        self.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn set_multi(&self, items: &[(String, Vec<u8>)]) -> TierResult<()> {
        let mut guard = self.entries.write();
        for (key, value) in items {
            guard.insert(key.clone(), value.clone());
        }
        self.sets.fetch_add(items.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn flush_all(&self) -> TierResult<()> {
        self.entries.write().clear();
        Ok(())
    }

    fn disconnect(&self) -> TierResult<()> {
        Ok(())
    }

    fn iter_entries(&self) -> TierResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn stats(&self) -> TierStats {
        TierStats {
            hits: self.hits.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
        }
    }

    fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity_bytes
    }
}
