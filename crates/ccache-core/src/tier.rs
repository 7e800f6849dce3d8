//! The tier capability and the ordered tier list (§4.C).
//!
//! A tier is a collaborator capability (§9): any type implementing
//! [`Tier`] can sit in the list, local or remote. Failures from a tier
//! are never propagated as [`ccache_error::CacheError`] — per §7 they are
//! swallowed here and turned into "treat as miss" (reads) or a dropped
//! write, logged at `warn`.

use std::fmt;
use std::sync::Arc;

/// An opaque failure from a tier implementation (connection error,
/// timeout, protocol error). Never surfaced past this module.
#[derive(Debug)]
pub struct TierError(pub String);

impl fmt::Display for TierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier error: {}", self.0)
    }
}

impl std::error::Error for TierError {}

pub type TierResult<T> = Result<T, TierError>;

/// A single cache level, local-process or remote-shared (§4.C).
pub trait Tier: Send + Sync {
    fn get(&self, key: &str) -> TierResult<Option<Vec<u8>>>;

    fn get_multi(&self, keys: &[String]) -> TierResult<Vec<(String, Vec<u8>)>>;

    fn set(&self, key: &str, value: &[u8]) -> TierResult<()>;

    fn set_multi(&self, items: &[(String, Vec<u8>)]) -> TierResult<()>;

    fn flush_all(&self) -> TierResult<()>;

    fn disconnect(&self) -> TierResult<()>;

    /// Enumerate every entry currently held, for local-tier introspection
    /// (`new_instance`'s max-tid scan, §4.H; snapshot persistence, §6).
    /// Remote tiers are not expected to support this and may return an
    /// empty list.
    fn iter_entries(&self) -> TierResult<Vec<(String, Vec<u8>)>> {
        Ok(Vec::new())
    }

    /// Hit/set counters since the last [`Tier::reset_stats`] call, used
    /// by the stats-gated persistence policy (§9c). Remote tiers need
    /// not track this; the default reports untouched.
    fn stats(&self) -> TierStats {
        TierStats::default()
    }

    fn reset_stats(&self) {}

    /// Configured capacity, if this tier implementation has one. Used
    /// only for the local tier's `limit` introspection (§10.7); remote
    /// tiers have no notion of it here.
    fn capacity(&self) -> Option<usize> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStats {
    pub hits: u64,
    pub sets: u64,
}

/// The ordered sequence `T₀, T₁, …, Tₙ₋₁`, `T₀` the process-local tier.
#[derive(Clone)]
pub struct TierList {
    tiers: Vec<Arc<dyn Tier>>,
}

impl TierList {
    #[must_use]
    pub fn new(tiers: Vec<Arc<dyn Tier>>) -> Self {
        Self { tiers }
    }

    #[must_use]
    pub fn local(&self) -> &Arc<dyn Tier> {
        &self.tiers[0]
    }

    /// A copy of this list with `T₀` replaced, for `new_instance` when
    /// the embedder did not request local-cache sharing (§4.H).
    #[must_use]
    pub fn with_local(&self, new_local: Arc<dyn Tier>) -> Self {
        let mut tiers = self.tiers.clone();
        tiers[0] = new_local;
        Self { tiers }
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Probe local-first, returning the first hit regardless of whether
    /// its value decodes to anything useful. Callers that care about the
    /// cache value envelope (≥8 bytes, correct embedded tid) must use
    /// [`TierList::probe_local_first`] instead, which continues past a
    /// tier whose entry is absent, undersized, or stale rather than
    /// stopping on it.
    pub fn get_local_first(&self, key: &str) -> Option<Vec<u8>> {
        for (index, tier) in self.tiers.iter().enumerate() {
            match tier.get(key) {
                Ok(Some(value)) => return Some(value),
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(tier = index, %err, "tier get failed, treating as miss");
                }
            }
        }
        None
    }

    /// Probe local-first, handing each tier's raw value to `resolve` and
    /// continuing to the next tier whenever `resolve` returns `None` —
    /// whether because the tier had nothing, or because what it had
    /// didn't decode to a valid entry (§4.D: "On hit with value ≥ 8
    /// bytes ... return"; `storage_cache.py`'s `load` loops
    /// `for client in self.clients_local_first` and only returns once
    /// `cache_data and len(cache_data) >= 8`, otherwise falling through
    /// to the next client). `resolve` receives the tier's index so the
    /// caller can decide whether promotion to `T₀` is needed.
    pub fn probe_local_first<R>(&self, key: &str, mut resolve: impl FnMut(usize, Vec<u8>) -> Option<R>) -> Option<R> {
        for (index, tier) in self.tiers.iter().enumerate() {
            match tier.get(key) {
                Ok(Some(value)) => {
                    if let Some(result) = resolve(index, value) {
                        return Some(result);
                    }
                }
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(tier = index, %err, "tier get failed, treating as miss");
                }
            }
        }
        None
    }

    /// Probe local-first with `get_multi`, handing each tier's non-empty
    /// response to `resolve` and continuing to the next tier whenever
    /// `resolve` returns `None` — a non-empty response that doesn't
    /// contain a validly-decodable entry for any of the caller's keys
    /// does not stop the probe (§4.D; `storage_cache.py`'s `load` checks
    /// `response.get(cp0_key)` / the alternate key and, finding neither
    /// at least 8 bytes long, falls through its `for client in
    /// self.clients_local_first` loop to the next tier rather than
    /// returning).
    pub fn probe_multi_local_first<R>(
        &self,
        keys: &[String],
        mut resolve: impl FnMut(usize, &[(String, Vec<u8>)]) -> Option<R>,
    ) -> Option<R> {
        for (index, tier) in self.tiers.iter().enumerate() {
            match tier.get_multi(keys) {
                Ok(hits) if !hits.is_empty() => {
                    if let Some(result) = resolve(index, &hits) {
                        return Some(result);
                    }
                }
                Ok(_) => continue,
                Err(err) => {
                    tracing::warn!(tier = index, %err, "tier get_multi failed, treating as miss");
                }
            }
        }
        None
    }

    /// Probe global-first (outermost tier towards `T₀`) for the
    /// checkpoints marker, used by the poll path (§4.F).
    pub fn get_global_first(&self, key: &str) -> Option<Vec<u8>> {
        for (index, tier) in self.tiers.iter().enumerate().rev() {
            match tier.get(key) {
                Ok(Some(value)) => return Some(value),
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(tier = index, %err, "tier get failed, treating as miss");
                }
            }
        }
        None
    }

    /// Write to every tier, local-first, logging (not failing) on error.
    pub fn set_all(&self, key: &str, value: &[u8]) {
        for (index, tier) in self.tiers.iter().enumerate() {
            if let Err(err) = tier.set(key, value) {
                tracing::warn!(tier = index, %err, "tier set failed, dropping");
            }
        }
    }

    pub fn set_multi_all(&self, items: &[(String, Vec<u8>)]) {
        if items.is_empty() {
            return;
        }
        for (index, tier) in self.tiers.iter().enumerate() {
            if let Err(err) = tier.set_multi(items) {
                tracing::warn!(tier = index, %err, "tier set_multi failed, dropping");
            }
        }
    }

    pub fn set_on(&self, index: usize, key: &str, value: &[u8]) {
        if let Err(err) = self.tiers[index].set(key, value) {
            tracing::warn!(tier = index, %err, "tier set failed, dropping");
        }
    }

    pub fn flush_all(&self) {
        for (index, tier) in self.tiers.iter().enumerate() {
            if let Err(err) = tier.flush_all() {
                tracing::warn!(tier = index, %err, "tier flush_all failed");
            }
        }
    }

    pub fn disconnect_all(&self) {
        for (index, tier) in self.tiers.iter().enumerate() {
            if let Err(err) = tier.disconnect() {
                tracing::warn!(tier = index, %err, "tier disconnect failed");
            }
        }
    }
}
