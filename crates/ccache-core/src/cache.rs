//! The engine itself: load path (§4.D), write path (§4.E), poll /
//! checkpoint manager (§4.F), and lifecycle (§4.H), composed over the
//! key codec, delta maps, tier list, and temp queue.

use crate::adapter::Adapter;
use crate::config::CacheOptions;
use crate::consistency::check_after_load;
use crate::delta::DeltaMap;
use crate::keycodec::{decode_state_key, decode_value, encode_checkpoints_key, encode_state_key, encode_value, parse_checkpoints_marker};
use crate::persist;
use crate::temp_queue::TempQueue;
use crate::tier::{Tier, TierList};
use ccache_error::CacheError;
use ccache_observability::Tracer;
use ccache_types::{Checkpoints, Oid, State, Tid};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct CacheState {
    checkpoints: Option<Checkpoints>,
    delta0: DeltaMap,
    delta1: DeltaMap,
    current_tid: Tid,
}

impl CacheState {
    fn fresh() -> Self {
        Self {
            checkpoints: None,
            delta0: DeltaMap::new(),
            delta1: DeltaMap::new(),
            current_tid: Tid::ZERO,
        }
    }
}

/// A decoded, validated hit found while probing tiers for a
/// checkpoint-keyed load (§4.D). `Preferred` came back under `k_cp0`
/// itself; `Fallback` came back under the `Δ1`/`cp1` alternate key and
/// still needs promoting to `k_cp0` on every tier.
enum CheckpointHit {
    Preferred {
        tier_index: usize,
        value: Vec<u8>,
        tid: Tid,
        bytes: Vec<u8>,
    },
    Fallback {
        value: Vec<u8>,
        tid: Tid,
        bytes: Vec<u8>,
    },
}

/// The checkpoint/delta-map cache coherence engine, generic over the
/// database-adapter cursor type `C`.
pub struct StorageCache<C> {
    tiers: TierList,
    adapter: Arc<dyn Adapter<C>>,
    tracer: Arc<dyn Tracer>,
    options: CacheOptions,
    state: Mutex<CacheState>,
    temp: Mutex<Option<TempQueue>>,
    released: AtomicBool,
}

impl<C> StorageCache<C> {
    #[must_use]
    pub fn new(tiers: TierList, adapter: Arc<dyn Adapter<C>>, tracer: Arc<dyn Tracer>, options: CacheOptions) -> Self {
        assert!(!tiers.is_empty(), "a tier list needs at least T0");
        tracer.trace_startup();
        Self {
            tiers,
            adapter,
            tracer,
            options,
            state: Mutex::new(CacheState::fresh()),
            temp: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn checkpoints(&self) -> Option<Checkpoints> {
        self.state.lock().checkpoints
    }

    #[must_use]
    pub fn current_tid(&self) -> Tid {
        self.state.lock().current_tid
    }

    #[must_use]
    pub fn delta0_len(&self) -> usize {
        self.state.lock().delta0.len()
    }

    #[must_use]
    pub fn delta1_len(&self) -> usize {
        self.state.lock().delta1.len()
    }

    // ---- Load path (§4.D) ----------------------------------------

    pub fn load(&self, cursor: &mut C, oid: Oid) -> ccache_error::Result<(Option<State>, Tid)> {
        let state = self.state.lock();

        let Some(checkpoints) = state.checkpoints else {
            drop(state);
            self.tracer.trace_miss(oid);
            let (result, tid) = self.adapter.load_current(cursor, oid);
            return Ok((result, tid));
        };

        if let Some(delta_tid) = state.delta0.get(oid) {
            return self.load_hot_key(cursor, oid, delta_tid, checkpoints, state);
        }

        self.load_via_checkpoints(cursor, oid, checkpoints, state)
    }

    /// `oid ∈ Δ0`: only the key at `Δ0[oid]` is legal.
    fn load_hot_key(
        &self,
        cursor: &mut C,
        oid: Oid,
        delta_tid: Tid,
        checkpoints: Checkpoints,
        state: parking_lot::MutexGuard<'_, CacheState>,
    ) -> ccache_error::Result<(Option<State>, Tid)> {
        let key = encode_state_key(&self.options.prefix, delta_tid, oid);
        // A tier whose entry is absent, undersized, or carries a stale
        // tid does not stop the probe — the next tier is tried before
        // falling back to the adapter (§4.D; `storage_cache.py`'s
        // `load` loops `for client in self.clients_local_first` and
        // only returns once `cache_data and len(cache_data) >= 8`).
        let hit = self.tiers.probe_local_first(&key, |_index, value| {
            decode_value(&value).and_then(|(tid, bytes)| (tid == delta_tid).then(|| (tid, bytes.to_vec())))
        });
        if let Some((tid, bytes)) = hit {
            self.tracer.trace_hit(oid, tid, bytes.len());
            return Ok((Some(bytes), tid));
        }

        let current_tid = state.current_tid;
        let delta0_len = state.delta0.len();
        let delta1_len = state.delta1.len();
        drop(state);

        self.tracer.trace_miss(oid);
        let (result, actual_tid) = self.adapter.load_current(cursor, oid);
        check_after_load(
            oid,
            actual_tid,
            Some(delta_tid),
            current_tid,
            Some(checkpoints),
            delta0_len,
            delta1_len,
        )?;
        if let Some(bytes) = &result {
            let value = encode_value(actual_tid, bytes);
            self.tiers.set_all(&key, &value);
            self.tracer.trace_store_current(oid, actual_tid, bytes.len());
        }
        Ok((result, actual_tid))
    }

    /// `oid ∉ Δ0`: probe `k_cp0` (preferred) and a fallback key from
    /// `Δ1` or `cp1`.
    fn load_via_checkpoints(
        &self,
        cursor: &mut C,
        oid: Oid,
        checkpoints: Checkpoints,
        state: parking_lot::MutexGuard<'_, CacheState>,
    ) -> ccache_error::Result<(Option<State>, Tid)> {
        let k_cp0 = encode_state_key(&self.options.prefix, checkpoints.cp0, oid);
        let mut keys = vec![k_cp0.clone()];
        let alt_key = if let Some(d1_tid) = state.delta1.get(oid) {
            Some(encode_state_key(&self.options.prefix, d1_tid, oid))
        } else if checkpoints.cp0 != checkpoints.cp1 {
            Some(encode_state_key(&self.options.prefix, checkpoints.cp1, oid))
        } else {
            None
        };
        if let Some(alt) = &alt_key {
            keys.push(alt.clone());
        }

        let current_tid = state.current_tid;
        let delta0_len = state.delta0.len();
        let delta1_len = state.delta1.len();
        drop(state);

        // As in `load_hot_key`, a tier's non-empty `get_multi` response
        // that fails to decode on either key does not stop the probe
        // (§4.D; `storage_cache.py`'s `load` falls through its
        // `for client in self.clients_local_first` loop whenever
        // neither `response.get(cp0_key)` nor the alternate key is at
        // least 8 bytes long).
        let hit = self.tiers.probe_multi_local_first(&keys, |tier_index, hits| {
            if let Some((_, value)) = hits.iter().find(|(k, _)| *k == k_cp0) {
                if let Some((tid, bytes)) = decode_value(value) {
                    return Some(CheckpointHit::Preferred {
                        tier_index,
                        value: value.clone(),
                        tid,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            if let Some(alt) = &alt_key {
                if let Some((_, value)) = hits.iter().find(|(k, _)| k == alt) {
                    if let Some((tid, bytes)) = decode_value(value) {
                        return Some(CheckpointHit::Fallback {
                            value: value.clone(),
                            tid,
                            bytes: bytes.to_vec(),
                        });
                    }
                }
            }
            None
        });

        match hit {
            Some(CheckpointHit::Preferred { tier_index, value, tid, bytes }) => {
                self.tracer.trace_hit(oid, tid, bytes.len());
                if tier_index != 0 {
                    self.tiers.set_on(0, &k_cp0, &value);
                }
                return Ok((Some(bytes), tid));
            }
            Some(CheckpointHit::Fallback { value, tid, bytes }) => {
                self.tracer.trace_hit(oid, tid, bytes.len());
                self.tiers.set_all(&k_cp0, &value);
                return Ok((Some(bytes), tid));
            }
            None => {}
        }

        self.tracer.trace_miss(oid);
        let (result, actual_tid) = self.adapter.load_current(cursor, oid);
        if !actual_tid.is_zero() {
            check_after_load(
                oid,
                actual_tid,
                None,
                current_tid,
                Some(checkpoints),
                delta0_len,
                delta1_len,
            )?;
            if let Some(bytes) = &result {
                let value = encode_value(actual_tid, bytes);
                self.tiers.set_all(&k_cp0, &value);
                self.tracer.trace_store_current(oid, actual_tid, bytes.len());
            }
        }
        Ok((result, actual_tid))
    }

    // ---- Write path (§4.E) ----------------------------------------

    pub fn begin(&self) {
        *self.temp.lock() = Some(TempQueue::new());
    }

    pub fn store_temp(&self, oid: Oid, state: &[u8]) -> std::io::Result<()> {
        let mut temp = self.temp.lock();
        let queue = temp.as_mut().expect("store_temp called without begin");
        queue.store_temp(oid, state)
    }

    pub fn read_temp(&self, oid: Oid) -> ccache_error::Result<State> {
        let mut temp = self.temp.lock();
        let queue = temp.as_mut().ok_or(CacheError::QueueTruncated {
            oid,
            expected: 0,
            actual: 0,
        })?;
        queue.read_temp(oid)
    }

    /// Publish every spooled state as `(tid, oid)` entries, batching by
    /// `send_limit` bytes (§4.E). Does not clear the queue; that is
    /// `clear_temp`'s job.
    fn send_queue(&self, tid: Tid) {
        let mut temp = self.temp.lock();
        let Some(queue) = temp.as_mut() else { return };

        let mut batch: smallvec::SmallVec<[(String, Vec<u8>); 16]> = smallvec::SmallVec::new();
        let mut batch_bytes = 0usize;
        for oid in queue.oids_by_offset() {
            let Ok(state) = queue.read_temp(oid) else {
                continue;
            };
            let key = encode_state_key(&self.options.prefix, tid, oid);
            let value = encode_value(tid, &state);
            batch_bytes += key.len() + value.len();
            self.tracer.trace_store_current(oid, tid, state.len());
            batch.push((key, value));
            if batch_bytes >= self.options.send_limit {
                self.tiers.set_multi_all(&batch);
                batch.clear();
                batch_bytes = 0;
            }
        }
        if !batch.is_empty() {
            self.tiers.set_multi_all(&batch);
        }
    }

    /// `Δ0[oid] = tid` unconditionally for every queued `oid` — the
    /// committing transaction's own tid is authoritative by
    /// construction (§4.E, §9b) — then publish the batch.
    pub fn after_tpc_finish(&self, tid: Tid) {
        {
            let mut state = self.state.lock();
            if state.checkpoints.is_some() {
                let temp = self.temp.lock();
                if let Some(queue) = temp.as_ref() {
                    for oid in queue.oids() {
                        state.delta0.insert_unconditional(oid, tid);
                    }
                }
            }
        }
        self.send_queue(tid);
    }

    pub fn clear_temp(&self) {
        *self.temp.lock() = None;
    }

    // ---- Poll / checkpoint manager (§4.F) --------------------------

    pub fn after_poll(&self, cursor: &mut C, prev_tid: Option<Tid>, new_tid: Tid, changes: Option<Vec<(Oid, Tid)>>) {
        let checkpoints_key = encode_checkpoints_key(&self.options.prefix);
        let proposed = self
            .tiers
            .get_global_first(&checkpoints_key)
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|text| parse_checkpoints_marker(&text));

        let mut state = self.state.lock();

        let Some(mut proposed_cp) = proposed else {
            let fresh = Checkpoints::collapsed(new_tid);
            let write_value = state.checkpoints.unwrap_or(fresh);
            self.tiers.set_all(&checkpoints_key, write_value.to_string().as_bytes());
            state.checkpoints = Some(fresh);
            state.delta0.clear();
            state.delta1.clear();
            state.current_tid = new_tid;
            return;
        };

        let mut allow_shift = true;
        if proposed_cp.cp0 > new_tid {
            proposed_cp = state.checkpoints.unwrap_or_else(|| Checkpoints::collapsed(new_tid));
            allow_shift = false;
        }

        let fast_path_eligible = Some(proposed_cp) == state.checkpoints
            && prev_tid.is_some()
            && prev_tid.unwrap() <= state.current_tid
            && state.current_tid <= new_tid;

        match (fast_path_eligible, changes) {
            (true, Some(changes)) => {
                for (oid, tid) in changes {
                    state.delta0.insert_if_greater(oid, tid);
                    self.tracer.trace_invalidate(oid, tid);
                }
                state.current_tid = new_tid;
            }
            (_, _) => {
                state.checkpoints = Some(proposed_cp);
                let mut delta0 = DeltaMap::new();
                let mut delta1 = DeltaMap::new();
                if proposed_cp.cp1 < new_tid {
                    let raw = self.adapter.list_changes(cursor, proposed_cp.cp1, new_tid);
                    let mut latest: hashbrown::HashMap<Oid, Tid> = hashbrown::HashMap::new();
                    for (oid, tid) in raw {
                        latest
                            .entry(oid)
                            .and_modify(|existing| {
                                if tid > *existing {
                                    *existing = tid;
                                }
                            })
                            .or_insert(tid);
                    }
                    for (oid, tid) in latest {
                        if tid > proposed_cp.cp0 {
                            delta0.insert_unconditional(oid, tid);
                        } else if tid > proposed_cp.cp1 {
                            delta1.insert_unconditional(oid, tid);
                        }
                        self.tracer.trace_invalidate(oid, tid);
                    }
                }
                state.delta0 = delta0;
                state.delta1 = delta1;
                state.current_tid = new_tid;
            }
        }

        if allow_shift && state.delta0.len() >= self.options.delta_size_limit {
            let oversize = state.delta0.len() >= 2 * self.options.delta_size_limit;
            let checkpoints_now = state.checkpoints.expect("checkpoints were just set above");
            drop(state);
            self.suggest_shift(new_tid, oversize, checkpoints_now);
        }
    }

    fn suggest_shift(&self, tid: Tid, oversize: bool, current: Checkpoints) {
        if tid <= current.cp0 {
            return;
        }
        let want = if oversize {
            Checkpoints::collapsed(tid)
        } else {
            Checkpoints::new(tid, current.cp0).expect("tid > current.cp0 was just checked")
        };
        let checkpoints_key = encode_checkpoints_key(&self.options.prefix);
        let marker = self
            .tiers
            .get_global_first(&checkpoints_key)
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|text| parse_checkpoints_marker(&text));
        let should_publish = match marker {
            None => true,
            Some(existing) => existing == current,
        };
        if should_publish {
            self.tiers.set_all(&checkpoints_key, want.to_string().as_bytes());
        }
    }

    // ---- Lifecycle (§4.H) ------------------------------------------

    /// A sibling instance. When `share_local_cache` is set, `T₀` is
    /// shared by reference; otherwise `fresh_local` supplies a brand
    /// new local tier (the core has no way to construct one itself —
    /// that is the embedder's concrete [`Tier`] implementation).
    pub fn new_instance(&self, adapter: Arc<dyn Adapter<C>>, fresh_local: Option<Arc<dyn Tier>>) -> Self {
        let tiers = if self.options.share_local_cache {
            self.tiers.clone()
        } else {
            self.tiers.with_local(
                fresh_local.expect("new_instance needs a fresh local tier when share_local_cache is false"),
            )
        };

        let max_tid = tiers
            .local()
            .iter_entries()
            .ok()
            .into_iter()
            .flatten()
            .filter_map(|(key, _)| decode_state_key(&key).map(|(tid, _)| tid))
            .max()
            .unwrap_or(Tid::ZERO);

        let (delta0, delta1) = {
            let parent = self.state.lock();
            (parent.delta0.clone(), parent.delta1.clone())
        };

        Self {
            tiers,
            adapter,
            tracer: self.tracer.clone(),
            options: self.options.clone(),
            state: Mutex::new(CacheState {
                checkpoints: Some(Checkpoints::collapsed(max_tid)),
                delta0,
                delta1,
                current_tid: max_tid,
            }),
            temp: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    pub fn release(&self) {
        self.tiers.disconnect_all();
        self.released.store(true, Ordering::SeqCst);
    }

    pub fn close(&self) {
        if let Some(dir) = self.options.local_snapshot_dir.clone() {
            let path = dir.join(format!("{}.cache", self.options.prefix));
            if let Err(err) = self.persist(&path) {
                tracing::warn!(%err, "best-effort persist on close failed");
            }
        }
        self.release();
    }

    pub fn clear(&self, reload: bool) {
        self.tiers.flush_all();
        {
            let mut state = self.state.lock();
            state.checkpoints = None;
            state.delta0.clear();
            state.delta1.clear();
            state.current_tid = Tid::ZERO;
        }
        if reload {
            if let Some(dir) = self.options.local_snapshot_dir.clone() {
                let path = dir.join(format!("{}.cache", self.options.prefix));
                if let Err(err) = self.load_persistent(&path) {
                    tracing::warn!(%err, "failed to reload persisted snapshot after clear");
                }
            }
        }
    }

    // ---- Introspection (§10.7 item 1) -------------------------------

    #[must_use]
    pub fn len(&self) -> usize {
        if self.released.load(Ordering::SeqCst) {
            return 0;
        }
        self.tiers.local().iter_entries().map(|e| e.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn size(&self) -> usize {
        if self.released.load(Ordering::SeqCst) {
            return 0;
        }
        self.tiers
            .local()
            .iter_entries()
            .map(|entries| entries.iter().map(|(k, v)| k.len() + v.len()).sum())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        if self.released.load(Ordering::SeqCst) {
            return 0;
        }
        self.tiers.local().capacity().unwrap_or(0)
    }

    // ---- Persistence (§6, §9c) --------------------------------------

    /// Write a snapshot of the local tier, filtered to the newest `tid`
    /// per `oid`, gated on the local tier having seen both hits and
    /// sets since the last reset (§9c, §10.7 item 2).
    pub fn persist(&self, path: &Path) -> ccache_error::Result<()> {
        let stats = self.tiers.local().stats();
        if !(stats.hits > 0 && stats.sets > 0) {
            tracing::debug!("skipping snapshot persist: no local-tier traffic since last reset");
            return Ok(());
        }

        let max_tid = self.state.lock().current_tid;
        let entries = self
            .tiers
            .local()
            .iter_entries()
            .map_err(|err| CacheError::BadSnapshot { reason: err.to_string() })?;
        let filtered = persist::filter_newest_per_oid(entries, &self.options.prefix);

        let file = std::fs::File::create(path)
            .map_err(|err| CacheError::BadSnapshot { reason: err.to_string() })?;
        let mut writer = std::io::BufWriter::new(file);
        persist::write_snapshot(&mut writer, max_tid, &filtered)
            .map_err(|err| CacheError::BadSnapshot { reason: err.to_string() })?;
        Ok(())
    }

    /// Load a snapshot, initializing checkpoints if absent and folding
    /// surviving entries into `Δ1` and `T₀` (§6).
    pub fn load_persistent(&self, path: &Path) -> ccache_error::Result<()> {
        let file = std::fs::File::open(path)
            .map_err(|err| CacheError::BadSnapshot { reason: err.to_string() })?;
        let mut reader = std::io::BufReader::new(file);
        let (max_tid, entries) = persist::read_snapshot(&mut reader)
            .map_err(|err| CacheError::BadSnapshot { reason: err.to_string() })?;

        let mut state = self.state.lock();
        if let Some(cp) = state.checkpoints {
            if max_tid > cp.cp0 {
                return Err(CacheError::BadSnapshot {
                    reason: format!("snapshot max_tid {max_tid} exceeds current cp0 {}", cp.cp0),
                });
            }
        } else {
            state.checkpoints = Some(Checkpoints::collapsed(max_tid));
            state.current_tid = max_tid;
        }

        for (key, value) in &entries {
            let Some((tid, oid)) = decode_state_key(key) else {
                continue;
            };
            let improves = state.delta1.get(oid).map_or(true, |existing| tid > existing);
            if improves {
                state.delta1.insert_unconditional(oid, tid);
            }
            self.tiers.set_on(0, key, value);
        }

        let checkpoints = state.checkpoints.expect("checkpoints initialized above");
        drop(state);
        let checkpoints_key = encode_checkpoints_key(&self.options.prefix);
        self.tiers.set_on(0, &checkpoints_key, checkpoints.to_string().as_bytes());
        self.tiers.local().reset_stats();
        Ok(())
    }
}
