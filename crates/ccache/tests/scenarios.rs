//! The six concrete scenarios from §8, driven end-to-end through
//! [`FakeAdapter`] and [`LocalTier`].

use std::sync::Arc;

use ccache::{
    keycodec, CacheError, CacheOptions, FakeAdapter, FakeRemoteTier, LocalTier, NullTracer,
    StorageCache, Tier, TierList,
};
use ccache_types::{Oid, Tid};

fn single_tier(prefix: &str, delta_size_limit: usize) -> (StorageCache<()>, Arc<LocalTier>, Arc<FakeAdapter>) {
    let local = Arc::new(LocalTier::new());
    let adapter = Arc::new(FakeAdapter::new());
    let tiers = TierList::new(vec![local.clone()]);
    let options = CacheOptions::new(prefix).with_delta_size_limit(delta_size_limit);
    let cache = StorageCache::new(tiers, adapter.clone(), Arc::new(NullTracer), options);
    (cache, local, adapter)
}

/// `T0` (local) plus `T1` (a second, non-local tier standing in for a
/// shared remote cache), for exercising multi-tier probe fallthrough.
fn two_tier(
    prefix: &str,
    delta_size_limit: usize,
) -> (StorageCache<()>, Arc<LocalTier>, Arc<FakeRemoteTier>, Arc<FakeAdapter>) {
    let local = Arc::new(LocalTier::new());
    let remote = Arc::new(FakeRemoteTier::new());
    let adapter = Arc::new(FakeAdapter::new());
    let tiers = TierList::new(vec![
        local.clone() as Arc<dyn Tier>,
        remote.clone() as Arc<dyn Tier>,
    ]);
    let options = CacheOptions::new(prefix).with_delta_size_limit(delta_size_limit);
    let cache = StorageCache::new(tiers, adapter.clone(), Arc::new(NullTracer), options);
    (cache, local, remote, adapter)
}

#[test]
fn scenario_1_cold_load_miss() {
    let (cache, local, adapter) = single_tier("p", 2);
    adapter.commit(Tid::new(100), vec![(Oid::new(42), b"S".to_vec())]);

    let mut cursor = ();
    let (state, tid) = cache.load(&mut cursor, Oid::new(42)).unwrap();
    assert_eq!(state, Some(b"S".to_vec()));
    assert_eq!(tid, Tid::new(100));
    assert!(cache.checkpoints().is_none());
    assert!(local.iter_entries().unwrap().is_empty(), "cold miss must not write the tier");
}

#[test]
fn scenario_2_polled_then_hit() {
    let (cache, local, adapter) = single_tier("p", 2);
    adapter.commit(Tid::new(100), vec![(Oid::new(42), b"S".to_vec())]);

    let mut cursor = ();
    cache.after_poll(&mut cursor, None, Tid::new(100), None);
    let checkpoints = cache.checkpoints().unwrap();
    assert_eq!(checkpoints.cp0, Tid::new(100));
    assert_eq!(checkpoints.cp1, Tid::new(100));
    assert_eq!(cache.delta0_len(), 0);
    assert_eq!(cache.delta1_len(), 0);

    let marker = local.get("p:checkpoints").unwrap().unwrap();
    assert_eq!(marker, b"100 100");

    let (state, tid) = cache.load(&mut cursor, Oid::new(42)).unwrap();
    assert_eq!(state, Some(b"S".to_vec()));
    assert_eq!(tid, Tid::new(100));

    let key = keycodec::encode_state_key("p", Tid::new(100), Oid::new(42));
    let stored = local.get(&key).unwrap().unwrap();
    assert_eq!(stored, keycodec::encode_value(Tid::new(100), b"S"));
}

#[test]
fn scenario_3_delta_hit_queries_only_the_hot_key() {
    let (cache, local, adapter) = single_tier("p", 2);
    adapter.commit(Tid::new(100), vec![(Oid::new(42), b"old".to_vec())]);
    adapter.commit(Tid::new(110), vec![(Oid::new(42), b"new".to_vec())]);

    let mut cursor = ();
    cache.after_poll(&mut cursor, None, Tid::new(100), None);
    cache.after_poll(
        &mut cursor,
        Some(Tid::new(100)),
        Tid::new(110),
        Some(vec![(Oid::new(42), Tid::new(110))]),
    );
    assert_eq!(cache.current_tid(), Tid::new(110));
    assert_eq!(cache.delta0_len(), 1);

    let (state, tid) = cache.load(&mut cursor, Oid::new(42)).unwrap();
    assert_eq!(state, Some(b"new".to_vec()));
    assert_eq!(tid, Tid::new(110));

    let hot_key = keycodec::encode_state_key("p", Tid::new(110), Oid::new(42));
    let stale_key = keycodec::encode_state_key("p", Tid::new(100), Oid::new(42));
    assert!(local.get(&hot_key).unwrap().is_some());
    assert!(
        local.get(&stale_key).unwrap().is_none(),
        "the delta-hit path must never touch a key other than the hot one"
    );
}

#[test]
fn scenario_4_delta1_promotion_writes_cp0_everywhere() {
    let (cache, local, adapter) = single_tier("p", 2);
    adapter.commit(Tid::new(95), vec![(Oid::new(42), b"S".to_vec())]);

    let mut cursor = ();
    // First poll: adopt (90, 90).
    cache.after_poll(&mut cursor, None, Tid::new(90), None);
    // Simulate a peer's shift already landed on the shared marker.
    local
        .set("p:checkpoints", b"100 90")
        .unwrap();
    // Second poll rebuilds to (100, 90); 95 lands in delta_after_1.
    cache.after_poll(&mut cursor, Some(Tid::new(90)), Tid::new(100), None);
    let checkpoints = cache.checkpoints().unwrap();
    assert_eq!(checkpoints.cp0, Tid::new(100));
    assert_eq!(checkpoints.cp1, Tid::new(90));
    assert_eq!(cache.delta1_len(), 1);
    assert_eq!(cache.delta0_len(), 0);

    // Pre-seed the tier with the Δ1-era entry only.
    let alt_key = keycodec::encode_state_key("p", Tid::new(95), Oid::new(42));
    let value = keycodec::encode_value(Tid::new(95), b"S");
    local.set(&alt_key, &value).unwrap();

    let (state, tid) = cache.load(&mut cursor, Oid::new(42)).unwrap();
    assert_eq!(state, Some(b"S".to_vec()));
    assert_eq!(tid, Tid::new(95));

    let cp0_key = keycodec::encode_state_key("p", Tid::new(100), Oid::new(42));
    let promoted = local.get(&cp0_key).unwrap().unwrap();
    assert_eq!(promoted, value, "promotion writes the same value bytes under the cp0 key");
}

#[test]
fn scenario_5_read_conflict_on_future_tid() {
    let (cache, _local, adapter) = single_tier("p", 2);
    adapter.commit(Tid::new(150), vec![(Oid::new(42), b"S".to_vec())]);

    let mut cursor = ();
    cache.after_poll(&mut cursor, None, Tid::new(100), None);
    assert_eq!(cache.current_tid(), Tid::new(100));

    let err = cache.load(&mut cursor, Oid::new(42)).unwrap_err();
    assert!(matches!(err, CacheError::ReadConflict { actual_tid, current_tid, .. }
        if actual_tid == Tid::new(150) && current_tid == Tid::new(100)));
}

#[test]
fn scenario_6_shift_then_peer_rebuild() {
    let local = Arc::new(LocalTier::new());
    let adapter = Arc::new(FakeAdapter::new());
    let tiers = TierList::new(vec![local.clone() as Arc<dyn Tier>]);
    let options = CacheOptions::new("p").with_delta_size_limit(2);

    let cache1 = StorageCache::new(tiers.clone(), adapter.clone(), Arc::new(NullTracer), options.clone());
    let cache2 = StorageCache::new(tiers, adapter.clone(), Arc::new(NullTracer), options);

    let mut cursor = ();
    adapter.commit(Tid::new(150), vec![(Oid::new(1), b"a".to_vec())]);
    adapter.commit(Tid::new(160), vec![(Oid::new(2), b"b".to_vec())]);

    cache1.after_poll(&mut cursor, None, Tid::new(100), None);
    cache2.after_poll(&mut cursor, None, Tid::new(100), None);
    assert_eq!(cache2.checkpoints().unwrap().cp0, Tid::new(100));

    cache1.after_poll(
        &mut cursor,
        Some(Tid::new(100)),
        Tid::new(200),
        Some(vec![(Oid::new(1), Tid::new(150)), (Oid::new(2), Tid::new(160))]),
    );
    assert_eq!(cache1.delta0_len(), 2);

    let marker = local.get("p:checkpoints").unwrap().unwrap();
    assert_eq!(marker, b"200 100", "suggest_shift must have published the non-oversize pair");

    cache2.after_poll(&mut cursor, Some(Tid::new(100)), Tid::new(200), None);
    let checkpoints = cache2.checkpoints().unwrap();
    assert_eq!(checkpoints.cp0, Tid::new(200));
    assert_eq!(checkpoints.cp1, Tid::new(100));
    assert_eq!(cache2.delta1_len(), 2, "the rebuilt peer repartitions both changes into delta_after_1");
    assert_eq!(cache2.delta0_len(), 0);
}

#[test]
fn write_path_spools_then_publishes_on_commit() {
    let (cache, local, _adapter) = single_tier("p", 2);
    cache.begin();
    cache.store_temp(Oid::new(1), b"alpha").unwrap();
    cache.store_temp(Oid::new(2), b"beta").unwrap();
    assert_eq!(cache.read_temp(Oid::new(1)).unwrap(), b"alpha".to_vec());

    cache.after_poll(&mut (), None, Tid::new(50), None);
    cache.after_tpc_finish(Tid::new(51));
    assert_eq!(cache.delta0_len(), 2);

    let key1 = keycodec::encode_state_key("p", Tid::new(51), Oid::new(1));
    let key2 = keycodec::encode_state_key("p", Tid::new(51), Oid::new(2));
    assert_eq!(local.get(&key1).unwrap().unwrap(), keycodec::encode_value(Tid::new(51), b"alpha"));
    assert_eq!(local.get(&key2).unwrap().unwrap(), keycodec::encode_value(Tid::new(51), b"beta"));

    cache.clear_temp();
    assert!(cache.read_temp(Oid::new(1)).is_err());
}

#[test]
fn persist_then_load_persistent_round_trips_a_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p.cache");

    let (cache, _local, adapter) = single_tier("p", 2);
    adapter.commit(Tid::new(100), vec![(Oid::new(7), b"S".to_vec())]);
    let mut cursor = ();
    cache.after_poll(&mut cursor, None, Tid::new(100), None);
    cache.load(&mut cursor, Oid::new(7)).unwrap();
    // A second load actually hits the tier, satisfying the hits>0 &&
    // sets>0 gate on persistence (§9c).
    cache.load(&mut cursor, Oid::new(7)).unwrap();

    cache.persist(&path).unwrap();
    assert!(path.exists());

    let (cache2, local2, _adapter2) = single_tier("p", 2);
    cache2.load_persistent(&path).unwrap();
    assert_eq!(cache2.checkpoints().unwrap().cp0, Tid::new(100));

    let key = keycodec::encode_state_key("p", Tid::new(100), Oid::new(7));
    let value = local2.get(&key).unwrap().unwrap();
    assert_eq!(value, keycodec::encode_value(Tid::new(100), b"S"));
}

#[test]
fn hot_key_load_skips_an_undersized_local_entry_and_promotes_nothing_extra() {
    // T0 holds a stale/undersized value under the hot key (as if an
    // eviction or a partial write had landed there); T1 holds the
    // genuine one. The probe must not stop at T0 and fall back to the
    // adapter — it must keep trying tiers, matching `storage_cache.py`'s
    // `load` (§4.D).
    let (cache, local, remote, adapter) = two_tier("p", 2);
    adapter.commit(Tid::new(100), vec![(Oid::new(42), b"S".to_vec())]);

    let mut cursor = ();
    cache.after_poll(&mut cursor, None, Tid::new(100), None);
    cache.after_poll(
        &mut cursor,
        Some(Tid::new(100)),
        Tid::new(110),
        Some(vec![(Oid::new(42), Tid::new(110))]),
    );
    assert_eq!(cache.delta0_len(), 1);

    let hot_key = keycodec::encode_state_key("p", Tid::new(110), Oid::new(42));
    local.set(&hot_key, b"short").unwrap();
    remote
        .set(&hot_key, &keycodec::encode_value(Tid::new(110), b"S"))
        .unwrap();

    let (state, tid) = cache.load(&mut cursor, Oid::new(42)).unwrap();
    assert_eq!(state, Some(b"S".to_vec()));
    assert_eq!(tid, Tid::new(110));
}

#[test]
fn checkpoint_keyed_load_skips_an_undersized_local_cp0_entry_and_falls_through_to_remote() {
    let (cache, local, remote, adapter) = two_tier("p", 2);
    adapter.commit(Tid::new(100), vec![(Oid::new(42), b"S".to_vec())]);

    let mut cursor = ();
    cache.after_poll(&mut cursor, None, Tid::new(100), None);

    let cp0_key = keycodec::encode_state_key("p", Tid::new(100), Oid::new(42));
    local.set(&cp0_key, b"short").unwrap();
    remote
        .set(&cp0_key, &keycodec::encode_value(Tid::new(100), b"S"))
        .unwrap();

    let (state, tid) = cache.load(&mut cursor, Oid::new(42)).unwrap();
    assert_eq!(state, Some(b"S".to_vec()));
    assert_eq!(tid, Tid::new(100));
    // The valid value found on the remote tier is promoted to T0.
    assert_eq!(local.get(&cp0_key).unwrap().unwrap(), keycodec::encode_value(Tid::new(100), b"S"));
}
