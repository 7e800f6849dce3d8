use std::sync::Arc;

use ccache_core::adapter::{Mover, Poller};
use ccache_core::cache::StorageCache;
use ccache_core::config::CacheOptions;
use ccache_core::keycodec::{encode_state_key, encode_value};
use ccache_core::tier::{Tier, TierList, TierResult};
use ccache_observability::NullTracer;
use ccache_types::{Oid, State, Tid};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct MapTier(RwLock<HashMap<String, Vec<u8>>>);

impl Tier for MapTier {
    fn get(&self, key: &str) -> TierResult<Option<Vec<u8>>> {
        Ok(self.0.read().get(key).cloned())
    }

    fn get_multi(&self, keys: &[String]) -> TierResult<Vec<(String, Vec<u8>)>> {
        let guard = self.0.read();
        Ok(keys
            .iter()
            .filter_map(|k| guard.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    fn set(&self, key: &str, value: &[u8]) -> TierResult<()> {
        self.0.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn set_multi(&self, items: &[(String, Vec<u8>)]) -> TierResult<()> {
        let mut guard = self.0.write();
        for (k, v) in items {
            guard.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    fn flush_all(&self) -> TierResult<()> {
        self.0.write().clear();
        Ok(())
    }

    fn disconnect(&self) -> TierResult<()> {
        Ok(())
    }
}

struct UnusedAdapter;

impl Mover<()> for UnusedAdapter {
    fn load_current(&self, _cursor: &mut (), _oid: Oid) -> (Option<State>, Tid) {
        (None, Tid::ZERO)
    }
}

impl Poller<()> for UnusedAdapter {
    fn list_changes(&self, _cursor: &mut (), _after: Tid, _upto: Tid) -> Vec<(Oid, Tid)> {
        Vec::new()
    }
}

fn hot_key_hit(c: &mut Criterion) {
    let local = Arc::new(MapTier::default());
    let tiers = TierList::new(vec![local.clone()]);
    let cache = StorageCache::new(
        tiers,
        Arc::new(UnusedAdapter),
        Arc::new(NullTracer),
        CacheOptions::new("bench"),
    );

    let oid = Oid::new(1);
    let tid = Tid::new(100);
    let key = encode_state_key("bench", tid, oid);
    local.set(&key, &encode_value(tid, b"payload")).unwrap();

    // Seed checkpoints and Δ0 via a poll so the hot-key branch is hit.
    let mut cursor = ();
    cache.after_poll(&mut cursor, None, tid, None);
    cache.after_poll(&mut cursor, Some(tid), tid, Some(vec![(oid, tid)]));

    c.bench_function("load_path_hot_key_hit", |b| {
        b.iter(|| {
            let mut cursor = ();
            let result = cache.load(&mut cursor, black_box(oid)).unwrap();
            black_box(result);
        });
    });
}

criterion_group!(benches, hot_key_hit);
criterion_main!(benches);
