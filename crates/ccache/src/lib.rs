//! Client-side cache coherence engine, assembled.
//!
//! This crate is a thin facade: it re-exports the pieces built by
//! `ccache-core`, `ccache-error`, `ccache-observability`, and
//! `ccache-memtier` under one name, and adds nothing of its own beyond
//! a couple of convenience constructors for the common case of a
//! single local tier with no shared remote tiers.

pub use ccache_core::adapter::{Adapter, Mover, Poller};
pub use ccache_core::cache::StorageCache;
pub use ccache_core::config::CacheOptions;
pub use ccache_core::delta::DeltaMap;
pub use ccache_core::keycodec;
pub use ccache_core::tier::{Tier, TierError, TierList, TierResult, TierStats};
pub use ccache_error::{CacheError, Result};
pub use ccache_observability::{event_code, init_tracing, NullTracer, Tracer, TracingTracer};
pub use ccache_memtier::{FakeAdapter, FakeRemoteTier, LocalTier};
pub use ccache_types::{Checkpoints, Oid, State, Tid};

use std::sync::Arc;

/// Build a [`StorageCache`] with a single local tier and no shared
/// remote tiers — the common starting point for an embedder that has
/// not yet wired up a shared cache service.
#[must_use]
pub fn single_tier_cache<C>(
    adapter: Arc<dyn Adapter<C>>,
    tracer: Arc<dyn Tracer>,
    options: CacheOptions,
) -> StorageCache<C> {
    let local = Arc::new(LocalTier::new());
    let tiers = TierList::new(vec![local]);
    StorageCache::new(tiers, adapter, tracer, options)
}
