//! Configuration options consumed by the engine (§6, expanded in SPEC_FULL §10.5).
//!
//! `cache_servers` / `cache_module_name` from the original interface
//! select and construct the *remote* tier client, which this crate
//! treats as entirely the embedder's concern: callers build their own
//! [`crate::tier::Tier`] implementations and hand the finished
//! [`crate::tier::TierList`] to [`crate::cache::StorageCache::new`]. There
//! is nothing left here for those two options to configure.

use std::path::PathBuf;

/// Default `cache_delta_size_limit`, matching RelStorage's own default.
pub const DEFAULT_DELTA_SIZE_LIMIT: usize = 10_000;

/// Default `send_limit`: ~1 MiB (§4.E).
pub const DEFAULT_SEND_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// `δmax`: the size at which `Δ0` triggers a shift suggestion.
    pub delta_size_limit: usize,
    /// Whether `new_instance` shares `T₀` with its parent.
    pub share_local_cache: bool,
    /// Directory for snapshot load/save, if persistence is wanted.
    pub local_snapshot_dir: Option<PathBuf>,
    /// Byte budget per `set_multi` batch in the write path.
    pub send_limit: usize,
    /// The embedder-chosen cache-key prefix.
    pub prefix: String,
}

impl CacheOptions {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            delta_size_limit: DEFAULT_DELTA_SIZE_LIMIT,
            share_local_cache: true,
            local_snapshot_dir: None,
            send_limit: DEFAULT_SEND_LIMIT,
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn with_delta_size_limit(mut self, limit: usize) -> Self {
        self.delta_size_limit = limit;
        self
    }

    #[must_use]
    pub fn with_share_local_cache(mut self, share: bool) -> Self {
        self.share_local_cache = share;
        self
    }

    #[must_use]
    pub fn with_local_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_snapshot_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_send_limit(mut self, limit: usize) -> Self {
        self.send_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let opts = CacheOptions::new("p");
        assert_eq!(opts.delta_size_limit, DEFAULT_DELTA_SIZE_LIMIT);
        assert!(opts.share_local_cache);
        assert_eq!(opts.send_limit, DEFAULT_SEND_LIMIT);
        assert_eq!(opts.prefix, "p");
        assert!(opts.local_snapshot_dir.is_none());
    }

    #[test]
    fn builder_methods_override_defaults() {
        let opts = CacheOptions::new("p")
            .with_delta_size_limit(2)
            .with_share_local_cache(false)
            .with_send_limit(64);
        assert_eq!(opts.delta_size_limit, 2);
        assert!(!opts.share_local_cache);
        assert_eq!(opts.send_limit, 64);
    }
}
