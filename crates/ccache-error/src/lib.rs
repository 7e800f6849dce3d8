//! Error types raised by the cache coherence engine (§7 of the design).
//!
//! Tier I/O failures and malformed checkpoint markers are deliberately
//! **not** represented here: per policy they are swallowed at the call
//! site (treated as a miss, or logged and ignored) and never surface to
//! a caller as a [`CacheError`].

use ccache_types::{Oid, Tid};

/// Fatal or caller-actionable failures from the cache engine.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The database returned data from a transaction newer than this
    /// instance has polled. The caller should retry the whole
    /// transaction against a fresh snapshot.
    #[error(
        "read conflict: oid={oid} returned data from tid={actual_tid}, \
         but this session has only polled up to tid={current_tid}"
    )]
    ReadConflict {
        oid: Oid,
        actual_tid: Tid,
        current_tid: Tid,
    },

    /// `delta_after0` claimed a tid for `oid` that the database disagrees
    /// with. Either the database is not providing snapshot isolation, or
    /// the local delta map is stale; both are bugs elsewhere in the
    /// system, so this is treated as a fatal assertion with a full
    /// diagnostic, mirroring the original `_check_tid_after_load`.
    #[error(
        "cache inconsistency: oid={oid} expected tid={expected_tid} from delta_after0, \
         database returned tid={actual_tid} (current_tid={current_tid}, \
         checkpoints=({cp0} {cp1}), len(delta_after0)={delta0_len}, \
         len(delta_after1)={delta1_len}, pid={pid}, thread={thread:?})"
    )]
    CacheInconsistency {
        oid: Oid,
        expected_tid: Tid,
        actual_tid: Tid,
        current_tid: Tid,
        cp0: Tid,
        cp1: Tid,
        delta0_len: usize,
        delta1_len: usize,
        pid: u32,
        thread: Option<String>,
    },

    /// A read from the temp-queue spill storage returned fewer bytes
    /// than the recorded `(start, end)` range promised. This indicates
    /// data-structure corruption in the spill file, not a transient I/O
    /// error, and is treated as a fatal assertion.
    #[error("queue truncated: oid={oid} expected {expected} bytes, read {actual}")]
    QueueTruncated {
        oid: Oid,
        expected: usize,
        actual: usize,
    },

    /// The on-disk snapshot's `max_tid` line was unparseable, or placed
    /// the snapshot out of order relative to this instance's checkpoints.
    /// Callers should log and stop trying to load further snapshot
    /// files; the instance itself is not poisoned.
    #[error("snapshot file rejected: {reason}")]
    BadSnapshot { reason: String },
}

impl CacheError {
    /// Build a [`CacheError::CacheInconsistency`] with the current
    /// process id and thread name/id filled in, matching the original's
    /// `pid` / `thread_ident` diagnostic fields.
    #[must_use]
    pub fn cache_inconsistency(
        oid: Oid,
        expected_tid: Tid,
        actual_tid: Tid,
        current_tid: Tid,
        cp0: Tid,
        cp1: Tid,
        delta0_len: usize,
        delta1_len: usize,
    ) -> Self {
        let thread = std::thread::current().name().map(ToOwned::to_owned);
        Self::CacheInconsistency {
            oid,
            expected_tid,
            actual_tid,
            current_tid,
            cp0,
            cp1,
            delta0_len,
            delta1_len,
            pid: std::process::id(),
            thread,
        }
    }
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;
