//! Consistency checks on values returned from the adapter (§4.G).

use ccache_error::CacheError;
use ccache_types::{Checkpoints, Oid, Tid};

/// Verify a freshly loaded `(oid, actual_tid)` against this instance's
/// view of the world.
///
/// - `actual_tid > current_tid` means the database handed back a
///   transaction this instance has not polled up to yet: [`CacheError::ReadConflict`].
/// - `expected_tid` disagreeing with `actual_tid` means the delta map
///   and the database have diverged: [`CacheError::CacheInconsistency`],
///   built with the full diagnostic payload from the original
///   `_check_tid_after_load` assertion.
#[allow(clippy::too_many_arguments)]
pub fn check_after_load(
    oid: Oid,
    actual_tid: Tid,
    expected_tid: Option<Tid>,
    current_tid: Tid,
    checkpoints: Option<Checkpoints>,
    delta0_len: usize,
    delta1_len: usize,
) -> ccache_error::Result<()> {
    if actual_tid > current_tid {
        return Err(CacheError::ReadConflict {
            oid,
            actual_tid,
            current_tid,
        });
    }
    if let Some(expected_tid) = expected_tid {
        if actual_tid != expected_tid {
            let (cp0, cp1) = checkpoints
                .map(|cp| (cp.cp0, cp.cp1))
                .unwrap_or((Tid::ZERO, Tid::ZERO));
            return Err(CacheError::cache_inconsistency(
                oid,
                expected_tid,
                actual_tid,
                current_tid,
                cp0,
                cp1,
                delta0_len,
                delta1_len,
            ));
        }
    }
    Ok(())
}
