//! Cache key and value envelope encoding (§4.A).

use ccache_types::{Oid, Tid};

/// The well-known suffix distinguishing a state key from the checkpoints
/// marker key.
const STATE_TAG: &str = "state";
const CHECKPOINTS_TAG: &str = "checkpoints";

/// Build the ASCII state key `"{prefix}:state:{tid}:{oid}"`.
#[must_use]
pub fn encode_state_key(prefix: &str, tid: Tid, oid: Oid) -> String {
    format!("{prefix}:{STATE_TAG}:{}:{}", tid.get(), oid.get())
}

/// Build the checkpoints marker key `"{prefix}:checkpoints"`.
#[must_use]
pub fn encode_checkpoints_key(prefix: &str) -> String {
    format!("{prefix}:{CHECKPOINTS_TAG}")
}

/// Split a state key into `(tid, oid)`. Returns `None` for anything that
/// is not exactly four colon-separated ASCII fields with the last two
/// parsing as non-negative integers (the `checkpoints` key included).
/// The second field is not inspected — matching `_from_state_key` in the
/// original, which only checks the part count, never `parts[1]`.
#[must_use]
pub fn decode_state_key(key: &str) -> Option<(Tid, Oid)> {
    let mut parts = key.split(':');
    let _prefix = parts.next()?;
    let _tag = parts.next()?;
    let tid_str = parts.next()?;
    let oid_str = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let tid = tid_str.parse::<u64>().ok()?;
    let oid = oid_str.parse::<u64>().ok()?;
    Some((Tid::new(tid), Oid::new(oid)))
}

/// Encode a cache value: 8-byte big-endian `tid` followed by `state`.
#[must_use]
pub fn encode_value(tid: Tid, state: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + state.len());
    buf.extend_from_slice(&tid.to_be_bytes());
    buf.extend_from_slice(state);
    buf
}

/// Decode a cache value. `None` if shorter than 8 bytes ("no hit").
#[must_use]
pub fn decode_value(bytes: &[u8]) -> Option<(Tid, &[u8])> {
    if bytes.len() < 8 {
        return None;
    }
    let mut tid_bytes = [0u8; 8];
    tid_bytes.copy_from_slice(&bytes[..8]);
    Some((Tid::from_be_bytes(tid_bytes), &bytes[8..]))
}

/// Parse a checkpoints marker value of the form `"c0 c1"`, requiring
/// `c0 >= c1`. Anything else (extra fields, non-integers, inverted pair)
/// is rejected so a caller falls through to the next tier (§7: "Bad
/// checkpoints marker").
#[must_use]
pub fn parse_checkpoints_marker(value: &str) -> Option<ccache_types::Checkpoints> {
    let mut parts = value.split(' ');
    let c0 = parts.next()?.parse::<u64>().ok()?;
    let c1 = parts.next()?.parse::<u64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    ccache_types::Checkpoints::new(Tid::new(c0), Tid::new(c1))
}
