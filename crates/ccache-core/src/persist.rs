//! The persisted snapshot file codec (§6).
//!
//! Line 1 is the ASCII decimal `max_tid`. Everything after it is a
//! sequence of length-prefixed `(key, value)` records — the original's
//! own on-disk framing is delegated to an external `write_to_stream`/
//! `read_from_stream` pair and never specified at the byte level, so
//! this is a from-scratch but minimal choice: a `u32` little-endian
//! length prefix on both the key and the value of each record.

use crate::keycodec::{decode_state_key, decode_value, encode_state_key};
use ccache_types::{Oid, Tid};
use std::io::{self, BufRead, Read, Write};

/// Write `max_tid` followed by every `(key, value)` record.
pub fn write_snapshot<W: Write>(
    writer: &mut W,
    max_tid: Tid,
    entries: &[(String, Vec<u8>)],
) -> io::Result<()> {
    writeln!(writer, "{}", max_tid.get())?;
    for (key, value) in entries {
        writer.write_all(&(key.len() as u32).to_le_bytes())?;
        writer.write_all(key.as_bytes())?;
        writer.write_all(&(value.len() as u32).to_le_bytes())?;
        writer.write_all(value)?;
    }
    Ok(())
}

/// Read `max_tid` and every record back out. Malformed input (anything
/// short of a full record at the point a record was expected to start)
/// is reported as an `io::Error` of kind `InvalidData`; the caller maps
/// this to [`ccache_error::CacheError::BadSnapshot`].
pub fn read_snapshot<R: Read>(reader: &mut R) -> io::Result<(Tid, Vec<(String, Vec<u8>)>)> {
    let mut buffered = io::BufReader::new(reader);
    let mut line = String::new();
    buffered.read_line(&mut line)?;
    let max_tid: u64 = line
        .trim_end()
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "unparseable max_tid line"))?;

    let mut entries = Vec::new();
    loop {
        let mut len_buf = [0u8; 4];
        match buffered.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err),
        }
        let key_len = u32::from_le_bytes(len_buf) as usize;
        let mut key_buf = vec![0u8; key_len];
        buffered.read_exact(&mut key_buf)?;
        let key = String::from_utf8(key_buf)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-UTF8 key in snapshot"))?;

        buffered.read_exact(&mut len_buf)?;
        let value_len = u32::from_le_bytes(len_buf) as usize;
        let mut value_buf = vec![0u8; value_len];
        buffered.read_exact(&mut value_buf)?;

        entries.push((key, value_buf));
    }
    Ok((Tid::new(max_tid), entries))
}

/// Filter a local-tier dump down to the newest `tid` per `oid`,
/// rewriting each surviving key so its embedded `tid` matches the
/// value's `tid` (§6, §10.7 item 4 — mirrors `_find_newest_tids_for_oid`,
/// which scans every key regardless of whether its `tid` is still the
/// checkpoint-preferred one).
#[must_use]
pub fn filter_newest_per_oid(entries: Vec<(String, Vec<u8>)>, prefix: &str) -> Vec<(String, Vec<u8>)> {
    let mut newest: hashbrown::HashMap<Oid, (Tid, Vec<u8>)> = hashbrown::HashMap::new();
    for (key, value) in entries {
        let Some((_key_tid, oid)) = decode_state_key(&key) else {
            continue;
        };
        let Some((value_tid, _state)) = decode_value(&value) else {
            continue;
        };
        newest
            .entry(oid)
            .and_modify(|(tid, v)| {
                if value_tid > *tid {
                    *tid = value_tid;
                    *v = value.clone();
                }
            })
            .or_insert((value_tid, value));
    }
    newest
        .into_iter()
        .map(|(oid, (tid, value))| (encode_state_key(prefix, tid, oid), value))
        .collect()
}
