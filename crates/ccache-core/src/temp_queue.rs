//! The per-transaction spool (§4.E, §9 "spill file for large commits").
//!
//! States are appended to an in-memory buffer; once the buffer exceeds
//! `spill_threshold` bytes, its contents (and every subsequent write)
//! move to an anonymous temporary file, so a single commit with many
//! large objects never needs to hold all of them in memory at once.

use ccache_error::CacheError;
use ccache_types::{Oid, State};
use hashbrown::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};

/// Default point at which the spool moves from memory to a backing file:
/// 8 MiB, generous enough that ordinary transactions never spill.
const DEFAULT_SPILL_THRESHOLD: usize = 8 * 1024 * 1024;

enum Backing {
    Memory(Vec<u8>),
    File(tempfile::NamedTempFile),
}

/// A byte-addressable spool plus the `oid → (start, end)` offset map
/// (§3: "Temp queue").
pub struct TempQueue {
    backing: Backing,
    offsets: HashMap<Oid, (u64, u64)>,
    spill_threshold: usize,
}

impl TempQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::with_spill_threshold(DEFAULT_SPILL_THRESHOLD)
    }

    #[must_use]
    pub fn with_spill_threshold(spill_threshold: usize) -> Self {
        Self {
            backing: Backing::Memory(Vec::new()),
            offsets: HashMap::new(),
            spill_threshold,
        }
    }

    fn len(&self) -> std::io::Result<u64> {
        match &self.backing {
            Backing::Memory(buf) => Ok(buf.len() as u64),
            Backing::File(file) => Ok(file.as_file().metadata()?.len()),
        }
    }

    fn spill_to_file(&mut self) -> std::io::Result<()> {
        if let Backing::Memory(buf) = &self.backing {
            let mut file = tempfile::NamedTempFile::new()?;
            file.write_all(buf)?;
            self.backing = Backing::File(file);
        }
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> std::io::Result<u64> {
        let start = self.len()?;
        if matches!(&self.backing, Backing::Memory(buf) if buf.len() + bytes.len() > self.spill_threshold)
        {
            self.spill_to_file()?;
        }
        match &mut self.backing {
            Backing::Memory(buf) => buf.extend_from_slice(bytes),
            Backing::File(file) => {
                file.as_file_mut().seek(SeekFrom::End(0))?;
                file.as_file_mut().write_all(bytes)?;
            }
        }
        Ok(start)
    }

    /// Append `state` and record its offset range for `oid`. A repeated
    /// store for the same `oid` overwrites the map entry; the earlier
    /// bytes become dead and are not reclaimed (§4.E).
    pub fn store_temp(&mut self, oid: Oid, state: &[u8]) -> std::io::Result<()> {
        let start = self.append(state)?;
        let end = start + state.len() as u64;
        self.offsets.insert(oid, (start, end));
        Ok(())
    }

    /// Read back the bytes stored for `oid`.
    pub fn read_temp(&mut self, oid: Oid) -> ccache_error::Result<State> {
        let (start, end) = *self.offsets.get(&oid).ok_or_else(|| {
            CacheError::QueueTruncated {
                oid,
                expected: 0,
                actual: 0,
            }
        })?;
        let expected = (end - start) as usize;
        let mut buf = vec![0u8; expected];
        match &mut self.backing {
            Backing::Memory(mem) => {
                let start = start as usize;
                let end = end as usize;
                if end > mem.len() {
                    return Err(CacheError::QueueTruncated {
                        oid,
                        expected,
                        actual: mem.len().saturating_sub(start),
                    });
                }
                buf.copy_from_slice(&mem[start..end]);
            }
            Backing::File(file) => {
                let io_err = |err: std::io::Error| {
                    tracing::warn!(%err, "temp queue file I/O failure");
                    CacheError::QueueTruncated {
                        oid,
                        expected,
                        actual: 0,
                    }
                };
                file.as_file_mut()
                    .seek(SeekFrom::Start(start))
                    .map_err(io_err)?;
                let read = file.as_file_mut().read(&mut buf).map_err(io_err)?;
                if read != expected {
                    return Err(CacheError::QueueTruncated {
                        oid,
                        expected,
                        actual: read,
                    });
                }
            }
        }
        Ok(buf)
    }

    /// Every spooled `(oid, start)` pair, sorted ascending by `start`
    /// for sequential read locality (§4.E).
    #[must_use]
    pub fn oids_by_offset(&self) -> Vec<Oid> {
        let mut entries: Vec<(Oid, u64)> = self.offsets.iter().map(|(&oid, &(s, _))| (oid, s)).collect();
        entries.sort_by_key(|&(_, start)| start);
        entries.into_iter().map(|(oid, _)| oid).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    #[must_use]
    pub fn oids(&self) -> impl Iterator<Item = Oid> + '_ {
        self.offsets.keys().copied()
    }
}

impl Default for TempQueue {
    fn default() -> Self {
        Self::new()
    }
}
