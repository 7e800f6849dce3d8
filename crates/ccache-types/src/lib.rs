//! Core value types shared by the cache coherence engine.
//!
//! `Oid` and `Tid` are the two identifiers the rest of the workspace is
//! built around: an object identifier and a transaction identifier, both
//! 64-bit and both treated as opaque monotonic counters (no timestamp
//! decoding is attempted anywhere in this crate).

use std::fmt;

/// Persistent object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Oid(pub u64);

impl Oid {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for Oid {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction identifier. Strictly monotonically increasing across the
/// whole database; `Tid(0)` means "no such transaction" (an object that
/// does not exist yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tid(pub u64);

impl Tid {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// 8-byte big-endian encoding, as stored in the cache value envelope.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    #[must_use]
    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl From<u64> for Tid {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque object state. Possibly empty; never assumed to have any
/// particular structure by this crate.
pub type State = Vec<u8>;

/// A pair of floating checkpoints, `cp0 >= cp1`, used by readers as the
/// preferred cache-key timestamps. Absent until the owning instance has
/// polled at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoints {
    pub cp0: Tid,
    pub cp1: Tid,
}

impl Checkpoints {
    /// Construct checkpoints, enforcing `cp0 >= cp1`.
    #[must_use]
    pub fn new(cp0: Tid, cp1: Tid) -> Option<Self> {
        if cp0 >= cp1 {
            Some(Self { cp0, cp1 })
        } else {
            None
        }
    }

    /// Both checkpoints collapsed onto the same tid.
    #[must_use]
    pub const fn collapsed(tid: Tid) -> Self {
        Self { cp0: tid, cp1: tid }
    }

    #[must_use]
    pub const fn is_collapsed(self) -> bool {
        self.cp0.0 == self.cp1.0
    }
}

impl fmt::Display for Checkpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.cp0, self.cp1)
    }
}
