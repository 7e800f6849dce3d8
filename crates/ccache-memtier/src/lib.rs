//! A concrete process-local tier ([`local::LocalTier`]) and in-memory
//! fakes ([`fakes`]) used by tests and as a reference for embedders
//! writing their own [`ccache_core::tier::Tier`] / adapter
//! implementations.

pub mod fakes;
pub mod local;

pub use fakes::{FakeAdapter, FakeRemoteTier};
pub use local::LocalTier;
