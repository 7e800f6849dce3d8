//! The database adapter capability (§6: "Collaborator: adapter").
//!
//! The adapter is split into the two operations the engine actually
//! needs, each its own trait, so a test fake can implement only the one
//! a given test exercises. `Adapter` is a blanket bundle for callers
//! that want both (mirrors §9's "small capability set ... accept any
//! variant satisfying it").
//!
//! Both traits are generic over a `Cursor` type: the engine never
//! constructs or interprets a cursor, only threads it through to calls
//! (§1: "the database adapter ... not re-specified here").

use ccache_types::{Oid, State, Tid};

/// Loads the current (highest-committed) state of an object.
pub trait Mover<Cursor> {
    /// Returns `(None, Tid::ZERO)` when the object does not exist;
    /// otherwise `(Some(state), tid)`.
    fn load_current(&self, cursor: &mut Cursor, oid: Oid) -> (Option<State>, Tid);
}

/// Enumerates committed changes in a tid range.
pub trait Poller<Cursor> {
    /// Yields `(oid, tid)` pairs with `after_tid < tid <= upto_tid`, in
    /// no particular order.
    fn list_changes(&self, cursor: &mut Cursor, after_tid: Tid, upto_tid: Tid) -> Vec<(Oid, Tid)>;
}

/// Bundled adapter capability. Blanket-implemented for any type
/// satisfying both halves.
pub trait Adapter<Cursor>: Mover<Cursor> + Poller<Cursor> {}

impl<Cursor, T> Adapter<Cursor> for T where T: Mover<Cursor> + Poller<Cursor> {}
