//! Reference-counted lock-cell table ("refLockSet").
//!
//! A cell exists only while at least one caller is either holding or
//! waiting on it; the table drops it the instant its refcount reaches
//! zero so the table's memory is bounded by live contention, not by the
//! set of names ever seen.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) struct Cell<P> {
    primitive: P,
    refs: AtomicUsize,
}

/// A table of reference-counted cells, one per distinct name, each
/// wrapping a primitive `P` — [`crate::key::KeyLockerGroup`] instantiates
/// this with [`crate::timed::BlockingLock`]. Path mode needs multi-cell
/// atomicity this table's per-call locking can't give it, so
/// [`crate::path::PathLockerGroup`] keeps its own shard state instead (see
/// that module).
///
/// The table's own mutex guards only the map and the refcount field
/// together; it is never held while a caller blocks on a cell's
/// primitive. A `Cell`'s primitive is reached through a plain `Arc`, not a
/// second lock layered on top of the map's — blocking inside `P`'s own
/// acquire must never also hold the table mutex, or one contended name
/// would stall lookups for every other name in the shard.
pub(crate) struct RefCountedSlot<P> {
    cells: Mutex<HashMap<String, Arc<Cell<P>>>>,
}

impl<P> RefCountedSlot<P> {
    pub(crate) fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cell for `name`, creating it with `make` if absent, and
    /// increments its refcount. The caller must later call [`Self::release`]
    /// exactly once for each successful `acquire`.
    pub(crate) fn acquire(&self, name: &str, make: impl FnOnce() -> P) -> Arc<Cell<P>> {
        let mut cells = self.cells.lock();
        if let Some(cell) = cells.get(name) {
            cell.refs.fetch_add(1, Ordering::SeqCst);
            return cell.clone();
        }
        let cell = Arc::new(Cell {
            primitive: make(),
            refs: AtomicUsize::new(1),
        });
        cells.insert(name.to_string(), cell.clone());
        cell
    }

    /// Decrements `name`'s refcount and drops the cell from the table if it
    /// reaches zero. Idempotent misuse (releasing a name with no cell) is
    /// a silent no-op — the caller only reaches here after a matched
    /// `acquire`, so this path is purely defensive.
    pub(crate) fn release(&self, name: &str) {
        let mut cells = self.cells.lock();
        let Some(cell) = cells.get(name) else {
            return;
        };
        let prev = cell.refs.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "refcount underflow releasing {name:?}");
        if prev == 1 {
            cells.remove(name);
        }
    }

    /// Returns the cell for `name` without touching its refcount, or
    /// `None` if absent. Used on the release path, where the caller already
    /// holds a reference and only needs the primitive, not another count.
    pub(crate) fn peek(&self, name: &str) -> Option<Arc<Cell<P>>> {
        self.cells.lock().get(name).cloned()
    }

    /// Number of distinct names with a live cell. Used by tests to assert
    /// the table drains back to empty after every lease releases.
    #[cfg(test)]
    pub(crate) fn live_count(&self) -> usize {
        self.cells.lock().len()
    }
}

/// Reaches `cell`'s primitive without taking any lock beyond what `P`
/// itself manages internally — safe to call with a blocking `f` for an
/// arbitrarily long wait, since nothing here is held across it.
pub(crate) fn with_primitive<P, R>(cell: &Cell<P>, f: impl FnOnce(&P) -> R) -> R {
    f(&cell.primitive)
}
