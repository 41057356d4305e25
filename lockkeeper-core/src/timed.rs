//! Deadline-bounded blocking primitives.
//!
//! A goroutine-and-select style implementation would race a detached
//! worker's blocking acquire against a deadline timer, with an atomic
//! flag to decide the race exactly once — that dance exists only because
//! such a runtime has no deadline-bound wait primitive to begin with.
//! `parking_lot`'s `Condvar::wait_until` already blocks a caller up to an
//! absolute deadline and reports whether it woke from a signal or a
//! timeout, so both primitives below implement the full
//! acquire/timeout/release contract directly on top of it, with no extra
//! worker thread and nothing to leak on timeout.

use parking_lot::{Condvar, Mutex};
use std::time::Instant;

/// Waits on a predicate, protected by a `Mutex`, until it becomes true or
/// `deadline` passes. Shared by [`BlockingLock`] (key-mode cells) and
/// [`OneShotSignal`] (path-mode pending waiters) so both get identical
/// deadline semantics from one place.
fn wait_until(mutex: &Mutex<bool>, cv: &Condvar, deadline: Instant) -> bool {
    let mut state = mutex.lock();
    loop {
        if *state {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        let result = cv.wait_until(&mut state, deadline);
        // A spurious wakeup can report timed_out() even though the
        // predicate flipped true in the same instant; always re-check
        // the flag rather than trusting the wait result alone.
        if *state {
            return true;
        }
        if result.timed_out() {
            return false;
        }
    }
}

/// An exclusive lock whose acquire can be bounded by an absolute deadline
/// and whose release does not require holding a RAII guard: any caller
/// that knows it currently owns the lock may release it. This mirrors
/// `sync.Mutex`'s unlock-from-anywhere semantics, which
/// [`crate::refcount::RefCountedSlot`] relies on — the cell that hands out
/// the primitive at acquire time is not the same call site that releases
/// it at unlock time.
#[derive(Debug, Default)]
pub(crate) struct BlockingLock {
    locked: Mutex<bool>,
    free: Condvar,
}

impl BlockingLock {
    pub(crate) fn new() -> Self {
        Self {
            locked: Mutex::new(false),
            free: Condvar::new(),
        }
    }

    /// Blocks until acquired or `deadline` passes. Returns `true` iff the
    /// lock is held by the caller at return — never the reverse in either
    /// direction.
    pub(crate) fn try_acquire_until(&self, deadline: Instant) -> bool {
        let mut locked = self.locked.lock();
        loop {
            if !*locked {
                *locked = true;
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let result = self.free.wait_until(&mut locked, deadline);
            if !*locked {
                *locked = true;
                return true;
            }
            if result.timed_out() {
                return false;
            }
        }
    }

    /// Releases a lock the caller currently holds.
    pub(crate) fn release(&self) {
        let mut locked = self.locked.lock();
        debug_assert!(*locked, "release of a lock that is not held");
        *locked = false;
        drop(locked);
        self.free.notify_one();
    }
}

/// A one-shot wakeup used by a path-mode `PendingNode`: a waiter blocks on
/// `wait_until`, and whoever releases a conflicting path later calls
/// `signal` exactly once. Repeated signals are harmless (the flag just
/// stays set) — a node signalled but no longer waiting simply never gets
/// polled again once its owning acquire loop has moved on.
#[derive(Debug, Default)]
pub(crate) struct OneShotSignal {
    done: Mutex<bool>,
    cv: Condvar,
}

impl OneShotSignal {
    pub(crate) fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn wait_until(&self, deadline: Instant) -> bool {
        wait_until(&self.done, &self.cv, deadline)
    }

    pub(crate) fn signal(&self) {
        *self.done.lock() = true;
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn uncontended_acquire_succeeds_immediately() {
        let lock = BlockingLock::new();
        assert!(lock.try_acquire_until(Instant::now() + Duration::from_secs(1)));
        lock.release();
    }

    #[test]
    fn contended_acquire_times_out() {
        let lock = BlockingLock::new();
        assert!(lock.try_acquire_until(Instant::now() + Duration::from_millis(10)));
        // Still held — a second attempt must time out, not deadlock.
        let start = Instant::now();
        let ok = lock.try_acquire_until(Instant::now() + Duration::from_millis(50));
        assert!(!ok);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn release_wakes_a_waiting_acquirer() {
        let lock = Arc::new(BlockingLock::new());
        assert!(lock.try_acquire_until(Instant::now() + Duration::from_secs(1)));

        let waiter_lock = lock.clone();
        let waiter = std::thread::spawn(move || {
            waiter_lock.try_acquire_until(Instant::now() + Duration::from_secs(5))
        });

        std::thread::sleep(Duration::from_millis(20));
        lock.release();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn one_shot_signal_wakes_waiter_before_deadline() {
        let signal = Arc::new(OneShotSignal::new());
        let waiter = signal.clone();
        let handle = std::thread::spawn(move || waiter.wait_until(Instant::now() + Duration::from_secs(5)));

        std::thread::sleep(Duration::from_millis(20));
        signal.signal();

        assert!(handle.join().unwrap());
    }

    #[test]
    fn one_shot_signal_times_out_without_a_signal() {
        let signal = OneShotSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_until(Instant::now() + Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }
}
