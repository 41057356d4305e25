//! Flat-key locker group: opaque string names, compared verbatim.

use crate::error::{LockError, LockResult};
use crate::refcount::{with_primitive, RefCountedSlot};
use crate::timed::BlockingLock;
use std::time::Instant;

pub(crate) const DEFAULT_KEY_SHARDS: usize = 1024;

fn shard_of(name: &str, shard_count: usize) -> usize {
    (crc32fast::hash(name.as_bytes()) as usize) % shard_count
}

/// Deduplicates `names` in place, preserving nothing about original order
/// (callers sort separately for acquire vs. release).
fn dedup(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = names.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

/// Sharded set of [`RefCountedSlot`]s keyed by CRC-32 of the opaque name
/// bytes. Provides deadlock-avoiding multi-name acquisition via a fixed
/// ascending sort order — the sole deadlock-avoidance mechanism — and
/// rolls back every partially-acquired name on timeout.
pub(crate) struct KeyLockerGroup {
    shards: Vec<RefCountedSlot<BlockingLock>>,
}

impl KeyLockerGroup {
    pub(crate) fn new(shard_count: usize) -> Self {
        let mut shards = Vec::with_capacity(shard_count);
        shards.resize_with(shard_count, RefCountedSlot::new);
        Self { shards }
    }

    fn shard_for(&self, name: &str) -> &RefCountedSlot<BlockingLock> {
        &self.shards[shard_of(name, self.shards.len())]
    }

    /// Acquires every name in `names` by the shared `deadline`, in
    /// ascending byte order, rolling back on the first name that cannot
    /// be acquired in time.
    pub(crate) fn lock_timeout(&self, names: &[String], deadline: Instant) -> LockResult<()> {
        let ordered = dedup(names);
        let mut held: Vec<&str> = Vec::with_capacity(ordered.len());

        for name in &ordered {
            let shard = self.shard_for(name);
            let cell = shard.acquire(name, BlockingLock::new);
            let acquired = with_primitive(&cell, |lock| lock.try_acquire_until(deadline));

            if acquired {
                held.push(name);
                continue;
            }

            // Did not acquire the primitive: drop our reference to this
            // cell and unwind everything held so far, in reverse order.
            shard.release(name);
            for prior in held.iter().rev() {
                self.release_one(prior);
            }
            return Err(LockError::Timeout);
        }

        Ok(())
    }

    fn release_one(&self, name: &str) {
        let shard = self.shard_for(name);
        // The cell must still exist: releasing a name we do not hold is a
        // programming error, not a recoverable condition.
        let cell = shard.peek(name).expect("release of a key cell that does not exist");
        with_primitive(&cell, |lock| lock.release());
        shard.release(name);
    }

    /// Releases every name in `names`, in descending byte order, mirroring
    /// the acquire order.
    pub(crate) fn unlock(&self, names: &[String]) {
        let mut ordered = dedup(names);
        ordered.reverse();
        for name in &ordered {
            self.release_one(name);
        }
    }

    #[cfg(test)]
    pub(crate) fn cell_is_absent(&self, name: &str) -> bool {
        self.shard_for(name).peek(name).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn names(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reverse_order_multi_key_times_out_then_succeeds() {
        let group = Arc::new(KeyLockerGroup::new(DEFAULT_KEY_SHARDS));

        let g1 = group.clone();
        g1.lock_timeout(&names(&["a", "b"]), Instant::now() + Duration::from_secs(10))
            .unwrap();

        let g2 = group.clone();
        let result = g2.lock_timeout(&names(&["b", "a"]), Instant::now() + Duration::from_millis(100));
        assert_eq!(result, Err(LockError::Timeout));

        g1.unlock(&names(&["a", "b"]));

        g2.lock_timeout(&names(&["b", "a"]), Instant::now() + Duration::from_millis(100))
            .unwrap();
        g2.unlock(&names(&["b", "a"]));

        assert!(group.cell_is_absent("a"));
        assert!(group.cell_is_absent("b"));
    }

    #[test]
    fn partial_rollback_leaves_no_residue() {
        let group = Arc::new(KeyLockerGroup::new(DEFAULT_KEY_SHARDS));
        group
            .lock_timeout(&names(&["b"]), Instant::now() + Duration::from_secs(10))
            .unwrap();

        let result = group.lock_timeout(&names(&["a", "b", "c"]), Instant::now() + Duration::from_millis(100));
        assert_eq!(result, Err(LockError::Timeout));

        assert!(group.cell_is_absent("a"));
        assert!(group.cell_is_absent("c"));
        // "b" is still held by the first caller.
        assert!(!group.cell_is_absent("b"));

        group.unlock(&names(&["b"]));
        assert!(group.cell_is_absent("b"));
    }

    #[test]
    fn duplicate_names_collapse_to_one_acquisition() {
        let group = KeyLockerGroup::new(DEFAULT_KEY_SHARDS);
        group
            .lock_timeout(&names(&["a", "a"]), Instant::now() + Duration::from_secs(1))
            .unwrap();
        group.unlock(&names(&["a", "a"]));
        assert!(group.cell_is_absent("a"));
    }
}
