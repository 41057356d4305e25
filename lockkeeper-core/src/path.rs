//! Hierarchical-path locker group: filesystem-style paths, where locking a
//! directory excludes all of its descendants and vice versa.
//!
//! Unlike [`crate::key::KeyLockerGroup`], a path cell carries no lock
//! primitive of its own — exclusion is expressed entirely by a `claimed`
//! bit plus a refcount, and the whole claim attempt for one path's
//! ancestor chain has to be evaluated atomically, so each shard keeps a
//! single mutex over its cell map and pending-waiter list rather than
//! composing the narrower per-cell locking [`crate::refcount::RefCountedSlot`]
//! offers key mode.

use crate::error::{LockError, LockResult};
use crate::timed::OneShotSignal;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

pub(crate) const DEFAULT_PATH_SHARDS: usize = 4096;

/// Collapses `.`/`..`/repeated separators, strips the leading separator so
/// absolute and relative spellings of the same path coincide, and appends
/// a trailing separator so prefix tests anchor at a component boundary. A
/// leading `..` that would escape the root is simply dropped, the same
/// way it would be for an absolute OS path — this virtual namespace has no
/// parent of its own root to escape into.
pub(crate) fn canonicalize(raw: &str) -> LockResult<String> {
    let mut stack: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    if stack.is_empty() {
        return Err(LockError::InvalidPath);
    }
    let mut canonical = stack.join("/");
    canonical.push('/');
    Ok(canonical)
}

/// The chain `a/, a/b/, a/b/c/` for canonical path `a/b/c/`.
fn ancestor_chain(canonical: &str) -> Vec<String> {
    let trimmed = canonical.trim_end_matches('/');
    let mut chain = Vec::with_capacity(trimmed.matches('/').count() + 1);
    let mut acc = String::new();
    for segment in trimmed.split('/') {
        if !acc.is_empty() {
            acc.push('/');
        }
        acc.push_str(segment);
        chain.push(format!("{acc}/"));
    }
    chain
}

fn first_component(canonical: &str) -> &str {
    canonical.split('/').next().unwrap_or(canonical)
}

/// True iff `a` and `b`'s ancestor chains intersect: one is a prefix of
/// the other. Anchored at position zero on canonicalised, trailing-slash
/// terminated paths, so `foo/` and `barfoo/` cannot collide the way
/// unanchored substring search would.
fn chains_intersect(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Drops any path that is a descendant of an already-kept path. Input
/// must already be canonicalised and sorted ascending, which places every
/// ancestor immediately before its descendants.
fn retain_non_nested(sorted: Vec<String>) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(sorted.len());
    for path in sorted {
        if kept.iter().any(|k| path.starts_with(k.as_str())) {
            continue;
        }
        kept.push(path);
    }
    kept
}

/// Canonicalises and subsumes a raw name list, ready for either acquire or
/// (with a reversed sort) release. Both paths recompute this identically
/// from the lease's original names so acquire and release agree on
/// exactly which canonical paths are actually held.
fn prepare(names: &[String]) -> LockResult<Vec<String>> {
    let mut canonical = names
        .iter()
        .map(|n| canonicalize(n))
        .collect::<LockResult<Vec<_>>>()?;
    canonical.sort_unstable();
    canonical.dedup();
    Ok(retain_non_nested(canonical))
}

struct PathCellEntry {
    claimed: bool,
    refs: usize,
}

struct PendingNode {
    path: String,
    signal: Arc<OneShotSignal>,
}

#[derive(Default)]
struct PathShardState {
    cells: HashMap<String, PathCellEntry>,
    pending: Vec<PendingNode>,
}

enum ClaimOutcome {
    Claimed,
    Blocked(Arc<OneShotSignal>),
}

struct PathShard {
    state: Mutex<PathShardState>,
}

impl PathShard {
    fn new() -> Self {
        Self {
            state: Mutex::new(PathShardState::default()),
        }
    }

    /// One attempt to claim `leaf` exclusively: walk the ancestor chain
    /// bumping refcounts and bailing if any ancestor is already claimed,
    /// then claim the leaf only if nothing below it holds a reference. On
    /// failure, every cell touched in this attempt is rolled back and a
    /// pending node is left enqueued.
    fn try_claim(&self, chain: &[String]) -> ClaimOutcome {
        let mut state = self.state.lock();
        let mut touched: Vec<&str> = Vec::with_capacity(chain.len());

        for ancestor in chain {
            let entry = state.cells.entry(ancestor.clone()).or_insert(PathCellEntry {
                claimed: false,
                refs: 0,
            });
            entry.refs += 1;
            touched.push(ancestor);

            if entry.claimed {
                return self.rollback_and_enqueue(&mut state, &touched, chain.last().unwrap());
            }
        }

        let leaf = chain.last().expect("ancestor chain is never empty");
        let leaf_refs = state.cells.get(leaf).map(|e| e.refs).unwrap_or(0);
        if leaf_refs == 1 {
            state.cells.get_mut(leaf).expect("leaf cell just touched").claimed = true;
            ClaimOutcome::Claimed
        } else {
            self.rollback_and_enqueue(&mut state, &touched, leaf)
        }
    }

    fn rollback_and_enqueue(
        &self,
        state: &mut PathShardState,
        touched: &[&str],
        leaf: &str,
    ) -> ClaimOutcome {
        for name in touched.iter().rev() {
            Self::decrement(state, name);
        }
        let signal = Arc::new(OneShotSignal::new());
        state.pending.push(PendingNode {
            path: leaf.to_string(),
            signal: signal.clone(),
        });
        ClaimOutcome::Blocked(signal)
    }

    fn decrement(state: &mut PathShardState, name: &str) {
        let Some(entry) = state.cells.get_mut(name) else {
            return;
        };
        debug_assert!(entry.refs > 0, "refcount underflow releasing {name:?}");
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            state.cells.remove(name);
        }
    }

    /// Releases `chain` leaf-to-root, then wakes every pending waiter whose
    /// chain intersects it.
    fn release(&self, chain: &[String]) {
        {
            let mut state = self.state.lock();
            for name in chain.iter().rev() {
                if let Some(entry) = state.cells.get_mut(name.as_str()) {
                    entry.claimed = false;
                }
                Self::decrement(&mut state, name);
            }
        }

        let leaf = chain.last().expect("ancestor chain is never empty");
        let mut state = self.state.lock();
        let mut remaining = Vec::with_capacity(state.pending.len());
        for node in state.pending.drain(..) {
            if chains_intersect(&node.path, leaf) {
                node.signal.signal();
            } else {
                remaining.push(node);
            }
        }
        state.pending = remaining;
    }

    #[cfg(test)]
    fn contains_cell(&self, name: &str) -> bool {
        self.state.lock().cells.contains_key(name)
    }
}

fn shard_index(component: &str, shard_count: usize) -> usize {
    (crc32fast::hash(component.as_bytes()) as usize) % shard_count
}

/// Sharded set of hierarchical lockers.
pub(crate) struct PathLockerGroup {
    shards: Vec<PathShard>,
}

impl PathLockerGroup {
    pub(crate) fn new(shard_count: usize) -> Self {
        let mut shards = Vec::with_capacity(shard_count);
        shards.resize_with(shard_count, PathShard::new);
        Self { shards }
    }

    fn shard_for(&self, canonical: &str) -> &PathShard {
        &self.shards[shard_index(first_component(canonical), self.shards.len())]
    }

    fn acquire_one(&self, canonical: &str, deadline: Instant) -> bool {
        let chain = ancestor_chain(canonical);
        let shard = self.shard_for(canonical);
        loop {
            match shard.try_claim(&chain) {
                ClaimOutcome::Claimed => return true,
                ClaimOutcome::Blocked(signal) => {
                    if !signal.wait_until(deadline) {
                        return false;
                    }
                }
            }
        }
    }

    fn release_one(&self, canonical: &str) {
        let chain = ancestor_chain(canonical);
        self.shard_for(canonical).release(&chain);
    }

    pub(crate) fn lock_timeout(&self, names: &[String], deadline: Instant) -> LockResult<()> {
        let kept = prepare(names)?;
        let mut held: Vec<&str> = Vec::with_capacity(kept.len());

        for path in &kept {
            if self.acquire_one(path, deadline) {
                held.push(path);
                continue;
            }
            for prior in held.iter().rev() {
                self.release_one(prior);
            }
            return Err(LockError::Timeout);
        }
        Ok(())
    }

    pub(crate) fn unlock(&self, names: &[String]) {
        // Errors here are unreachable: a lease's names were already
        // validated at acquire time, so re-canonicalising cannot fail.
        let mut kept = prepare(names).expect("lease names canonicalise on release");
        kept.reverse();
        for path in &kept {
            self.release_one(path);
        }
    }

    #[cfg(test)]
    pub(crate) fn cell_is_absent(&self, canonical: &str) -> bool {
        !self.shard_for(canonical).contains_cell(canonical)
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
    fn canonicalizes_redundant_components() {
        assert_eq!(canonicalize("/a//b/./c/").unwrap(), "a/b/c/");
        assert_eq!(canonicalize("a/b/../c").unwrap(), "a/c/");
        assert_eq!(canonicalize("../../a").unwrap(), "a/");
    }

    #[test]
    fn rejects_root_only_paths() {
        assert_eq!(canonicalize("/"), Err(LockError::InvalidPath));
        assert_eq!(canonicalize(""), Err(LockError::InvalidPath));
        assert_eq!(canonicalize("../.."), Err(LockError::InvalidPath));
    }

    #[test]
    fn descendant_blocks_ancestor_then_succeeds_after_release() {
        let group = Arc::new(PathLockerGroup::new(DEFAULT_PATH_SHARDS));

        let g1 = group.clone();
        g1.lock_timeout(&names(&["a/b"]), Instant::now() + Duration::from_secs(10))
            .unwrap();

        let g2 = group.clone();
        let result = g2.lock_timeout(&names(&["a"]), Instant::now() + Duration::from_millis(100));
        assert_eq!(result, Err(LockError::Timeout));

        g1.unlock(&names(&["a/b"]));
        g2.lock_timeout(&names(&["a"]), Instant::now() + Duration::from_millis(100))
            .unwrap();
        g2.unlock(&names(&["a"]));

        assert!(group.cell_is_absent("a/"));
    }

    #[test]
    fn ancestor_blocks_descendant() {
        let group = PathLockerGroup::new(DEFAULT_PATH_SHARDS);
        group
            .lock_timeout(&names(&["a"]), Instant::now() + Duration::from_secs(10))
            .unwrap();

        let result = group.lock_timeout(&names(&["a/b/c"]), Instant::now() + Duration::from_millis(100));
        assert_eq!(result, Err(LockError::Timeout));

        group.unlock(&names(&["a"]));
        assert!(group.cell_is_absent("a/"));
    }

    #[test]
    fn subsumption_collapses_to_the_ancestor() {
        let group = PathLockerGroup::new(DEFAULT_PATH_SHARDS);
        group
            .lock_timeout(&names(&["a/b", "a/b/c"]), Instant::now() + Duration::from_secs(10))
            .unwrap();
        group.unlock(&names(&["a/b", "a/b/c"]));
        assert!(group.cell_is_absent("a/"));
    }

    #[test]
    fn unrelated_paths_in_different_shards_do_not_block_each_other() {
        let group = PathLockerGroup::new(DEFAULT_PATH_SHARDS);
        group
            .lock_timeout(&names(&["x/y"]), Instant::now() + Duration::from_secs(10))
            .unwrap();
        group
            .lock_timeout(&names(&["p/q"]), Instant::now() + Duration::from_millis(200))
            .unwrap();
        group.unlock(&names(&["x/y"]));
        group.unlock(&names(&["p/q"]));
    }
}
