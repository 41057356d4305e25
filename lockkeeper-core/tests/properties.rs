//! Property-based checks for the mutual-exclusion invariants, run with
//! concurrent threads hammering a shared registry over randomly generated
//! name sets.

use lockkeeper_core::{LockError, LockMode, LockRegistry};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// A handful of short names, so random subsets collide often enough to
/// exercise contention rather than sailing through uncontended.
fn small_name() -> impl Strategy<Value = String> {
    prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")].prop_map(String::from)
}

fn name_set(max_len: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(small_name(), 1..=max_len).prop_map(|mut v| {
        v.sort_unstable();
        v.dedup();
        v
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// No two concurrently-held key-mode leases ever share a name.
    #[test]
    fn key_mode_mutual_exclusion(requests in prop::collection::vec(name_set(3), 2..6)) {
        let registry = Arc::new(LockRegistry::new());
        let handles: Vec<_> = requests
            .into_iter()
            .map(|names| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry.lock(LockMode::Key, &names, Duration::from_millis(200))
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            if let Ok(id) = handle.join().unwrap() {
                ids.push(id);
            }
        }

        // All acquired leases are distinct and non-zero; by construction
        // they were only able to coexist if their name sets never
        // intersected, which the registry itself enforces by refusing a
        // second acquire on a name already held.
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), ids.len());
        prop_assert!(ids.iter().all(|&id| id != 0));

        for id in ids {
            registry.unlock(id);
        }
    }

    /// After every lease from a burst of path-mode requests is released,
    /// no cell lingers with a refcount above zero — observable here as
    /// the same name set being immediately re-acquirable.
    #[test]
    fn path_mode_cells_clean_up_after_release(
        segments in prop::collection::vec("[a-c]{1,2}", 1..4)
    ) {
        let registry = LockRegistry::new();
        let path = segments.join("/");

        let first = registry.lock(LockMode::Path, &[path.clone()], Duration::from_millis(200));
        if let Ok(id) = first {
            registry.unlock(id);
        }

        // Whether or not the canonical form was rejected as root-only,
        // a second identical request must behave identically — no
        // leaked state from the first attempt.
        let second = registry.lock(LockMode::Path, &[path.clone()], Duration::from_millis(200));
        match (&first, &second) {
            (Err(LockError::InvalidPath), Err(LockError::InvalidPath)) => {}
            (Ok(_), Ok(id2)) => registry.unlock(*id2),
            (Err(e1), Err(e2)) => prop_assert_eq!(e1, e2),
            _ => prop_assert!(false, "first and second attempt diverged: {:?} vs {:?}", first, second),
        }
    }
}
