//! Lease registry — the core's single public entry point.

use crate::error::{LockError, LockResult};
use crate::key::{KeyLockerGroup, DEFAULT_KEY_SHARDS};
use crate::mode::LockMode;
use crate::path::{PathLockerGroup, DEFAULT_PATH_SHARDS};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Stand-in for "no deadline": an unbounded wait is represented as a very
/// long finite duration rather than a special case through the acquire
/// path.
pub const INFINITE_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

struct LeaseRecord {
    mode: LockMode,
    names: Vec<String>,
    created_at: DateTime<Local>,
}

/// Monotonic generator for 64-bit lease identifiers, assembled as
/// `(unix_seconds << 32) | counter`. The counter alone disambiguates IDs
/// minted within the same wall-clock second; it is not reset between
/// seconds, so it also absorbs any clock that fails to advance.
struct IdGenerator {
    counter: u32,
}

impl IdGenerator {
    fn new() -> Self {
        Self { counter: 0 }
    }

    fn next(&mut self) -> u64 {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.counter = self.counter.wrapping_add(1);
        (seconds << 32) | u64::from(self.counter)
    }
}

struct RegistryState {
    leases: BTreeMap<u64, LeaseRecord>,
    ids: IdGenerator,
}

/// Process-wide named-lock arbitration engine. Owns both locker groups
/// and the lease table; a caller gets a handle at startup and the
/// handle's lifetime bounds the registry's.
pub struct LockRegistry {
    key_group: KeyLockerGroup,
    path_group: PathLockerGroup,
    state: Mutex<RegistryState>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::with_shard_counts(DEFAULT_KEY_SHARDS, DEFAULT_PATH_SHARDS)
    }

    pub fn with_shard_counts(key_shards: usize, path_shards: usize) -> Self {
        Self {
            key_group: KeyLockerGroup::new(key_shards),
            path_group: PathLockerGroup::new(path_shards),
            state: Mutex::new(RegistryState {
                leases: BTreeMap::new(),
                ids: IdGenerator::new(),
            }),
        }
    }

    /// Acquires `names` under `mode` within `timeout`, returning a fresh
    /// lease identifier on success.
    pub fn lock(&self, mode: LockMode, names: &[String], timeout: Duration) -> LockResult<u64> {
        if names.is_empty() {
            return Err(LockError::EmptyNames);
        }

        let deadline = Instant::now() + timeout;
        let result = match mode {
            LockMode::Key => self.key_group.lock_timeout(names, deadline),
            LockMode::Path => self.path_group.lock_timeout(names, deadline),
        };
        if let Err(err) = result {
            tracing::debug!(mode = mode.as_str(), names = ?names, %err, "lockkeeper.lock.failed");
            return Err(err);
        }

        let mut state = self.state.lock();
        let id = state.ids.next();
        state.leases.insert(
            id,
            LeaseRecord {
                mode,
                names: names.to_vec(),
                created_at: Local::now(),
            },
        );
        tracing::debug!(lease_id = id, mode = mode.as_str(), "lockkeeper.lock.acquired");
        Ok(id)
    }

    /// Releases the lease named by `id`. An unknown id is a successful,
    /// idempotent no-op.
    pub fn unlock(&self, id: u64) {
        let record = self.state.lock().leases.remove(&id);
        let Some(record) = record else {
            tracing::debug!(lease_id = id, "lockkeeper.unlock.unknown_lease");
            return;
        };
        match record.mode {
            LockMode::Key => self.key_group.unlock(&record.names),
            LockMode::Path => self.path_group.unlock(&record.names),
        }
        tracing::debug!(lease_id = id, mode = record.mode.as_str(), "lockkeeper.unlock.released");
    }

    /// Formats every active lease as a two-section text dump, one section
    /// per mode, each entry ordered by ascending lease id.
    pub fn enumerate(&self) -> String {
        let state = self.state.lock();
        let mut key_lines = Vec::new();
        let mut path_lines = Vec::new();

        for (id, record) in state.leases.iter() {
            let line = format!(
                "{id} {}\t{}",
                record.names.join(","),
                record.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            match record.mode {
                LockMode::Key => key_lines.push(line),
                LockMode::Path => path_lines.push(line),
            }
        }

        let mut out = String::from("key lock:\n");
        for line in &key_lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out.push_str("path lock:\n");
        for line in &path_lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
