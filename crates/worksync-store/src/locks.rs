//! Per-path read/write locks
//!
//! One `tokio::sync::RwLock` per normalized path, created lazily and shared by
//! every caller that touches the same file. Acquisition is bounded by a
//! timeout so a stuck holder surfaces as [`StoreError::LockTimeout`], which
//! the writer treats as a retriable conflict.
//!
//! Entries are never removed while a guard is alive; [`LockRegistry::cleanup_stale`]
//! evicts the ones nobody holds and nobody used recently.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, trace};

use crate::error::StoreError;

struct LockEntry {
    lock: Arc<RwLock<()>>,
    last_used: Instant,
}

/// Process-wide table of file locks
pub struct LockRegistry {
    locks: DashMap<PathBuf, LockEntry>,
    timeout: Duration,
}

impl LockRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of tracked paths
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn lock_for(&self, path: &Path) -> Arc<RwLock<()>> {
        let key = normalize(path);
        let mut entry = self.locks.entry(key).or_insert_with(|| LockEntry {
            lock: Arc::new(RwLock::new(())),
            last_used: Instant::now(),
        });
        entry.last_used = Instant::now();
        Arc::clone(&entry.lock)
    }

    /// Shared access to `path`
    pub async fn read(&self, path: &Path) -> Result<OwnedRwLockReadGuard<()>, StoreError> {
        let lock = self.lock_for(path);
        trace!(path = %path.display(), "acquiring read lock");
        tokio::time::timeout(self.timeout, lock.read_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(path.to_path_buf()))
    }

    /// Exclusive access to `path`
    pub async fn write(&self, path: &Path) -> Result<OwnedRwLockWriteGuard<()>, StoreError> {
        let lock = self.lock_for(path);
        trace!(path = %path.display(), "acquiring write lock");
        tokio::time::timeout(self.timeout, lock.write_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(path.to_path_buf()))
    }

    /// Removes locks that are not held and were last used longer than `max_idle` ago.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_stale(&self, max_idle: Duration) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, entry| {
            Arc::strong_count(&entry.lock) > 1 || entry.last_used.elapsed() < max_idle
        });
        let removed = before.saturating_sub(self.locks.len());
        if removed > 0 {
            debug!(removed, remaining = self.locks.len(), "evicted idle file locks");
        }
        removed
    }
}

/// Lexically normalizes a path so `a/./b` and `a/c/../b` share one lock.
///
/// Relative paths are anchored at the current directory. Symlinks are not
/// resolved.
pub fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
