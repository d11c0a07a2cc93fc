//! Locked, retried, deduplicated writes
//!
//! ## Write Flow
//!
//! ```text
//! write_file(file, value, opts)
//!   ├─ dedup window hit? ──────────────────────────► Success (no I/O)
//!   ├─ encode (pretty JSON, optional XOR)
//!   └─ attempt 1..=max
//!        ├─ write lock (timeout) ─► <file>.tmp ─► rename
//!        ├─ conflict? ─► sleep base·2^(n-1) (capped) ─► next attempt
//!        └─ other error ─► fail
//!   publish WriteSucceeded | WriteFailed
//! ```
//!
//! Backups are not created here. Subscribers of the event sink decide what to
//! do with a successful write.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use worksync_core::config::StorageConfig;
use worksync_core::domain::{FileOperationResult, FilePath, Locality};
use worksync_core::ports::{FileEvent, IFileEventSink};

use crate::codec::Codec;
use crate::error::StoreError;
use crate::locks::LockRegistry;
use crate::paths::PathResolver;

// ============================================================================
// WriteOptions / WritePolicy
// ============================================================================

/// Per-call write behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Overrides the configured obfuscation when set
    pub obfuscate: Option<bool>,
    /// Apply the dedup window
    pub dedup: bool,
    /// Mark the success event as backup-eligible
    pub backup: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            obfuscate: None,
            dedup: true,
            backup: true,
        }
    }
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn obfuscated(mut self, obfuscate: bool) -> Self {
        self.obfuscate = Some(obfuscate);
        self
    }

    pub fn without_dedup(mut self) -> Self {
        self.dedup = false;
        self
    }

    pub fn without_backup(mut self) -> Self {
        self.backup = false;
        self
    }
}

/// Retry and dedup tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub dedup_window: Duration,
}

impl WritePolicy {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            max_attempts: config.write_max_attempts.max(1),
            base_backoff: config.write_base_backoff(),
            max_backoff: config.write_max_backoff(),
            dedup_window: config.dedup_window(),
        }
    }

    /// Delay after failed attempt `attempt` (1-based): base·2^(attempt-1), capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default())
    }
}

// ============================================================================
// FileWriter
// ============================================================================

/// (username, file name, replica)
type DedupKey = (String, String, Locality);

/// Persists data files under the per-path write lock
pub struct FileWriter {
    resolver: Arc<PathResolver>,
    locks: Arc<LockRegistry>,
    codec: Codec,
    events: Arc<dyn IFileEventSink>,
    policy: WritePolicy,
    recent: DashMap<DedupKey, Instant>,
}

impl FileWriter {
    pub fn new(
        resolver: Arc<PathResolver>,
        locks: Arc<LockRegistry>,
        codec: Codec,
        events: Arc<dyn IFileEventSink>,
        policy: WritePolicy,
    ) -> Self {
        Self {
            resolver,
            locks,
            codec,
            events,
            policy,
            recent: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &WritePolicy {
        &self.policy
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Concrete path a write of `file` would go to right now
    pub async fn target_path(&self, file: &FilePath) -> PathBuf {
        self.resolver.path_for(file).await
    }

    /// Serializes `value` and writes it to the path of `file`.
    #[instrument(skip(self, value, options), fields(file = %file))]
    pub async fn write_file<T: Serialize + ?Sized>(
        &self,
        file: &FilePath,
        value: &T,
        options: WriteOptions,
    ) -> FileOperationResult {
        let path = self.resolver.path_for(file).await;

        let (user, name) = file.dedup_key();
        let dedup_key = (user, name, file.locality());
        if options.dedup && self.is_duplicate(&dedup_key) {
            debug!(path = %path.display(), "duplicate write within dedup window, skipping");
            return FileOperationResult::success(path);
        }

        let obfuscate = options
            .obfuscate
            .unwrap_or_else(|| self.codec.obfuscates_by_default());
        let bytes = match self.codec.encode(value, obfuscate) {
            Ok(bytes) => bytes,
            Err(e) => {
                if options.dedup {
                    self.recent.remove(&dedup_key);
                }
                warn!(error = %e, "failed to encode data");
                self.publish(FileEvent::failed(&path, Some(file.clone()), e.to_string()))
                    .await;
                return FileOperationResult::from_error("failed to encode data", &e);
            }
        };

        let result = self
            .persist(&path, &bytes, Some(file.clone()), options.backup)
            .await;
        if options.dedup && result.is_failure() {
            self.recent.remove(&dedup_key);
        }
        result
    }

    /// Writes pre-encoded bytes to an arbitrary path with the same locking and retry.
    ///
    /// Raw writes are never deduplicated.
    #[instrument(skip(self, bytes), fields(path = %path.display(), bytes = bytes.len()))]
    pub async fn write_raw(&self, path: &Path, bytes: &[u8], backup: bool) -> FileOperationResult {
        self.persist(path, bytes, None, backup).await
    }

    /// Publishes a backup-eligible success for a file written earlier without one.
    pub async fn announce_backup(&self, path: &Path, file: &FilePath) {
        self.publish(FileEvent::succeeded(path, Some(file.clone()), Duration::ZERO, true))
            .await;
    }

    async fn persist(
        &self,
        path: &Path,
        bytes: &[u8],
        file: Option<FilePath>,
        backup: bool,
    ) -> FileOperationResult {
        let started = Instant::now();
        match self.persist_with_retry(path, bytes).await {
            Ok(attempts) => {
                let duration = started.elapsed();
                debug!(
                    path = %path.display(),
                    attempts,
                    duration_ms = duration.as_millis() as u64,
                    "write complete"
                );
                self.publish(FileEvent::succeeded(path, file, duration, backup))
                    .await;
                FileOperationResult::success(path)
            }
            Err((attempts, e)) => {
                warn!(path = %path.display(), attempts, error = %e, "write failed");
                self.publish(FileEvent::failed(path, file, e.to_string())).await;
                FileOperationResult::from_error(
                    format!("write failed after {attempts} attempt(s)"),
                    &e,
                )
            }
        }
    }

    /// Retries access conflicts with exponential backoff. Returns the number of
    /// attempts used, or the attempts and the last error.
    async fn persist_with_retry(&self, path: &Path, bytes: &[u8]) -> Result<u32, (u32, StoreError)> {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.persist_once(path, bytes).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(path = %path.display(), attempt, "write succeeded after retry");
                    }
                    return Ok(attempt);
                }
                Err(err) if err.is_conflict() && attempt < max => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        path = %path.display(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "file access conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err((attempt, err)),
            }
        }
    }

    /// One attempt: write lock, `<file>.tmp`, rename.
    async fn persist_once(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let _guard = self.locks.write(path).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let tmp_path = {
            let mut p = path.as_os_str().to_owned();
            p.push(".tmp");
            PathBuf::from(p)
        };

        tokio::fs::write(&tmp_path, bytes)
            .await
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::io(path, e));
        }
        Ok(())
    }

    /// Records this write in the dedup table. Returns `true` when a write for
    /// the same key happened within the window.
    fn is_duplicate(&self, key: &DedupKey) -> bool {
        let window = self.policy.dedup_window;
        if window.is_zero() {
            return false;
        }
        let now = Instant::now();
        match self.recent.entry(key.clone()) {
            Entry::Occupied(mut last) => {
                if now.duration_since(*last.get()) < window {
                    return true;
                }
                last.insert(now);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                false
            }
        }
    }

    /// Drops dedup entries older than the window. Returns how many were removed.
    pub fn prune_dedup(&self) -> usize {
        let window = self.policy.dedup_window;
        let before = self.recent.len();
        self.recent.retain(|_, at| at.elapsed() < window);
        before.saturating_sub(self.recent.len())
    }

    async fn publish(&self, event: FileEvent) {
        if let Err(e) = self.events.publish(event).await {
            warn!(error = %e, "failed to publish file event");
        }
    }
}

#[cfg(test)]
mod tests {
    use worksync_core::ports::NoopEventSink;

    use super::*;
    use crate::network::NetworkMonitor;

    #[test]
    fn test_backoff_schedule() {
        let policy = WritePolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(4), Duration::from_millis(3000));
        assert_eq!(policy.backoff(40), Duration::from_millis(3000));
    }

    #[test]
    fn test_options_builder() {
        let opts = WriteOptions::new().obfuscated(false).without_dedup().without_backup();
        assert_eq!(opts.obfuscate, Some(false));
        assert!(!opts.dedup);
        assert!(!opts.backup);
    }

    fn writer(root: &Path, window: Duration) -> FileWriter {
        let resolver = Arc::new(PathResolver::new(root, Arc::new(NetworkMonitor::disabled())));
        FileWriter::new(
            resolver,
            Arc::new(LockRegistry::new(Duration::from_millis(50))),
            Codec::new("k", false),
            Arc::new(NoopEventSink),
            WritePolicy {
                max_attempts: 3,
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                dedup_window: window,
            },
        )
    }

    #[tokio::test]
    async fn test_write_creates_parents_and_leaves_no_tmp() {
        let dir = tempfile::TempDir::new().unwrap();
        let w = writer(dir.path(), Duration::ZERO);
        let file = FilePath::admin_bonus(2024, 5).unwrap();

        let r = w.write_file(&file, &vec![1, 2, 3], WriteOptions::new()).await;
        let path = r.path().unwrap().to_path_buf();
        assert_eq!(path, dir.path().join("admin/bonus/admin_bonus_2024_05.json"));
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_dedup_disabled_with_zero_window() {
        let dir = tempfile::TempDir::new().unwrap();
        let w = writer(dir.path(), Duration::ZERO);
        let file = FilePath::users();

        w.write_file(&file, &1, WriteOptions::new()).await;
        w.write_file(&file, &2, WriteOptions::new()).await;
        let bytes = std::fs::read(dir.path().join("login/users.json")).unwrap();
        assert_eq!(bytes, b"2");
    }

    #[tokio::test]
    async fn test_prune_dedup() {
        let dir = tempfile::TempDir::new().unwrap();
        let w = writer(dir.path(), Duration::from_millis(10));
        w.write_file(&FilePath::users(), &1, WriteOptions::new()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(w.prune_dedup(), 1);
    }

    #[tokio::test]
    async fn test_serialization_error_fails_without_retry() {
        use std::collections::HashMap;

        let dir = tempfile::TempDir::new().unwrap();
        let w = writer(dir.path(), Duration::ZERO);
        // non-string map keys cannot be JSON-encoded
        let mut bad: HashMap<(u8, u8), u8> = HashMap::new();
        bad.insert((1, 2), 3);

        let r = w.write_file(&FilePath::users(), &bad, WriteOptions::new()).await;
        assert!(r.is_failure());
        assert_eq!(r.message(), Some("failed to encode data"));
    }
}
