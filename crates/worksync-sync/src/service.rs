//! Local/network replication
//!
//! ## One-way copy
//!
//! ```text
//! dest ──copy──► dest.sync_bak           (only if dest exists)
//! source ──copy──► dest.sync_tmp ──rename──► dest
//!     on failure: dest.sync_bak ──copy──► dest
//! remove dest.sync_bak (bounded retries, warn on failure)
//! ```
//!
//! ## Bidirectional resolution
//!
//! | local | network | result                                    |
//! |-------|---------|-------------------------------------------|
//! | yes   | yes     | same size and SHA-256 → `InSync`          |
//! | yes   | yes     | otherwise newer mtime wins, tie → local   |
//! | yes   | no      | `CopiedToNetwork`                         |
//! | no    | yes     | `CopiedToLocal`                           |
//! | no    | no      | `SyncError::NothingToSync`                |
//!
//! Copies carry the source mtime over to the destination so a replicated
//! pair compares equal afterwards.

use std::future::Future;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use worksync_core::config::SyncConfig;
use worksync_core::domain::{FileOperationResult, FilePath, SyncDirection, SyncKey};
use worksync_store::locks::normalize;
use worksync_store::{
    FileTransaction, FileWriter, LockRegistry, PathResolver, StoreContext, TransactionOutcome,
};

use crate::retry::{RetryPolicy, RetryReport};
use crate::status::SyncStatusRegistry;
use crate::SyncError;

const SYNC_BAK_SUFFIX: &str = ".sync_bak";
const SYNC_TMP_SUFFIX: &str = ".sync_tmp";

/// What a bidirectional sync did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    InSync,
    CopiedToNetwork,
    CopiedToLocal,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncOutcome::InSync => "in sync",
            SyncOutcome::CopiedToNetwork => "copied to network",
            SyncOutcome::CopiedToLocal => "copied to local",
        };
        f.write_str(s)
    }
}

pub struct SyncService {
    resolver: Arc<PathResolver>,
    locks: Arc<LockRegistry>,
    statuses: Arc<SyncStatusRegistry>,
    policy: RetryPolicy,
    cleanup_attempts: u32,
    cleanup_delay: Duration,
}

impl SyncService {
    pub fn new(
        resolver: Arc<PathResolver>,
        locks: Arc<LockRegistry>,
        statuses: Arc<SyncStatusRegistry>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            resolver,
            locks,
            statuses,
            policy: RetryPolicy::from_config(config),
            cleanup_attempts: config.cleanup_attempts.max(1),
            cleanup_delay: config.cleanup_delay(),
        }
    }

    /// Builds a service sharing the context's resolver and lock table
    pub fn from_context(ctx: &StoreContext) -> Self {
        Self::new(
            Arc::clone(&ctx.resolver),
            Arc::clone(&ctx.locks),
            Arc::new(SyncStatusRegistry::new()),
            &ctx.config.sync,
        )
    }

    pub fn statuses(&self) -> &Arc<SyncStatusRegistry> {
        &self.statuses
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    // ========================================================================
    // One-way copies
    // ========================================================================

    #[instrument(skip(self), fields(local = %local.display(), network = %network.display()))]
    pub async fn sync_to_network(&self, local: &Path, network: &Path) -> FileOperationResult {
        let key = SyncKey::new(local, network);
        match self
            .tracked(&key, SyncDirection::ToNetwork, self.copy_replace(local, network))
            .await
        {
            Ok(()) => FileOperationResult::success(network),
            Err(e) => FileOperationResult::from_error("sync to network failed", &e),
        }
    }

    #[instrument(skip(self), fields(network = %network.display(), local = %local.display()))]
    pub async fn sync_to_local(&self, network: &Path, local: &Path) -> FileOperationResult {
        let key = SyncKey::new(network, local);
        match self
            .tracked(&key, SyncDirection::ToLocal, self.copy_replace(network, local))
            .await
        {
            Ok(()) => FileOperationResult::success(local),
            Err(e) => FileOperationResult::from_error("sync to local failed", &e),
        }
    }

    // ========================================================================
    // Bidirectional
    // ========================================================================

    #[instrument(skip(self), fields(local = %local.display(), network = %network.display()))]
    pub async fn sync_bidirectional(
        &self,
        local: &Path,
        network: &Path,
    ) -> Result<SyncOutcome, SyncError> {
        let key = SyncKey::new(local, network);
        let outcome = self
            .tracked(&key, SyncDirection::Bidirectional, self.resolve_pair(local, network))
            .await?;
        debug!(%outcome, "bidirectional sync done");
        Ok(outcome)
    }

    async fn resolve_pair(&self, local: &Path, network: &Path) -> Result<SyncOutcome, SyncError> {
        let local_meta = metadata_opt(local).await?;
        let network_meta = metadata_opt(network).await?;

        match (local_meta, network_meta) {
            (None, None) => Err(SyncError::NothingToSync {
                local: local.to_path_buf(),
                network: network.to_path_buf(),
            }),
            (Some(_), None) => {
                self.copy_replace(local, network).await?;
                Ok(SyncOutcome::CopiedToNetwork)
            }
            (None, Some(_)) => {
                self.copy_replace(network, local).await?;
                Ok(SyncOutcome::CopiedToLocal)
            }
            (Some(l), Some(n)) => {
                if l.len() == n.len() && hash_file(local).await? == hash_file(network).await? {
                    return Ok(SyncOutcome::InSync);
                }
                let local_time = l.modified().map_err(|e| SyncError::io(local, e))?;
                let network_time = n.modified().map_err(|e| SyncError::io(network, e))?;
                if network_time > local_time {
                    self.copy_replace(network, local).await?;
                    Ok(SyncOutcome::CopiedToLocal)
                } else {
                    self.copy_replace(local, network).await?;
                    Ok(SyncOutcome::CopiedToNetwork)
                }
            }
        }
    }

    // ========================================================================
    // Logical files
    // ========================================================================

    /// Replicates a logical file in `direction`.
    ///
    /// Without a configured share there is nothing to do. When the share is
    /// configured but unreachable the pair is queued for the retry sweep and
    /// the call still succeeds with the local path.
    #[instrument(skip(self), fields(file = %file, %direction))]
    pub async fn sync_file(&self, file: &FilePath, direction: SyncDirection) -> FileOperationResult {
        let local = self.resolver.local_path(file);
        let Some(network) = self.resolver.network_path_unchecked(file) else {
            debug!("no network root configured, local only");
            return FileOperationResult::success(local);
        };

        if !self.resolver.is_network_available().await {
            let key = pair_key(direction, &local, &network);
            self.statuses.mark_pending(&key, direction);
            info!(pair = %key, "network unavailable, sync queued");
            return FileOperationResult::success(local);
        }

        match direction {
            SyncDirection::ToNetwork => self.sync_to_network(&local, &network).await,
            SyncDirection::ToLocal => self.sync_to_local(&network, &local).await,
            SyncDirection::Bidirectional => match self.sync_bidirectional(&local, &network).await {
                Ok(_) => FileOperationResult::success(local),
                Err(e) => FileOperationResult::from_error("bidirectional sync failed", &e),
            },
        }
    }

    /// Commits `tx` and replicates its queued files to the share
    pub async fn commit_transaction(
        &self,
        tx: FileTransaction,
        writer: &FileWriter,
    ) -> TransactionOutcome {
        let outcome = tx.commit(writer).await;
        if outcome.result.is_success() {
            for file in &outcome.syncs {
                let result = self.sync_file(file, SyncDirection::ToNetwork).await;
                if let Some(message) = result.message() {
                    warn!(file = %file, error = message, "post-commit sync failed");
                }
            }
        }
        outcome
    }

    // ========================================================================
    // Background variants
    // ========================================================================

    pub fn spawn_sync_to_network(
        self: &Arc<Self>,
        local: PathBuf,
        network: PathBuf,
    ) -> JoinHandle<FileOperationResult> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.sync_to_network(&local, &network).await })
    }

    pub fn spawn_sync_to_local(
        self: &Arc<Self>,
        network: PathBuf,
        local: PathBuf,
    ) -> JoinHandle<FileOperationResult> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.sync_to_local(&network, &local).await })
    }

    pub fn spawn_sync_bidirectional(
        self: &Arc<Self>,
        local: PathBuf,
        network: PathBuf,
    ) -> JoinHandle<Result<SyncOutcome, SyncError>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.sync_bidirectional(&local, &network).await })
    }

    pub fn spawn_sync_file(
        self: &Arc<Self>,
        file: FilePath,
        direction: SyncDirection,
    ) -> JoinHandle<FileOperationResult> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.sync_file(&file, direction).await })
    }

    // ========================================================================
    // Retry sweep
    // ========================================================================

    /// Re-runs every pending pair whose backoff has elapsed
    #[instrument(skip(self))]
    pub async fn retry_pending(&self) -> RetryReport {
        let mut report = RetryReport::default();
        let pending = self.statuses.pending();
        if pending.is_empty() {
            return report;
        }

        if !self.resolver.is_network_available().await {
            report.offline = pending.len();
            debug!(pending = pending.len(), "network unavailable, retry sweep skipped");
            return report;
        }

        let now = Utc::now();
        for (key, status) in pending {
            if self.policy.is_exhausted(&status) {
                report.exhausted += 1;
                continue;
            }
            if !self.policy.is_due(&status, now) {
                report.waiting += 1;
                continue;
            }

            report.attempted += 1;
            let succeeded = match status.direction() {
                SyncDirection::ToNetwork => {
                    self.sync_to_network(key.source(), key.target()).await.is_success()
                }
                SyncDirection::ToLocal => {
                    self.sync_to_local(key.source(), key.target()).await.is_success()
                }
                SyncDirection::Bidirectional => self
                    .sync_bidirectional(key.source(), key.target())
                    .await
                    .is_ok(),
            };
            if succeeded {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                failed = report.failed,
                "retry sweep finished"
            );
        }
        report
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Runs `op` between status `begin` and `complete`/`fail`
    async fn tracked<T, F>(
        &self,
        key: &SyncKey,
        direction: SyncDirection,
        op: F,
    ) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, SyncError>>,
    {
        self.statuses.begin(key, direction)?;
        match op.await {
            Ok(value) => {
                self.statuses.complete(key)?;
                Ok(value)
            }
            Err(e) => {
                warn!(pair = %key, error = %e, "sync failed");
                self.statuses.fail(key, e.to_string())?;
                Err(e)
            }
        }
    }

    async fn copy_replace(&self, source: &Path, dest: &Path) -> Result<(), SyncError> {
        let meta = match tokio::fs::metadata(source).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(SyncError::SourceMissing(source.to_path_buf())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SyncError::SourceMissing(source.to_path_buf()))
            }
            Err(e) => return Err(SyncError::io(source, e)),
        };
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(parent, e))?;
        }

        // Both ends are locked in path order, whatever the direction.
        let (_source_guard, _dest_guard) = if normalize(source) <= normalize(dest) {
            let source_guard = self.locks.read(source).await?;
            (source_guard, self.locks.write(dest).await?)
        } else {
            let dest_guard = self.locks.write(dest).await?;
            (self.locks.read(source).await?, dest_guard)
        };

        let bak = with_suffix(dest, SYNC_BAK_SUFFIX);
        let tmp = with_suffix(dest, SYNC_TMP_SUFFIX);

        let had_backup = match tokio::fs::copy(dest, &bak).await {
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(SyncError::io(dest, e)),
        };

        let copied = async {
            tokio::fs::copy(source, &tmp)
                .await
                .map_err(|e| SyncError::io(source, e))?;
            tokio::fs::rename(&tmp, dest)
                .await
                .map_err(|e| SyncError::io(dest, e))
        }
        .await;

        if let Err(e) = copied {
            let _ = tokio::fs::remove_file(&tmp).await;
            if had_backup {
                match tokio::fs::copy(&bak, dest).await {
                    Ok(_) => warn!(dest = %dest.display(), "copy failed, destination restored"),
                    Err(restore) => error!(
                        dest = %dest.display(),
                        error = %restore,
                        "copy failed and destination could not be restored"
                    ),
                }
                self.remove_with_retry(&bak).await;
            }
            return Err(e);
        }

        if let Ok(modified) = meta.modified() {
            preserve_mtime(dest, modified).await;
        }
        if had_backup {
            self.remove_with_retry(&bak).await;
        }
        debug!(from = %source.display(), to = %dest.display(), bytes = meta.len(), "copied");
        Ok(())
    }

    async fn remove_with_retry(&self, path: &Path) -> bool {
        for attempt in 1..=self.cleanup_attempts {
            match tokio::fs::remove_file(path).await {
                Ok(()) => return true,
                Err(e) if e.kind() == ErrorKind::NotFound => return true,
                Err(e) => {
                    debug!(path = %path.display(), attempt, error = %e, "temp backup removal failed");
                    if attempt < self.cleanup_attempts {
                        tokio::time::sleep(self.cleanup_delay).await;
                    }
                }
            }
        }
        warn!(path = %path.display(), "could not remove temporary sync backup");
        false
    }
}

/// SHA-256 of a file's content as lowercase hex
pub async fn hash_file(path: &Path) -> Result<String, SyncError> {
    let owned = path.to_path_buf();
    let hashed = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let mut file = std::fs::File::open(&owned)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| SyncError::io(path, std::io::Error::other(e)))?;
    hashed.map_err(|e| SyncError::io(path, e))
}

fn pair_key(direction: SyncDirection, local: &Path, network: &Path) -> SyncKey {
    match direction {
        SyncDirection::ToLocal => SyncKey::new(network, local),
        SyncDirection::ToNetwork | SyncDirection::Bidirectional => SyncKey::new(local, network),
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

async fn metadata_opt(path: &Path) -> Result<Option<std::fs::Metadata>, SyncError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(Some(meta)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::io(path, e)),
    }
}

async fn preserve_mtime(path: &Path, modified: SystemTime) {
    let owned = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        std::fs::File::options()
            .write(true)
            .open(&owned)?
            .set_modified(modified)
    })
    .await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(path = %path.display(), error = %e, "could not preserve mtime"),
        Err(e) => debug!(path = %path.display(), error = %e, "mtime task failed"),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use worksync_core::domain::SyncState;
    use worksync_store::NetworkMonitor;

    use super::*;

    fn service(root: &Path) -> SyncService {
        let config = SyncConfig {
            cleanup_delay_ms: 1,
            ..SyncConfig::default()
        };
        SyncService::new(
            Arc::new(PathResolver::new(root, Arc::new(NetworkMonitor::disabled()))),
            Arc::new(LockRegistry::new(Duration::from_millis(200))),
            Arc::new(SyncStatusRegistry::new()),
            &config,
        )
    }

    #[tokio::test]
    async fn test_sync_to_network_copies_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let svc = service(dir.path());
        let local = dir.path().join("local/a.json");
        let network = dir.path().join("net/sub/a.json");
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(&local, b"{\"v\":1}").unwrap();

        let result = svc.sync_to_network(&local, &network).await;
        assert!(result.is_success(), "{result}");
        assert_eq!(std::fs::read(&network).unwrap(), b"{\"v\":1}");

        // overwrite an existing destination
        std::fs::write(&local, b"{\"v\":2}").unwrap();
        assert!(svc.sync_to_network(&local, &network).await.is_success());
        assert_eq!(std::fs::read(&network).unwrap(), b"{\"v\":2}");
        assert!(!with_suffix(&network, SYNC_BAK_SUFFIX).exists());
        assert!(!with_suffix(&network, SYNC_TMP_SUFFIX).exists());

        let status = svc.statuses().get(&SyncKey::new(&local, &network)).unwrap();
        assert_eq!(status.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_missing_source_fails_and_leaves_pending() {
        let dir = TempDir::new().unwrap();
        let svc = service(dir.path());
        let network = dir.path().join("net/a.json");
        let local = dir.path().join("local/a.json");

        let result = svc.sync_to_local(&network, &local).await;
        assert!(result.is_failure());
        assert!(!local.exists());

        let status = svc.statuses().get(&SyncKey::new(&network, &local)).unwrap();
        assert!(status.is_pending());
        assert_eq!(status.retry_count(), 1);
        assert_eq!(status.direction(), SyncDirection::ToLocal);
    }

    #[tokio::test]
    async fn test_copy_preserves_source_mtime() {
        let dir = TempDir::new().unwrap();
        let svc = service(dir.path());
        let local = dir.path().join("a.json");
        let network = dir.path().join("b.json");
        std::fs::write(&local, b"[1]").unwrap();
        let old = SystemTime::now() - Duration::from_secs(7200);
        std::fs::File::options()
            .write(true)
            .open(&local)
            .unwrap()
            .set_modified(old)
            .unwrap();

        assert!(svc.sync_to_network(&local, &network).await.is_success());
        let copied = std::fs::metadata(&network).unwrap().modified().unwrap();
        let drift = copied.duration_since(old).unwrap_or_else(|e| e.duration());
        assert!(drift < Duration::from_secs(1), "drift {drift:?}");
    }

    #[tokio::test]
    async fn test_bidirectional_one_side_missing() {
        let dir = TempDir::new().unwrap();
        let svc = service(dir.path());
        let local = dir.path().join("l.json");
        let network = dir.path().join("n.json");

        let err = svc.sync_bidirectional(&local, &network).await.unwrap_err();
        assert!(matches!(err, SyncError::NothingToSync { .. }));

        std::fs::write(&network, b"[2]").unwrap();
        assert_eq!(
            svc.sync_bidirectional(&local, &network).await.unwrap(),
            SyncOutcome::CopiedToLocal
        );
        assert_eq!(std::fs::read(&local).unwrap(), b"[2]");
    }

    #[tokio::test]
    async fn test_equal_mtime_local_wins() {
        let dir = TempDir::new().unwrap();
        let svc = service(dir.path());
        let local = dir.path().join("l.json");
        let network = dir.path().join("n.json");
        std::fs::write(&local, b"local").unwrap();
        std::fs::write(&network, b"network!").unwrap();
        let at = SystemTime::now() - Duration::from_secs(60);
        for p in [&local, &network] {
            std::fs::File::options()
                .write(true)
                .open(p)
                .unwrap()
                .set_modified(at)
                .unwrap();
        }

        assert_eq!(
            svc.sync_bidirectional(&local, &network).await.unwrap(),
            SyncOutcome::CopiedToNetwork
        );
        assert_eq!(std::fs::read(&network).unwrap(), b"local");
    }

    #[tokio::test]
    async fn test_sync_file_without_network_root_is_local_only() {
        let dir = TempDir::new().unwrap();
        let svc = service(dir.path());
        let file = FilePath::users();

        let result = svc.sync_file(&file, SyncDirection::ToNetwork).await;
        assert_eq!(result.path(), Some(dir.path().join("login/users.json").as_path()));
        assert!(svc.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_hash_file_matches_known_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            hash_file(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_pair_key_orientation() {
        let l = Path::new("/l");
        let n = Path::new("/n");
        assert_eq!(pair_key(SyncDirection::ToLocal, l, n), SyncKey::new(n, l));
        assert_eq!(pair_key(SyncDirection::ToNetwork, l, n), SyncKey::new(l, n));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposite_copies_of_one_pair_do_not_deadlock() {
        let dir = TempDir::new().unwrap();
        let svc = Arc::new(service(dir.path()));
        let local = dir.path().join("local/pair.json");
        let network = dir.path().join("share/pair.json");
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::create_dir_all(network.parent().unwrap()).unwrap();
        std::fs::write(&local, b"[1]").unwrap();
        std::fs::write(&network, b"[2]").unwrap();

        for _ in 0..50 {
            let push = svc.spawn_sync_to_network(local.clone(), network.clone());
            let pull = svc.spawn_sync_to_local(network.clone(), local.clone());
            let (push, pull) = tokio::join!(push, pull);
            assert!(push.unwrap().is_success());
            assert!(pull.unwrap().is_success());
        }
        assert_eq!(std::fs::read(&local).unwrap(), std::fs::read(&network).unwrap());
    }
}
