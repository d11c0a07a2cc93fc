//! Tiered backups
//!
//! ## Layout
//!
//! ```text
//! <dir>/<file>.json
//! <dir>/<file>.json.bak                          simple backup, every tier
//!
//! <backup_root>/<tier>/<type>/<user>/<yyyy>/<MM>/
//!     <file>.json.<yyyyMMdd_HHmmss>.bak          timestamped, medium/high only
//!     <file>.json.<yyyyMMdd_HHmmss>-<n>.bak      same-second collision
//! ```
//!
//! Rotation keeps the newest N timestamped copies per file (5 medium, 10 high).
//! The daily cleanup deletes timestamped copies older than the retention
//! window; simple `.bak` files are only ever replaced, never aged out.

use std::cmp::Reverse;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Datelike, Local, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use worksync_core::config::Config;
use worksync_core::domain::{CriticalityLevel, FileOperationResult, FilePath};

use crate::error::StoreError;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const BACKUP_SUFFIX: &str = ".bak";

/// `<file>.bak` next to `path`
pub fn simple_backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

// ============================================================================
// BackupScope
// ============================================================================

/// Where in the backup tree a file's timestamped copies live
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupScope {
    pub file_type: String,
    pub username: String,
    pub year: i32,
    pub month: u32,
}

impl BackupScope {
    /// Scope of a logical file. Missing owner or period fall back to
    /// `shared` and the current month.
    pub fn from_file(file: &FilePath) -> Self {
        let now = Local::now();
        Self {
            file_type: file.kind().name().to_string(),
            username: file.username().unwrap_or("shared").to_string(),
            year: file.year().unwrap_or_else(|| now.year()),
            month: file.month().unwrap_or_else(|| now.month()),
        }
    }

    /// Scope for a path without logical identity
    pub fn for_path(_path: &Path) -> Self {
        let now = Local::now();
        Self {
            file_type: "misc".to_string(),
            username: "shared".to_string(),
            year: now.year(),
            month: now.month(),
        }
    }

    fn relative_dir(&self) -> PathBuf {
        PathBuf::from(&self.file_type)
            .join(&self.username)
            .join(self.year.to_string())
            .join(format!("{:02}", self.month))
    }
}

impl From<&FilePath> for BackupScope {
    fn from(file: &FilePath) -> Self {
        Self::from_file(file)
    }
}

// ============================================================================
// BackupEntry / CleanupReport
// ============================================================================

/// A backup file found on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    pub size: u64,
    /// `false` for the simple `.bak` sibling
    pub timestamped: bool,
    #[serde(skip)]
    order: (SystemTime, String, u32),
}

/// Outcome of an age-based cleanup sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Timestamped backups deleted
    pub deleted: usize,
    /// Backups kept, either recent or simple `.bak` files
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl CleanupReport {
    /// Merge another report into this one.
    pub fn merge(&mut self, other: CleanupReport) {
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }
}

// ============================================================================
// BackupManager
// ============================================================================

/// Creates, lists, restores and ages out backups
pub struct BackupManager {
    backup_root: PathBuf,
    medium_retention: usize,
    high_retention: usize,
}

impl BackupManager {
    pub fn new(backup_root: impl Into<PathBuf>, medium_retention: usize, high_retention: usize) -> Self {
        Self {
            backup_root: backup_root.into(),
            medium_retention,
            high_retention,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.backup_root(),
            config.backup.medium_retention,
            config.backup.high_retention,
        )
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Timestamped copies kept for `level` (0 for low)
    pub fn retention_for(&self, level: CriticalityLevel) -> usize {
        match level {
            CriticalityLevel::Low => 0,
            CriticalityLevel::Medium => self.medium_retention,
            CriticalityLevel::High => self.high_retention,
        }
    }

    pub fn timestamped_dir(&self, level: CriticalityLevel, scope: &BackupScope) -> PathBuf {
        self.backup_root
            .join(level.dir_name())
            .join(scope.relative_dir())
    }

    /// Copies `file` to its simple backup and, for medium/high, to a new
    /// timestamped backup followed by rotation.
    ///
    /// The returned path is the timestamped copy when one was made, else the
    /// simple backup.
    #[instrument(skip(self, scope), fields(file = %file.display(), level = %level))]
    pub async fn create_backup(
        &self,
        file: &Path,
        level: CriticalityLevel,
        scope: &BackupScope,
    ) -> FileOperationResult {
        match self.try_create_backup(file, level, scope).await {
            Ok(path) => FileOperationResult::success(path),
            Err(StoreError::NotFound(p)) => {
                debug!("nothing to back up");
                FileOperationResult::failure(format!("source file does not exist: {}", p.display()))
            }
            Err(e) => {
                warn!(error = %e, "backup failed");
                FileOperationResult::from_error("backup failed", &e)
            }
        }
    }

    async fn try_create_backup(
        &self,
        file: &Path,
        level: CriticalityLevel,
        scope: &BackupScope,
    ) -> Result<PathBuf, StoreError> {
        let meta = tokio::fs::metadata(file)
            .await
            .map_err(|e| StoreError::io(file, e))?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(file.to_path_buf()));
        }

        let simple = simple_backup_path(file);
        tokio::fs::copy(file, &simple)
            .await
            .map_err(|e| StoreError::io(&simple, e))?;
        debug!(backup = %simple.display(), "simple backup written");

        if !level.keeps_timestamped() {
            return Ok(simple);
        }

        let dir = self.timestamped_dir(level, scope);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        let file_name = file_name_of(file)?;
        let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let target = dir.join(next_backup_name(&dir, &file_name, &stamp).await?);
        tokio::fs::copy(file, &target)
            .await
            .map_err(|e| StoreError::io(&target, e))?;
        debug!(backup = %target.display(), "timestamped backup written");

        self.rotate(&dir, &file_name, self.retention_for(level)).await?;
        Ok(target)
    }

    /// Deletes the oldest timestamped backups of `file_name` in `dir` beyond `keep`.
    async fn rotate(&self, dir: &Path, file_name: &str, keep: usize) -> Result<usize, StoreError> {
        let entries = scan_timestamped(dir, file_name).await?;
        let mut removed = 0;
        for entry in entries.iter().skip(keep) {
            match tokio::fs::remove_file(&entry.path).await {
                Ok(()) => {
                    removed += 1;
                    debug!(backup = %entry.path.display(), "rotated out old backup");
                }
                Err(e) => warn!(backup = %entry.path.display(), error = %e, "failed to rotate backup"),
            }
        }
        Ok(removed)
    }

    /// All backups of `file`: timestamped copies for medium/high plus the
    /// simple backup, newest first.
    pub async fn list_available_backups(
        &self,
        file: &Path,
        level: CriticalityLevel,
        scope: &BackupScope,
    ) -> Vec<BackupEntry> {
        let mut entries = Vec::new();
        if level.keeps_timestamped() {
            if let Ok(name) = file_name_of(file) {
                match scan_timestamped(&self.timestamped_dir(level, scope), &name).await {
                    Ok(found) => entries.extend(found),
                    Err(e) => warn!(file = %file.display(), error = %e, "failed to scan backups"),
                }
            }
        }
        if let Some(simple) = entry_for(&simple_backup_path(file), false).await {
            entries.push(simple);
        }
        entries.sort_by(|a, b| b.order.cmp(&a.order));
        entries
    }

    /// Newest timestamped backup, or the simple backup when there is none
    pub async fn find_latest_backup(
        &self,
        file: &Path,
        level: CriticalityLevel,
        scope: &BackupScope,
    ) -> Option<BackupEntry> {
        if level.keeps_timestamped() {
            let name = file_name_of(file).ok()?;
            if let Ok(found) = scan_timestamped(&self.timestamped_dir(level, scope), &name).await {
                if let Some(latest) = found.into_iter().next() {
                    return Some(latest);
                }
            }
        }
        entry_for(&simple_backup_path(file), false).await
    }

    /// Replaces `file` with its latest backup.
    #[instrument(skip(self, scope), fields(file = %file.display(), level = %level))]
    pub async fn restore_from_latest_backup(
        &self,
        file: &Path,
        level: CriticalityLevel,
        scope: &BackupScope,
    ) -> FileOperationResult {
        let Some(latest) = self.find_latest_backup(file, level, scope).await else {
            warn!("no backup available");
            return FileOperationResult::failure(format!(
                "no backup available for {}",
                file.display()
            ));
        };

        match restore_copy(&latest.path, file).await {
            Ok(()) => {
                info!(backup = %latest.path.display(), "restored from backup");
                FileOperationResult::success(file)
            }
            Err(e) => {
                warn!(backup = %latest.path.display(), error = %e, "restore failed");
                FileOperationResult::from_error("restore failed", &e)
            }
        }
    }

    /// Deletes timestamped backups older than `retention_days` across the whole tree.
    #[instrument(skip(self), fields(root = %self.backup_root.display()))]
    pub async fn cleanup_old_backups(&self, retention_days: u32) -> CleanupReport {
        let max_age = Duration::from_secs(u64::from(retention_days) * 86_400);
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let root = self.backup_root.clone();
        let report = match tokio::task::spawn_blocking(move || cleanup_tree(&root, cutoff)).await {
            Ok(report) => report,
            Err(e) => CleanupReport {
                errors: vec![format!("cleanup task failed: {e}")],
                ..CleanupReport::default()
            },
        };

        info!(
            deleted = report.deleted,
            skipped = report.skipped,
            errors = report.errors.len(),
            "backup cleanup finished"
        );
        report
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn file_name_of(file: &Path) -> Result<String, StoreError> {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StoreError::Corrupt {
            path: file.to_path_buf(),
            reason: "path has no file name".to_string(),
        })
}

/// Splits `<stamp>` or `<stamp>-<n>` into its parts when `stamp` has the
/// `yyyyMMdd_HHmmss` shape.
fn parse_stamp(raw: &str) -> Option<(String, u32)> {
    let (stamp, counter) = match raw.split_once('-') {
        Some((s, n)) => (s, n.parse().ok()?),
        None => (raw, 0),
    };
    let bytes = stamp.as_bytes();
    let well_formed = bytes.len() == 15
        && bytes[8] == b'_'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 8 || b.is_ascii_digit());
    well_formed.then(|| (stamp.to_string(), counter))
}

/// Stamp and counter of a timestamped backup name for `file_name`
fn timestamp_of(name: &str, file_name: &str) -> Option<(String, u32)> {
    let rest = name.strip_prefix(file_name)?.strip_prefix('.')?;
    parse_stamp(rest.strip_suffix(BACKUP_SUFFIX)?)
}

/// Whether a file name in the backup tree is a timestamped backup of anything
fn is_timestamped_name(name: &str) -> bool {
    name.strip_suffix(BACKUP_SUFFIX)
        .and_then(|base| base.rsplit_once('.'))
        .and_then(|(_, stamp)| parse_stamp(stamp))
        .is_some()
}

/// Picks `<file>.<stamp>.bak`, or `<file>.<stamp>-<n>.bak` with `n` one past
/// the highest counter already used for this stamp.
async fn next_backup_name(dir: &Path, file_name: &str, stamp: &str) -> Result<String, StoreError> {
    let mut highest: Option<u32> = None;
    let mut rd = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| StoreError::io(dir, e))?;
    while let Some(entry) = rd.next_entry().await.map_err(|e| StoreError::io(dir, e))? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some((s, n)) = timestamp_of(&name, file_name) {
            if s == stamp {
                highest = Some(highest.map_or(n, |h| h.max(n)));
            }
        }
    }

    Ok(match highest {
        None => format!("{file_name}.{stamp}{BACKUP_SUFFIX}"),
        Some(n) => format!("{file_name}.{stamp}-{}{BACKUP_SUFFIX}", n + 1),
    })
}

/// Timestamped backups of `file_name` in `dir`, newest first
async fn scan_timestamped(dir: &Path, file_name: &str) -> Result<Vec<BackupEntry>, StoreError> {
    let mut rd = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };

    let mut entries = Vec::new();
    while let Some(entry) = rd.next_entry().await.map_err(|e| StoreError::io(dir, e))? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if timestamp_of(&name, file_name).is_none() {
            continue;
        }
        if let Some(found) = entry_for(&entry.path(), true).await {
            entries.push(found);
        }
    }
    entries.sort_by_key(|e| Reverse(e.order.clone()));
    Ok(entries)
}

async fn entry_for(path: &Path, timestamped: bool) -> Option<BackupEntry> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    if !meta.is_file() {
        return None;
    }
    let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stamp, counter) = name
        .strip_suffix(BACKUP_SUFFIX)
        .and_then(|base| base.rsplit_once('.'))
        .and_then(|(_, s)| parse_stamp(s))
        .unwrap_or_default();

    Some(BackupEntry {
        path: path.to_path_buf(),
        modified: DateTime::<Utc>::from(mtime),
        size: meta.len(),
        timestamped,
        order: (mtime, stamp, counter),
    })
}

/// Copies `backup` over `target` through a temporary sibling and rename.
async fn restore_copy(backup: &Path, target: &Path) -> Result<(), StoreError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }
    let mut tmp: OsString = target.as_os_str().to_owned();
    tmp.push(".restore");
    let tmp = PathBuf::from(tmp);

    tokio::fs::copy(backup, &tmp)
        .await
        .map_err(|e| StoreError::io(backup, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, target).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(target, e));
    }
    Ok(())
}

/// Recursive age sweep, run on a blocking thread.
fn cleanup_tree(dir: &Path, cutoff: SystemTime) -> CleanupReport {
    let mut report = CleanupReport::default();
    let rd = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
        Err(e) => {
            report.errors.push(format!("{}: {e}", dir.display()));
            return report;
        }
    };

    for entry in rd.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            report.merge(cleanup_tree(&path, cutoff));
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(BACKUP_SUFFIX) {
            continue;
        }
        if !is_timestamped_name(&name) {
            report.skipped += 1;
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or_else(|_| SystemTime::now());
        if modified >= cutoff {
            report.skipped += 1;
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(backup = %path.display(), "deleted expired backup");
                report.deleted += 1;
            }
            Err(e) => report.errors.push(format!("{}: {e}", path.display())),
        }
    }
    report
}
