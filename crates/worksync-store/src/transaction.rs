//! Best-effort multi-file transactions
//!
//! A [`FileTransaction`] collects writes (and files to replicate afterwards)
//! and applies them in order on [`commit`](FileTransaction::commit). If any
//! write fails, the writes already applied are undone: previous content is
//! written back and files that did not exist are removed. This is not atomic
//! across a crash.
//!
//! Writes inside a commit never trigger backups. Backup-eligible files are
//! announced only once every write has succeeded, so a rolled-back commit
//! leaves the backup tree untouched.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use worksync_core::domain::{FileOperationResult, FilePath};

use crate::error::StoreError;
use crate::writer::{FileWriter, WriteOptions};

#[derive(Debug, Clone)]
struct PendingWrite {
    file: FilePath,
    value: serde_json::Value,
    options: WriteOptions,
    backup: bool,
}

/// Prior state of a file touched by a commit
#[derive(Debug)]
struct Applied {
    path: PathBuf,
    file: FilePath,
    previous: Option<Vec<u8>>,
    backup: bool,
}

/// Outcome of [`FileTransaction::commit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    pub result: FileOperationResult,
    /// Paths written, in order. Empty after a rollback.
    pub written: Vec<PathBuf>,
    /// Files queued with [`FileTransaction::add_sync`], for the caller to replicate
    pub syncs: Vec<FilePath>,
}

/// Ordered list of pending writes and syncs
#[derive(Debug, Default)]
pub struct FileTransaction {
    writes: Vec<PendingWrite>,
    syncs: Vec<FilePath>,
}

impl FileTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.writes.len() + self.syncs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queues a write. The value is serialized now so encoding errors surface early.
    pub fn add_write<T: Serialize + ?Sized>(
        &mut self,
        file: FilePath,
        value: &T,
        options: WriteOptions,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.writes.push(PendingWrite {
            file,
            value,
            backup: options.backup,
            options: options.without_dedup().without_backup(),
        });
        Ok(())
    }

    /// Queues a file to replicate once every write has succeeded
    pub fn add_sync(&mut self, file: FilePath) {
        self.syncs.push(file);
    }

    /// Applies every write in order, undoing applied ones on the first failure.
    #[instrument(skip(self, writer), fields(writes = self.writes.len(), syncs = self.syncs.len()))]
    pub async fn commit(self, writer: &FileWriter) -> TransactionOutcome {
        let mut applied: Vec<Applied> = Vec::with_capacity(self.writes.len());

        for pending in &self.writes {
            let path = writer.target_path(&pending.file).await;
            let previous = match tokio::fs::read(&path).await {
                Ok(bytes) => Some(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => {
                    let err = StoreError::io(&path, e);
                    warn!(path = %path.display(), error = %err, "cannot snapshot file, rolling back");
                    rollback_applied(writer, applied).await;
                    return TransactionOutcome {
                        result: FileOperationResult::from_error("transaction aborted", &err),
                        written: Vec::new(),
                        syncs: Vec::new(),
                    };
                }
            };

            let result = writer
                .write_file(&pending.file, &pending.value, pending.options)
                .await;
            if result.is_failure() {
                warn!(file = %pending.file, "transaction write failed, rolling back");
                rollback_applied(writer, applied).await;
                return TransactionOutcome {
                    result: FileOperationResult::Failure {
                        message: format!("transaction rolled back: write of {} failed", pending.file),
                        cause: result.message().map(str::to_string),
                    },
                    written: Vec::new(),
                    syncs: Vec::new(),
                };
            }
            applied.push(Applied {
                path,
                file: pending.file.clone(),
                previous,
                backup: pending.backup,
            });
        }

        info!(writes = applied.len(), "transaction committed");
        for entry in applied.iter().filter(|a| a.backup) {
            writer.announce_backup(&entry.path, &entry.file).await;
        }
        let written: Vec<PathBuf> = applied.into_iter().map(|a| a.path).collect();
        let result = match written.last() {
            Some(last) => FileOperationResult::success(last),
            None => FileOperationResult::success(PathBuf::new()),
        };
        TransactionOutcome {
            result,
            written,
            syncs: self.syncs,
        }
    }

    /// Discards every pending operation. Returns how many were dropped.
    pub fn rollback(self) -> usize {
        let dropped = self.len();
        debug!(dropped, "transaction rolled back before commit");
        dropped
    }
}

async fn rollback_applied(writer: &FileWriter, applied: Vec<Applied>) {
    for entry in applied.into_iter().rev() {
        match entry.previous {
            Some(bytes) => {
                let restored = writer.write_raw(&entry.path, &bytes, false).await;
                if let Some(message) = restored.message() {
                    warn!(path = %entry.path.display(), error = message, "failed to restore previous content");
                }
            }
            None => {
                if let Err(e) = tokio::fs::remove_file(&entry.path).await {
                    warn!(path = %entry.path.display(), error = %e, "failed to remove file created by transaction");
                }
            }
        }
    }
}
