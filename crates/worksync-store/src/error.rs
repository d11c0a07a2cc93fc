//! Error types for the storage layer.
//!
//! Internal helpers return `Result<_, StoreError>`; the public reader, writer
//! and backup APIs turn these into `FileOperationResult` or `Option`.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use thiserror::Error;
use worksync_core::domain::DomainError;

/// Windows `ERROR_SHARING_VIOLATION`
const ERROR_SHARING_VIOLATION: i32 = 32;
/// Windows `ERROR_LOCK_VIOLATION`
const ERROR_LOCK_VIOLATION: i32 = 33;

/// Errors that can occur while reading or writing data files.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("timed out waiting for lock on {0}")]
    LockTimeout(PathBuf),

    #[error("file locked by another process: {0}")]
    FileLocked(PathBuf),

    #[error("not found: {0}")]
    NotFound(PathBuf),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
}

impl StoreError {
    /// Classifies an I/O error on `path`.
    ///
    /// Missing files become [`StoreError::NotFound`]; sharing violations and
    /// permission errors on an existing file become [`StoreError::FileLocked`].
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == ErrorKind::NotFound {
            return StoreError::NotFound(path);
        }
        if is_lock_error(&source, &path) {
            return StoreError::FileLocked(path);
        }
        StoreError::Io { path, source }
    }

    /// Whether the failure is an access conflict worth retrying
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::LockTimeout(_) | StoreError::FileLocked(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

fn is_lock_error(err: &io::Error, path: &Path) -> bool {
    match err.kind() {
        ErrorKind::WouldBlock => true,
        ErrorKind::PermissionDenied => path.exists(),
        _ => {
            cfg!(windows)
                && matches!(
                    err.raw_os_error(),
                    Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
                )
        }
    }
}
