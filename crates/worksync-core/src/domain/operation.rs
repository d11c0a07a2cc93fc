//! Outcome of a file operation
//!
//! Store and sync services never return errors across their public API.
//! Every I/O attempt ends in a [`FileOperationResult`] that the caller can
//! inspect, log, or show to a user.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Success with the resulting path, or failure with a message and optional cause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOperationResult {
    Success {
        path: PathBuf,
    },
    Failure {
        message: String,
        cause: Option<String>,
    },
}

impl FileOperationResult {
    pub fn success(path: impl Into<PathBuf>) -> Self {
        FileOperationResult::Success { path: path.into() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        FileOperationResult::Failure {
            message: message.into(),
            cause: None,
        }
    }

    /// Failure carrying the display form of the underlying error
    pub fn from_error(message: impl Into<String>, cause: &dyn std::error::Error) -> Self {
        FileOperationResult::Failure {
            message: message.into(),
            cause: Some(cause.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FileOperationResult::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Path produced by a successful operation
    pub fn path(&self) -> Option<&Path> {
        match self {
            FileOperationResult::Success { path } => Some(path),
            FileOperationResult::Failure { .. } => None,
        }
    }

    /// Failure message, `None` on success
    pub fn message(&self) -> Option<&str> {
        match self {
            FileOperationResult::Success { .. } => None,
            FileOperationResult::Failure { message, .. } => Some(message),
        }
    }

    pub fn cause(&self) -> Option<&str> {
        match self {
            FileOperationResult::Failure { cause, .. } => cause.as_deref(),
            FileOperationResult::Success { .. } => None,
        }
    }
}

impl fmt::Display for FileOperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOperationResult::Success { path } => write!(f, "ok: {}", path.display()),
            FileOperationResult::Failure {
                message,
                cause: Some(cause),
            } => write!(f, "failed: {message} ({cause})"),
            FileOperationResult::Failure {
                message,
                cause: None,
            } => write!(f, "failed: {message}"),
        }
    }
}
