//! File event port (driven/secondary port)
//!
//! Write paths publish a [`FileEvent`] after every attempt. Consumers such as
//! the backup listener subscribe through whatever transport the adapter
//! provides; the writer only sees [`IFileEventSink`].
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because delivery is adapter-specific.
//! - Publishing is fire-and-forget. A sink failure is logged by the caller and
//!   never turns a successful write into a failed one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::FilePath;

// ============================================================================
// FileEvent
// ============================================================================

/// Outcome of a write, as seen by subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FileEvent {
    WriteSucceeded {
        /// Concrete path that was written
        path: PathBuf,
        /// Logical identity, absent for raw path writes
        file: Option<FilePath>,
        duration: Duration,
        /// Whether the written file should get a backup
        backup_eligible: bool,
    },
    WriteFailed {
        path: PathBuf,
        file: Option<FilePath>,
        error: String,
    },
}

impl FileEvent {
    pub fn succeeded(
        path: impl Into<PathBuf>,
        file: Option<FilePath>,
        duration: Duration,
        backup_eligible: bool,
    ) -> Self {
        FileEvent::WriteSucceeded {
            path: path.into(),
            file,
            duration,
            backup_eligible,
        }
    }

    pub fn failed(path: impl Into<PathBuf>, file: Option<FilePath>, error: impl Into<String>) -> Self {
        FileEvent::WriteFailed {
            path: path.into(),
            file,
            error: error.into(),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            FileEvent::WriteSucceeded { path, .. } | FileEvent::WriteFailed { path, .. } => path,
        }
    }

    pub fn file(&self) -> Option<&FilePath> {
        match self {
            FileEvent::WriteSucceeded { file, .. } | FileEvent::WriteFailed { file, .. } => {
                file.as_ref()
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FileEvent::WriteSucceeded { .. })
    }
}

// ============================================================================
// IFileEventSink
// ============================================================================

/// Port trait for publishing write outcomes
#[async_trait::async_trait]
pub trait IFileEventSink: Send + Sync {
    /// Delivers an event to every current subscriber
    async fn publish(&self, event: FileEvent) -> anyhow::Result<()>;
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

#[async_trait::async_trait]
impl IFileEventSink for NoopEventSink {
    async fn publish(&self, _event: FileEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
