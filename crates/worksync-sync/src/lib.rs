//! WorkSync Sync - Local/network replication
//!
//! Provides:
//! - One-way copies with a destination-side safety backup
//! - Bidirectional resolution by size, SHA-256 and modification time
//! - Per-pair status tracking with a retry sweep and exponential backoff
//! - Interval loops for network refresh, retries and maintenance
//!
//! ## Modules
//!
//! - [`service`] - [`SyncService`] copy and resolution operations
//! - [`status`] - In-memory [`SyncStatusRegistry`]
//! - [`retry`] - [`RetryPolicy`] backoff and eligibility
//! - [`scheduler`] - Periodic tasks with bounded shutdown

pub mod retry;
pub mod scheduler;
pub mod service;
pub mod status;

use std::path::PathBuf;

use thiserror::Error;

pub use retry::{RetryPolicy, RetryReport};
pub use scheduler::{ScheduleConfig, Scheduler};
pub use service::{hash_file, SyncOutcome, SyncService};
pub use status::SyncStatusRegistry;

/// Errors that can occur during replication
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error occurred on one side of the pair
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The copy source does not exist or is not a regular file
    #[error("Source not found: {0}")]
    SourceMissing(PathBuf),

    /// Neither side of a bidirectional pair exists
    #[error("Neither {local} nor {network} exists")]
    NothingToSync { local: PathBuf, network: PathBuf },

    /// Another task is already syncing this pair
    #[error("Sync already in progress: {0}")]
    InProgress(String),

    /// Lock acquisition or other storage-layer failure
    #[error("Storage error: {0}")]
    Store(#[from] worksync_store::StoreError),

    /// A status transition was rejected
    #[error("Domain error: {0}")]
    DomainError(#[from] worksync_core::domain::DomainError),
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }
}
