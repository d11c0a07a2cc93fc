//! In-process file event bus and the reactive backup listener
//!
//! ```text
//! FileWriter ──publish──► FileEventBus (broadcast) ──► BackupListener ──► BackupManager
//!                                          └──────────► other subscribers
//! ```
//!
//! Backups happen after the write completes, off the write path. A lagging
//! listener loses the oldest events and logs how many.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use worksync_core::domain::{CriticalityLevel, FileOperationResult};
use worksync_core::ports::{FileEvent, IFileEventSink};

use crate::backup::{BackupManager, BackupScope};

/// Default number of buffered events per subscriber
pub const DEFAULT_CAPACITY: usize = 256;

/// Broadcast channel implementing [`IFileEventSink`]
pub struct FileEventBus {
    sender: broadcast::Sender<FileEvent>,
}

impl FileEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FileEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for FileEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait::async_trait]
impl IFileEventSink for FileEventBus {
    async fn publish(&self, event: FileEvent) -> anyhow::Result<()> {
        // No subscribers is not an error: nothing is listening yet.
        if self.sender.send(event).is_err() {
            debug!("file event dropped, no subscribers");
        }
        Ok(())
    }
}

// ============================================================================
// BackupListener
// ============================================================================

/// Creates a backup of every backup-eligible file after it is written
pub struct BackupListener {
    backups: Arc<BackupManager>,
}

impl BackupListener {
    pub fn new(backups: Arc<BackupManager>) -> Self {
        Self { backups }
    }

    /// Handles one event. Returns the backup result, or `None` when the event
    /// does not call for a backup.
    pub async fn handle(&self, event: &FileEvent) -> Option<FileOperationResult> {
        let FileEvent::WriteSucceeded {
            path,
            file,
            backup_eligible: true,
            ..
        } = event
        else {
            return None;
        };

        let (level, scope) = match file {
            Some(file) => (file.criticality(), BackupScope::from_file(file)),
            None => (CriticalityLevel::Medium, BackupScope::for_path(path)),
        };
        let result = self.backups.create_backup(path, level, &scope).await;
        if let Some(message) = result.message() {
            warn!(path = %path.display(), error = message, "reactive backup failed");
        }
        Some(result)
    }

    /// Consumes events until `cancel` fires or the bus is dropped.
    pub fn spawn(
        self,
        mut events: broadcast::Receiver<FileEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("backup listener started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(event) => {
                            self.handle(&event).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "backup listener lagged, events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            info!("backup listener stopped");
        })
    }
}
