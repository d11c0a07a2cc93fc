//! Shared storage state
//!
//! [`StoreContext`] owns everything that would otherwise be process-global:
//! the lock table, the cached network state, the event bus and the services
//! built on them. Binaries create one at start-up and pass it around.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use worksync_core::config::Config;
use worksync_core::ports::IFileEventSink;

use crate::backup::BackupManager;
use crate::codec::Codec;
use crate::events::{BackupListener, FileEventBus};
use crate::locks::LockRegistry;
use crate::network::NetworkMonitor;
use crate::paths::PathResolver;
use crate::reader::FileReader;
use crate::writer::{FileWriter, WritePolicy};

pub struct StoreContext {
    pub config: Arc<Config>,
    pub network: Arc<NetworkMonitor>,
    pub resolver: Arc<PathResolver>,
    pub locks: Arc<LockRegistry>,
    pub events: Arc<FileEventBus>,
    pub writer: Arc<FileWriter>,
    pub reader: Arc<FileReader>,
    pub backups: Arc<BackupManager>,
}

impl StoreContext {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let network = Arc::new(NetworkMonitor::new(
            config.paths.network_root.clone(),
            &config.network,
        ));
        let resolver = Arc::new(PathResolver::new(
            config.paths.local_root.clone(),
            Arc::clone(&network),
        ));
        let locks = Arc::new(LockRegistry::new(config.storage.lock_timeout()));
        let events = Arc::new(FileEventBus::default());
        let codec = Codec::from_config(&config.storage);

        let sink: Arc<dyn IFileEventSink> = events.clone();
        let writer = Arc::new(FileWriter::new(
            Arc::clone(&resolver),
            Arc::clone(&locks),
            codec.clone(),
            sink,
            WritePolicy::from_config(&config.storage),
        ));
        let reader = Arc::new(FileReader::new(
            Arc::clone(&resolver),
            Arc::clone(&locks),
            codec,
            config.storage.min_valid_file_size,
        ));
        let backups = Arc::new(BackupManager::from_config(&config));

        Self {
            config,
            network,
            resolver,
            locks,
            events,
            writer,
            reader,
            backups,
        }
    }

    /// Starts the reactive backup listener on this context's event bus
    pub fn start_backup_listener(&self, cancel: CancellationToken) -> JoinHandle<()> {
        BackupListener::new(Arc::clone(&self.backups)).spawn(self.events.subscribe(), cancel)
    }
}
