//! Logical file → concrete path resolution
//!
//! Every [`FilePath`] maps to `<root>/<subdir>/<file_name>` under the local
//! root and, when the share is reachable, under the network root. Requests
//! for the network replica degrade to the local path when the share is down.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument, warn};
use worksync_core::config::Config;
use worksync_core::domain::{FileKind, FileOperationResult, FilePath, Locality};

use crate::network::NetworkMonitor;

/// Local path plus the network mirror when reachable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub local: PathBuf,
    pub network: Option<PathBuf>,
}

/// Maps logical files onto the local and network roots
pub struct PathResolver {
    local_root: PathBuf,
    network: Arc<NetworkMonitor>,
}

impl PathResolver {
    pub fn new(local_root: impl Into<PathBuf>, network: Arc<NetworkMonitor>) -> Self {
        Self {
            local_root: local_root.into(),
            network,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let monitor = NetworkMonitor::new(config.paths.network_root.clone(), &config.network);
        Self::new(config.paths.local_root.clone(), Arc::new(monitor))
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn network_root(&self) -> Option<&Path> {
        self.network.root()
    }

    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    pub fn local_path(&self, file: &FilePath) -> PathBuf {
        self.local_root.join(file.relative_path())
    }

    /// Network mirror path regardless of reachability
    pub fn network_path_unchecked(&self, file: &FilePath) -> Option<PathBuf> {
        self.network.root().map(|root| root.join(file.relative_path()))
    }

    pub async fn is_network_available(&self) -> bool {
        self.network.is_network_available().await
    }

    pub async fn resolve(&self, file: &FilePath) -> ResolvedPaths {
        let network = if self.network.is_network_available().await {
            self.network_path_unchecked(file)
        } else {
            None
        };
        ResolvedPaths {
            local: self.local_path(file),
            network,
        }
    }

    /// Concrete path for the replica named by `file.locality()`
    pub async fn path_for(&self, file: &FilePath) -> PathBuf {
        match file.locality() {
            Locality::Local => self.local_path(file),
            Locality::Network => match self.resolve(file).await.network {
                Some(path) => path,
                None => {
                    warn!(file = %file, "network path requested while share unavailable, using local path");
                    self.local_path(file)
                }
            },
        }
    }

    /// Creates every logical subdirectory under the local root, and under the
    /// network root when reachable.
    ///
    /// Failure on the network side marks the share unavailable; failure on the
    /// local side is reported but the process keeps running.
    #[instrument(skip(self), fields(local_root = %self.local_root.display()))]
    pub async fn ensure_directories(&self) -> FileOperationResult {
        if let Err(e) = create_tree(&self.local_root).await {
            warn!(error = %e, "failed to create local directory tree");
            return FileOperationResult::from_error("failed to create local directories", &e);
        }

        if let Some(root) = self.network.root() {
            if self.network.is_network_available().await {
                if let Err(e) = create_tree(root).await {
                    warn!(root = %root.display(), error = %e, "failed to create network directory tree");
                    self.network.mark_unavailable("directory creation failed").await;
                }
            }
        }

        info!("storage directories ready");
        FileOperationResult::success(&self.local_root)
    }
}

async fn create_tree(root: &Path) -> std::io::Result<()> {
    for kind in FileKind::ALL {
        tokio::fs::create_dir_all(root.join(kind.subdir())).await?;
    }
    Ok(())
}
