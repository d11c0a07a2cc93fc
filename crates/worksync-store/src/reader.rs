//! Reads with backup fallback
//!
//! A primary that cannot be read, is shorter than the minimum valid size, or
//! does not decode falls back to its simple `.bak`. Reads return `None`
//! rather than an error when neither copy is usable.

use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};
use worksync_core::domain::FilePath;

use crate::backup::simple_backup_path;
use crate::codec::Codec;
use crate::error::StoreError;
use crate::locks::LockRegistry;
use crate::paths::PathResolver;

/// Decodes data files under the shared read lock
pub struct FileReader {
    resolver: Arc<PathResolver>,
    locks: Arc<LockRegistry>,
    codec: Codec,
    min_valid_size: u64,
}

impl FileReader {
    pub fn new(
        resolver: Arc<PathResolver>,
        locks: Arc<LockRegistry>,
        codec: Codec,
        min_valid_size: u64,
    ) -> Self {
        Self {
            resolver,
            locks,
            codec,
            min_valid_size,
        }
    }

    #[instrument(skip(self), fields(file = %file))]
    pub async fn read_file<T: DeserializeOwned>(&self, file: &FilePath) -> Option<T> {
        let path = self.resolver.path_for(file).await;
        self.read_path(&path).await
    }

    /// Same as [`read_file`](Self::read_file) without taking the lock
    pub async fn read_file_unlocked<T: DeserializeOwned>(&self, file: &FilePath) -> Option<T> {
        let path = self.resolver.path_for(file).await;
        self.load_with_fallback(&path).await
    }

    /// Locked read of an arbitrary path
    pub async fn read_path<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let _guard = match self.locks.read(path).await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not acquire read lock");
                return None;
            }
        };
        self.load_with_fallback(path).await
    }

    async fn load_with_fallback<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        match self.load(path).await {
            Ok(value) => return Some(value),
            Err(StoreError::NotFound(_)) => debug!(path = %path.display(), "file not found, trying backup"),
            Err(e) => warn!(path = %path.display(), error = %e, "primary unreadable, trying backup"),
        }

        let backup = simple_backup_path(path);
        match self.load(&backup).await {
            Ok(value) => {
                info!(path = %path.display(), "recovered content from simple backup");
                Some(value)
            }
            Err(StoreError::NotFound(_)) => None,
            Err(e) => {
                warn!(backup = %backup.display(), error = %e, "backup unreadable");
                None
            }
        }
    }

    async fn load<T: DeserializeOwned>(&self, path: &Path) -> Result<T, StoreError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        if (bytes.len() as u64) < self.min_valid_size {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "{} bytes, below minimum of {}",
                    bytes.len(),
                    self.min_valid_size
                ),
            });
        }
        self.codec.decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::network::NetworkMonitor;

    fn reader(root: &Path) -> FileReader {
        let resolver = Arc::new(PathResolver::new(root, Arc::new(NetworkMonitor::disabled())));
        FileReader::new(
            resolver,
            Arc::new(LockRegistry::new(Duration::from_millis(50))),
            Codec::new("key", true),
            2,
        )
    }

    #[tokio::test]
    async fn test_reads_plain_and_obfuscated() {
        let dir = TempDir::new().unwrap();
        let r = reader(dir.path());
        let codec = Codec::new("key", true);

        let plain = dir.path().join("plain.json");
        std::fs::write(&plain, b"[1, 2]").unwrap();
        let hidden = dir.path().join("hidden.json");
        std::fs::write(&hidden, codec.encode(&vec![3, 4], true).unwrap()).unwrap();

        assert_eq!(r.read_path::<Vec<i32>>(&plain).await, Some(vec![1, 2]));
        assert_eq!(r.read_path::<Vec<i32>>(&hidden).await, Some(vec![3, 4]));
    }

    #[tokio::test]
    async fn test_corrupt_primary_falls_back_to_backup() {
        let dir = TempDir::new().unwrap();
        let r = reader(dir.path());
        let path = dir.path().join("users.json");
        std::fs::write(&path, b"{not json").unwrap();
        std::fs::write(simple_backup_path(&path), b"[\"ana\"]").unwrap();

        let users: Option<Vec<String>> = r.read_path(&path).await;
        assert_eq!(users, Some(vec!["ana".to_string()]));
    }

    #[tokio::test]
    async fn test_tiny_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let r = reader(dir.path());
        let path = dir.path().join("one.json");
        // "1" is valid JSON but below the minimum size
        std::fs::write(&path, b"1").unwrap();
        assert_eq!(r.read_path::<i32>(&path).await, None);
    }

    #[tokio::test]
    async fn test_missing_everything_is_none() {
        let dir = TempDir::new().unwrap();
        let r = reader(dir.path());
        let got: Option<serde_json::Value> = r.read_file(&FilePath::users()).await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_unlocked_read_ignores_held_lock() {
        let dir = TempDir::new().unwrap();
        let r = reader(dir.path());
        let file = FilePath::users();
        let path = dir.path().join("login/users.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"[]").unwrap();

        let _held = r.locks.write(&path).await.unwrap();
        assert_eq!(r.read_file::<Vec<i32>>(&file).await, None);
        assert_eq!(r.read_file_unlocked::<Vec<i32>>(&file).await, Some(vec![]));
    }
}
