//! Network share reachability
//!
//! Shared-drive mounts can report a directory as existing while being stale,
//! so availability is confirmed by creating and deleting a probe file.
//!
//! ```text
//!   is_network_available() ──► cached & fresh? ──yes──► cached value
//!                                   │ no
//!                                   ▼
//!                               refresh() ──► probe × attempts (backoff) ──► cache + log transition
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;
use worksync_core::config::NetworkConfig;

#[derive(Debug, Clone, Copy)]
struct ProbeState {
    available: bool,
    checked_at: Instant,
}

/// Cached reachability of the network root
pub struct NetworkMonitor {
    root: Option<PathBuf>,
    attempts: u32,
    backoff: Duration,
    refresh_interval: Duration,
    state: RwLock<Option<ProbeState>>,
}

impl NetworkMonitor {
    pub fn new(root: Option<PathBuf>, config: &NetworkConfig) -> Self {
        Self {
            root,
            attempts: config.probe_attempts.max(1),
            backoff: config.probe_backoff(),
            refresh_interval: config.refresh_interval(),
            state: RwLock::new(None),
        }
    }

    /// Monitor for a deployment without a network share
    pub fn disabled() -> Self {
        Self::new(None, &NetworkConfig::default())
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn is_configured(&self) -> bool {
        self.root.is_some()
    }

    /// Last probed value without triggering a probe
    pub async fn cached(&self) -> Option<bool> {
        self.state.read().await.map(|s| s.available)
    }

    /// Availability, re-probing when the cached value is older than the refresh interval
    pub async fn is_network_available(&self) -> bool {
        if self.root.is_none() {
            return false;
        }
        if let Some(state) = *self.state.read().await {
            if state.checked_at.elapsed() < self.refresh_interval {
                return state.available;
            }
        }
        self.refresh().await
    }

    /// Probes the share now and caches the result
    pub async fn refresh(&self) -> bool {
        let Some(root) = self.root.as_deref() else {
            return false;
        };

        let mut available = false;
        for attempt in 1..=self.attempts {
            match probe(root).await {
                Ok(()) => {
                    available = true;
                    break;
                }
                Err(e) => {
                    debug!(
                        root = %root.display(),
                        attempt,
                        error = %e,
                        "network probe failed"
                    );
                    if attempt < self.attempts {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        self.record(available).await;
        available
    }

    /// Forces the cached state to unavailable, e.g. after directory creation failed
    pub async fn mark_unavailable(&self, reason: &str) {
        if let Some(root) = self.root.as_deref() {
            warn!(root = %root.display(), reason, "marking network storage unavailable");
        }
        self.record(false).await;
    }

    async fn record(&self, available: bool) {
        let mut state = self.state.write().await;
        let previous = state.map(|s| s.available);
        *state = Some(ProbeState {
            available,
            checked_at: Instant::now(),
        });
        drop(state);

        let root = self
            .root
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        match (previous, available) {
            (Some(false) | None, true) => info!(root = %root, "network storage available"),
            (Some(true), false) => warn!(root = %root, "network storage lost, using local storage only"),
            (None, false) => warn!(root = %root, "network storage unavailable, using local storage only"),
            _ => debug!(root = %root, available, "network state unchanged"),
        }
    }
}

/// Single write probe: directory exists, is writable, and a file can be created and removed.
async fn probe(root: &Path) -> io::Result<()> {
    let meta = tokio::fs::metadata(root).await?;
    if !meta.is_dir() {
        return Err(io::Error::new(io::ErrorKind::Other, "not a directory"));
    }
    if meta.permissions().readonly() {
        return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
    }

    let probe = root.join(format!(".worksync_probe_{}", Uuid::new_v4()));
    tokio::fs::write(&probe, b"probe").await?;
    tokio::fs::remove_file(&probe).await
}
