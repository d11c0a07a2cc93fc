//! Sync command - Replicate data files between local and network storage
//!
//! `push`, `pull` and `both` act on one file. `retry` reconciles every data
//! file found under either root through the bidirectional retry sweep.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::{debug, info};
use worksync_core::domain::{SyncDirection, SyncKey};
use worksync_store::StoreContext;
use worksync_sync::SyncService;

use super::{CommandContext, FileArgs};

#[derive(Debug, Subcommand)]
pub enum SyncCommand {
    /// Copy the local file to network storage
    Push(FileArgs),
    /// Copy the network file to local storage
    Pull(FileArgs),
    /// Keep whichever side is newer
    Both(FileArgs),
    /// Reconcile every data file present on either side
    Retry,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let store = ctx.open_store()?;
        let service = SyncService::from_context(&store);

        match self {
            SyncCommand::Push(args) => {
                args.authorize(false)?;
                self.execute_one(ctx, &store, &service, args, SyncDirection::ToNetwork)
                    .await
            }
            SyncCommand::Pull(args) => {
                args.authorize(true)?;
                self.execute_one(ctx, &store, &service, args, SyncDirection::ToLocal)
                    .await
            }
            SyncCommand::Both(args) => {
                args.authorize(true)?;
                self.execute_both(ctx, &store, &service, args).await
            }
            SyncCommand::Retry => self.execute_retry(ctx, &store, &service).await,
        }
    }

    async fn execute_one(
        &self,
        ctx: &CommandContext,
        store: &StoreContext,
        service: &SyncService,
        args: &FileArgs,
        direction: SyncDirection,
    ) -> Result<()> {
        let formatter = ctx.formatter();
        let file = args.file_path()?;
        require_network_root(store)?;

        let result = service.sync_file(&file, direction).await;
        if let Some(message) = result.message() {
            anyhow::bail!("{message}: {}", result.cause().unwrap_or("unknown cause"));
        }
        let queued = !service.statuses().pending().is_empty();

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "file": file.to_string(),
                "direction": direction,
                "replicated": !queued,
                "result": result,
            }));
        } else if queued {
            formatter.warn("network storage unreachable, nothing was replicated");
        } else {
            formatter.success(&format!("{file} synced ({direction})"));
        }
        Ok(())
    }

    async fn execute_both(
        &self,
        ctx: &CommandContext,
        store: &StoreContext,
        service: &SyncService,
        args: &FileArgs,
    ) -> Result<()> {
        let formatter = ctx.formatter();
        let file = args.file_path()?;
        let network = require_network_root(store)?;
        if !store.resolver.is_network_available().await {
            anyhow::bail!("network storage at {} is unreachable", network.display());
        }

        let local = store.resolver.local_path(&file);
        let remote = store
            .resolver
            .network_path_unchecked(&file)
            .context("file has no network location")?;
        let outcome = service.sync_bidirectional(&local, &remote).await?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "file": file.to_string(),
                "outcome": outcome,
            }));
        } else {
            formatter.success(&format!("{file}: {outcome}"));
        }
        Ok(())
    }

    async fn execute_retry(
        &self,
        ctx: &CommandContext,
        store: &StoreContext,
        service: &SyncService,
    ) -> Result<()> {
        let formatter = ctx.formatter();
        let network_root = require_network_root(store)?.to_path_buf();
        let local_root = store.resolver.local_root().to_path_buf();
        let local_backups = store.config.backup_root();
        let network_backups = network_root.join(&store.config.paths.backup_dir_name);

        let mut relative = BTreeSet::new();
        collect_data_files(&local_root, &local_root, &local_backups, &mut relative);
        collect_data_files(&network_root, &network_root, &network_backups, &mut relative);
        info!(files = relative.len(), "reconciling data files");

        for rel in &relative {
            let key = SyncKey::new(local_root.join(rel), network_root.join(rel));
            service
                .statuses()
                .mark_pending(&key, SyncDirection::Bidirectional);
        }
        let report = service.retry_pending().await;

        if ctx.is_json() {
            formatter.print_json(&serde_json::to_value(&report)?);
            return Ok(());
        }
        if report.offline > 0 {
            formatter.warn(&format!(
                "network storage unreachable, {} file(s) not reconciled",
                report.offline
            ));
            return Ok(());
        }
        formatter.success(&format!(
            "{} file(s) checked, {} failed",
            report.succeeded + report.failed,
            report.failed
        ));
        for (key, status) in service.statuses().pending() {
            if let Some(error) = status.last_error() {
                formatter.info(&format!("{}: {}", key.source().display(), error));
            }
        }
        Ok(())
    }
}

fn require_network_root(store: &StoreContext) -> Result<&Path> {
    store
        .resolver
        .network_root()
        .context("no network root configured (paths.network_root)")
}

/// Collects `.json` files under `dir`, relative to `root`, skipping `skip`.
/// Unreadable directories are skipped.
fn collect_data_files(root: &Path, dir: &Path, skip: &Path, out: &mut BTreeSet<PathBuf>) {
    if dir == skip {
        return;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            collect_data_files(root, &path, skip, out);
        } else if file_type.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            if let Ok(rel) = path.strip_prefix(root) {
                out.insert(rel.to_path_buf());
            }
        }
    }
}
