//! Backup command - List, create, restore and clean up backups

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use tracing::info;
use worksync_core::domain::{CriticalityLevel, FileOperationResult};
use worksync_store::{BackupScope, StoreContext};

use super::{CommandContext, FileArgs};

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// List backups of a file, newest first
    List(FileArgs),
    /// Back up a file now
    Create(FileArgs),
    /// Replace a file with its latest backup
    Restore(FileArgs),
    /// Delete timestamped backups older than the retention period
    Cleanup {
        /// Retention in days (defaults to backup.retention_days)
        #[arg(long)]
        days: Option<u32>,
    },
}

impl BackupCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let store = ctx.open_store()?;
        match self {
            BackupCommand::List(file) => execute_list(ctx, &store, file).await,
            BackupCommand::Create(file) => {
                file.authorize(false)?;
                let (path, level, scope) = locate(&store, file).await?;
                let result = store.backups.create_backup(&path, level, &scope).await;
                report(ctx, "Backup created", result)
            }
            BackupCommand::Restore(file) => {
                file.authorize(true)?;
                let (path, level, scope) = locate(&store, file).await?;
                let result = store
                    .backups
                    .restore_from_latest_backup(&path, level, &scope)
                    .await;
                report(ctx, "Restored", result)
            }
            BackupCommand::Cleanup { days } => {
                let days = days.unwrap_or(store.config.backup.retention_days);
                info!(days, "cleaning up backups");
                let report = store.backups.cleanup_old_backups(days).await;
                let formatter = ctx.formatter();
                if ctx.is_json() {
                    formatter.print_json(&serde_json::to_value(&report)?);
                } else {
                    formatter.success(&format!(
                        "Deleted {} backup(s) older than {} day(s)",
                        report.deleted, days
                    ));
                    formatter.field("Kept", &report.skipped.to_string());
                    for error in &report.errors {
                        formatter.warn(error);
                    }
                }
                Ok(())
            }
        }
    }
}

async fn locate(
    store: &StoreContext,
    args: &FileArgs,
) -> Result<(PathBuf, CriticalityLevel, BackupScope)> {
    let file = args.file_path()?;
    let path = store.resolver.path_for(&file).await;
    Ok((path, file.criticality(), BackupScope::from_file(&file)))
}

async fn execute_list(ctx: &CommandContext, store: &StoreContext, args: &FileArgs) -> Result<()> {
    args.authorize(false)?;
    let formatter = ctx.formatter();
    let (path, level, scope) = locate(store, args).await?;
    let entries = store.backups.list_available_backups(&path, level, &scope).await;

    if ctx.is_json() {
        formatter.print_json(&serde_json::json!({
            "file": path.display().to_string(),
            "criticality": level.to_string(),
            "backups": serde_json::to_value(&entries)?,
        }));
        return Ok(());
    }

    if entries.is_empty() {
        formatter.info(&format!("No backups for {}", path.display()));
        return Ok(());
    }
    formatter.success(&format!("{} backup(s) of {}", entries.len(), path.display()));
    for entry in &entries {
        let kind = if entry.timestamped { "timestamped" } else { "simple" };
        formatter.info(&format!(
            "{}  {:>8} B  {:<11}  {}",
            entry.modified.format("%Y-%m-%d %H:%M:%S"),
            entry.size,
            kind,
            entry.path.display()
        ));
    }
    Ok(())
}

fn report(ctx: &CommandContext, label: &str, result: FileOperationResult) -> Result<()> {
    let formatter = ctx.formatter();
    if ctx.is_json() {
        formatter.print_json(&serde_json::to_value(&result)?);
    }
    match result {
        FileOperationResult::Success { path } => {
            if !ctx.is_json() {
                formatter.success(&format!("{label}: {}", path.display()));
            }
            Ok(())
        }
        FileOperationResult::Failure { message, cause } => match cause {
            Some(cause) => anyhow::bail!("{message}: {cause}"),
            None => anyhow::bail!("{message}"),
        },
    }
}
