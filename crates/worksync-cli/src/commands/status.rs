//! Status command - Storage roots and network availability
//!
//! Probes the network share once (not cached across runs) and counts the data
//! files present under each local subdirectory.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;
use worksync_core::domain::FileKind;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let store = ctx.open_store()?;

        let network_available = if store.network.is_configured() {
            store.network.refresh().await
        } else {
            false
        };
        info!(network_available, "status probed");

        let local_root = store.resolver.local_root();
        let counts: Vec<(FileKind, usize)> = FileKind::ALL
            .into_iter()
            .map(|kind| (kind, count_data_files(&local_root.join(kind.subdir()))))
            .collect();

        if ctx.is_json() {
            let files: serde_json::Map<String, serde_json::Value> = counts
                .iter()
                .map(|(kind, n)| (kind.name().to_string(), (*n).into()))
                .collect();
            formatter.print_json(&serde_json::json!({
                "config_path": ctx.config_path().display().to_string(),
                "local_root": local_root.display().to_string(),
                "network_root": store.resolver.network_root().map(|p| p.display().to_string()),
                "network_available": network_available,
                "backup_root": store.backups.backup_root().display().to_string(),
                "files": files,
            }));
            return Ok(());
        }

        formatter.success("WorkSync storage");
        formatter.field("Config", &ctx.config_path().display().to_string());
        formatter.field("Local root", &local_root.display().to_string());
        match store.resolver.network_root() {
            Some(root) => {
                let state = if network_available { "available" } else { "unreachable" };
                formatter.field("Network root", &format!("{} ({state})", root.display()));
            }
            None => formatter.field("Network root", "not configured"),
        }
        formatter.field("Backups", &store.backups.backup_root().display().to_string());
        formatter.info("");
        for (kind, n) in &counts {
            formatter.field(kind.name(), &n.to_string());
        }
        if store.network.is_configured() && !network_available {
            formatter.warn("network storage unreachable, reads and writes use local storage");
        }
        Ok(())
    }
}

/// Number of `.json` files directly inside `dir`. Missing directories count as empty.
fn count_data_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        .count()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_count_ignores_backups_and_dirs() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("b.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("b.json.bak"), b"{}").unwrap();
        std::fs::create_dir(dir.path().join("sub.json")).unwrap();
        assert_eq!(count_data_files(dir.path()), 2);
    }

    #[test]
    fn test_count_missing_dir_is_zero() {
        let dir = TempDir::new().unwrap();
        assert_eq!(count_data_files(&dir.path().join("absent")), 0);
    }
}
