//! Paths command - Show where a data file lives

use anyhow::Result;
use clap::Args;
use worksync_store::BackupScope;

use super::{CommandContext, FileArgs};

#[derive(Debug, Args)]
pub struct PathsCommand {
    #[command(flatten)]
    pub file: FileArgs,
}

impl PathsCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let store = ctx.open_store()?;
        let file = self.file.file_path()?;

        let local = store.resolver.local_path(&file);
        let network = store.resolver.network_path_unchecked(&file);
        let effective = store.resolver.path_for(&file).await;
        let level = file.criticality();
        let backup_dir = store
            .backups
            .timestamped_dir(level, &BackupScope::from_file(&file));

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "file": file.to_string(),
                "criticality": level.to_string(),
                "local": local.display().to_string(),
                "network": network.as_ref().map(|p| p.display().to_string()),
                "effective": effective.display().to_string(),
                "backup_dir": level.keeps_timestamped().then(|| backup_dir.display().to_string()),
            }));
            return Ok(());
        }

        formatter.success(&file.to_string());
        formatter.field("Criticality", &level.to_string());
        formatter.field("Local", &local.display().to_string());
        match &network {
            Some(p) => formatter.field("Network", &p.display().to_string()),
            None => formatter.field("Network", "not configured"),
        }
        formatter.field("Effective", &effective.display().to_string());
        if level.keeps_timestamped() {
            formatter.field("Backup dir", &backup_dir.display().to_string());
        }
        Ok(())
    }
}
