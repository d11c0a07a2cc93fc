//! Read command - Decode and print a data file
//!
//! Goes through the regular reader, so obfuscated files are decoded and a
//! corrupt primary falls back to its backup.

use anyhow::Result;
use clap::Args;
use tracing::debug;

use super::{CommandContext, FileArgs};

#[derive(Debug, Args)]
pub struct ReadCommand {
    #[command(flatten)]
    pub file: FileArgs,
}

impl ReadCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        self.file.authorize(false)?;
        let formatter = ctx.formatter();
        let store = ctx.open_store()?;
        let file = self.file.file_path()?;
        let path = store.resolver.path_for(&file).await;
        debug!(path = %path.display(), "reading");

        let Some(value) = store.reader.read_file::<serde_json::Value>(&file).await else {
            anyhow::bail!("{} has no readable content at {}", file, path.display());
        };

        if ctx.is_json() {
            formatter.print_json(&value);
        } else {
            formatter.success(&format!("{} ({})", file, path.display()));
            for line in serde_json::to_string_pretty(&value)?.lines() {
                formatter.info(line);
            }
        }
        Ok(())
    }
}
