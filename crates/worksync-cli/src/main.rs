//! WorkSync CLI - Command-line interface for WorkSync storage
//!
//! Provides commands for:
//! - Inspecting storage roots and network availability
//! - Resolving and reading data files
//! - Listing, creating and restoring backups
//! - Replicating files between local and network storage
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    backup::BackupCommand, config::ConfigCommand, paths::PathsCommand, read::ReadCommand,
    status::StatusCommand, sync::SyncCommand, CommandContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "worksync", version, about = "Local/network file storage for WorkSync")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show storage roots and network availability
    Status(StatusCommand),
    /// Resolve the local and network paths of a data file
    Paths(PathsCommand),
    /// Print the decoded content of a data file
    Read(ReadCommand),
    /// Manage backups
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Replicate files between local and network storage
    #[command(subcommand)]
    Sync(SyncCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CommandContext::new(cli.config, format);

    match cli.command {
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::Paths(cmd) => cmd.execute(&ctx).await,
        Commands::Read(cmd) => cmd.execute(&ctx).await,
        Commands::Backup(cmd) => cmd.execute(&ctx).await,
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["worksync", "status", "--json", "-vv", "--config", "/tmp/c.yaml"])
            .unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.yaml")));
    }

    #[test]
    fn test_sync_push_parses_file_selector() {
        let cli = Cli::try_parse_from([
            "worksync", "sync", "push", "worktime", "--user", "ana", "--year", "2024", "--month", "3",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Sync(SyncCommand::Push(_))));
    }

    #[test]
    fn test_unknown_file_kind_is_rejected() {
        assert!(Cli::try_parse_from(["worksync", "read", "payroll"]).is_err());
    }
}
