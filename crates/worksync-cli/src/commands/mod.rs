//! CLI subcommands and the state they share

pub mod backup;
pub mod config;
pub mod paths;
pub mod read;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use worksync_core::config::Config;
use worksync_core::domain::{FileKind, FilePath, Locality, Role};
use worksync_store::StoreContext;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Global options every command receives
pub struct CommandContext {
    config_path: PathBuf,
    format: OutputFormat,
}

impl CommandContext {
    pub fn new(config_path: Option<PathBuf>, format: OutputFormat) -> Self {
        Self {
            config_path: config_path.unwrap_or_else(Config::default_path),
            format,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format)
    }

    /// Loads the config file, or defaults when it does not exist
    pub fn load_config(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }
        Config::load(&self.config_path).with_context(|| {
            format!(
                "Failed to load configuration from {}",
                self.config_path.display()
            )
        })
    }

    /// Loads and validates the config, then builds a store on it
    pub fn open_store(&self) -> Result<StoreContext> {
        let config = self.load_config()?;
        let errors = config.validate();
        if let Some(first) = errors.first() {
            anyhow::bail!(
                "invalid configuration ({} error(s)), first: {}. Run 'worksync config validate'.",
                errors.len(),
                first
            );
        }
        Ok(StoreContext::new(config))
    }
}

/// Selects one logical data file
#[derive(Debug, Clone, Args)]
pub struct FileArgs {
    /// File kind: session, worktime, register, admin-worktime,
    /// admin-register, admin-bonus or users
    pub kind: FileKind,

    /// Owner username
    #[arg(long)]
    pub user: Option<String>,

    /// Numeric user id
    #[arg(long)]
    pub id: Option<u32>,

    #[arg(long)]
    pub year: Option<i32>,

    #[arg(long)]
    pub month: Option<u32>,

    /// Resolve against network storage instead of local
    #[arg(long)]
    pub network: bool,

    /// Role whose permissions apply
    #[arg(long, default_value = "admin")]
    pub role: Role,
}

impl FileArgs {
    pub fn file_path(&self) -> Result<FilePath> {
        let file = FilePath::build(
            self.kind,
            self.user.as_deref(),
            self.id,
            self.year,
            self.month,
        )?;
        let locality = if self.network {
            Locality::Network
        } else {
            Locality::Local
        };
        Ok(file.with_locality(locality))
    }

    /// Fails unless the selected role may read (or write) this kind of file
    pub fn authorize(&self, write: bool) -> Result<()> {
        if !self.role.can_access(self.kind, write) {
            anyhow::bail!(
                "role '{}' may not {} {} files",
                self.role,
                if write { "write" } else { "read" },
                self.kind
            );
        }
        Ok(())
    }
}
