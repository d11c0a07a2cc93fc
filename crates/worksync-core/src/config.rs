//! Configuration module for WorkSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for WorkSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub backup: BackupConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Storage roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Installation directory on this machine.
    pub local_root: PathBuf,
    /// Shared network mirror. `None` runs in local-only mode.
    pub network_root: Option<PathBuf>,
    /// Name of the backup tree under `local_root`.
    pub backup_dir_name: String,
}

/// Network reachability probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Probe attempts before the share is reported unavailable.
    pub probe_attempts: u32,
    /// Delay between probe attempts (ms).
    pub probe_backoff_ms: u64,
    /// Age after which the cached availability is re-probed (s).
    pub refresh_interval_secs: u64,
}

/// Locking, retry, dedup and encoding of data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub lock_timeout_ms: u64,
    pub write_max_attempts: u32,
    pub write_base_backoff_ms: u64,
    pub write_max_backoff_ms: u64,
    /// Writes for the same (user, file) closer than this are dropped. `0` disables.
    pub dedup_window_ms: u64,
    /// Files smaller than this many bytes are treated as corrupt.
    pub min_valid_file_size: u64,
    /// XOR-obfuscate file content at rest.
    pub obfuscate: bool,
    pub obfuscation_key: String,
}

/// Backup retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Timestamped backups older than this are deleted by the daily sweep.
    pub retention_days: u32,
    pub cleanup_interval_hours: u64,
    /// Timestamped copies kept for medium-criticality files.
    pub medium_retention: usize,
    /// Timestamped copies kept for high-criticality files.
    pub high_retention: usize,
}

/// Replication and retry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Failed pairs are no longer retried automatically after this many failures.
    pub max_retries: u32,
    pub retry_base_delay_secs: u64,
    pub retry_max_delay_secs: u64,
    pub retry_sweep_interval_secs: u64,
    /// Attempts to delete the transient destination backup after a copy.
    pub cleanup_attempts: u32,
    pub cleanup_delay_ms: u64,
    /// Idle statuses and unheld locks older than this are evicted (s).
    pub stale_entry_secs: u64,
    /// Upper bound on waiting for scheduled tasks at shutdown (s).
    pub shutdown_timeout_secs: u64,
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    pub format: LogFormat,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/worksync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("worksync")
            .join("config.yaml")
    }

    /// Absolute path of the backup tree.
    pub fn backup_root(&self) -> PathBuf {
        self.paths.local_root.join(&self.paths.backup_dir_name)
    }
}

// ---------------------------------------------------------------------------
// Duration accessors
// ---------------------------------------------------------------------------

impl NetworkConfig {
    pub fn probe_backoff(&self) -> Duration {
        Duration::from_millis(self.probe_backoff_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl StorageConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn write_base_backoff(&self) -> Duration {
        Duration::from_millis(self.write_base_backoff_ms)
    }

    pub fn write_max_backoff(&self) -> Duration {
        Duration::from_millis(self.write_max_backoff_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }
}

impl BackupConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_hours * 3600)
    }
}

impl SyncConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_secs(self.retry_max_delay_secs)
    }

    pub fn retry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retry_sweep_interval_secs)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }

    pub fn stale_entry_age(&self) -> Duration {
        Duration::from_secs(self.stale_entry_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            local_root: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("worksync"),
            network_root: None,
            backup_dir_name: "backup".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_attempts: 3,
            probe_backoff_ms: 1000,
            refresh_interval_secs: 600,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000,
            write_max_attempts: 3,
            write_base_backoff_ms: 500,
            write_max_backoff_ms: 3000,
            dedup_window_ms: 1000,
            min_valid_file_size: 2,
            obfuscate: true,
            obfuscation_key: "WorkSync".to_string(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            cleanup_interval_hours: 24,
            medium_retention: 5,
            high_retention: 10,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_secs: 60,
            retry_max_delay_secs: 3600,
            retry_sweep_interval_secs: 60,
            cleanup_attempts: 3,
            cleanup_delay_ms: 200,
            stale_entry_secs: 3600,
            shutdown_timeout_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"storage.lock_timeout_ms"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- paths ---
        if self.paths.local_root.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "paths.local_root".into(),
                message: "must not be empty".into(),
            });
        }
        if let Some(network) = &self.paths.network_root {
            if network == &self.paths.local_root {
                errors.push(ValidationError {
                    field: "paths.network_root".into(),
                    message: "must differ from paths.local_root".into(),
                });
            }
        }
        let backup_dir = &self.paths.backup_dir_name;
        if backup_dir.is_empty() || backup_dir.contains(['/', '\\']) || backup_dir == ".." {
            errors.push(ValidationError {
                field: "paths.backup_dir_name".into(),
                message: format!("must be a single directory name, got '{backup_dir}'"),
            });
        }

        // --- network ---
        positive(&mut errors, "network.probe_attempts", self.network.probe_attempts.into());
        positive(
            &mut errors,
            "network.refresh_interval_secs",
            self.network.refresh_interval_secs,
        );

        // --- storage ---
        positive(&mut errors, "storage.lock_timeout_ms", self.storage.lock_timeout_ms);
        positive(
            &mut errors,
            "storage.write_max_attempts",
            self.storage.write_max_attempts.into(),
        );
        if self.storage.write_base_backoff_ms > self.storage.write_max_backoff_ms {
            errors.push(ValidationError {
                field: "storage.write_base_backoff_ms".into(),
                message: format!(
                    "write_base_backoff_ms ({}) must not exceed write_max_backoff_ms ({})",
                    self.storage.write_base_backoff_ms, self.storage.write_max_backoff_ms
                ),
            });
        }
        if self.storage.obfuscate && self.storage.obfuscation_key.is_empty() {
            errors.push(ValidationError {
                field: "storage.obfuscation_key".into(),
                message: "must not be empty when obfuscation is enabled".into(),
            });
        }

        // --- backup ---
        positive(&mut errors, "backup.retention_days", self.backup.retention_days.into());
        positive(
            &mut errors,
            "backup.cleanup_interval_hours",
            self.backup.cleanup_interval_hours,
        );
        positive(&mut errors, "backup.medium_retention", self.backup.medium_retention as u64);
        positive(&mut errors, "backup.high_retention", self.backup.high_retention as u64);

        // --- sync ---
        if self.sync.retry_base_delay_secs > self.sync.retry_max_delay_secs {
            errors.push(ValidationError {
                field: "sync.retry_base_delay_secs".into(),
                message: format!(
                    "retry_base_delay_secs ({}) must not exceed retry_max_delay_secs ({})",
                    self.sync.retry_base_delay_secs, self.sync.retry_max_delay_secs
                ),
            });
        }
        positive(
            &mut errors,
            "sync.retry_sweep_interval_secs",
            self.sync.retry_sweep_interval_secs,
        );
        positive(&mut errors, "sync.cleanup_attempts", self.sync.cleanup_attempts.into());
        positive(&mut errors, "sync.stale_entry_secs", self.sync.stale_entry_secs);

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use worksync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .local_root(PathBuf::from("/opt/worksync"))
///     .network_root(PathBuf::from("/mnt/share/worksync"))
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- paths ---

    pub fn local_root(mut self, root: PathBuf) -> Self {
        self.config.paths.local_root = root;
        self
    }

    pub fn network_root(mut self, root: PathBuf) -> Self {
        self.config.paths.network_root = Some(root);
        self
    }

    pub fn backup_dir_name(mut self, name: impl Into<String>) -> Self {
        self.config.paths.backup_dir_name = name.into();
        self
    }

    // --- network ---

    pub fn probe_attempts(mut self, attempts: u32) -> Self {
        self.config.network.probe_attempts = attempts;
        self
    }

    pub fn probe_backoff_ms(mut self, ms: u64) -> Self {
        self.config.network.probe_backoff_ms = ms;
        self
    }

    pub fn network_refresh_interval_secs(mut self, secs: u64) -> Self {
        self.config.network.refresh_interval_secs = secs;
        self
    }

    // --- storage ---

    pub fn lock_timeout_ms(mut self, ms: u64) -> Self {
        self.config.storage.lock_timeout_ms = ms;
        self
    }

    pub fn write_max_attempts(mut self, attempts: u32) -> Self {
        self.config.storage.write_max_attempts = attempts;
        self
    }

    pub fn write_backoff_ms(mut self, base: u64, max: u64) -> Self {
        self.config.storage.write_base_backoff_ms = base;
        self.config.storage.write_max_backoff_ms = max;
        self
    }

    pub fn dedup_window_ms(mut self, ms: u64) -> Self {
        self.config.storage.dedup_window_ms = ms;
        self
    }

    pub fn min_valid_file_size(mut self, bytes: u64) -> Self {
        self.config.storage.min_valid_file_size = bytes;
        self
    }

    pub fn obfuscate(mut self, enabled: bool) -> Self {
        self.config.storage.obfuscate = enabled;
        self
    }

    pub fn obfuscation_key(mut self, key: impl Into<String>) -> Self {
        self.config.storage.obfuscation_key = key.into();
        self
    }

    // --- backup ---

    pub fn backup_retention_days(mut self, days: u32) -> Self {
        self.config.backup.retention_days = days;
        self
    }

    pub fn backup_retention(mut self, medium: usize, high: usize) -> Self {
        self.config.backup.medium_retention = medium;
        self.config.backup.high_retention = high;
        self
    }

    // --- sync ---

    pub fn sync_max_retries(mut self, retries: u32) -> Self {
        self.config.sync.max_retries = retries;
        self
    }

    pub fn sync_retry_delay_secs(mut self, base: u64, max: u64) -> Self {
        self.config.sync.retry_base_delay_secs = base;
        self.config.sync.retry_max_delay_secs = max;
        self
    }

    pub fn sync_retry_sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sync.retry_sweep_interval_secs = secs;
        self
    }

    pub fn sync_cleanup(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.config.sync.cleanup_attempts = attempts;
        self.config.sync.cleanup_delay_ms = delay_ms;
        self
    }

    pub fn stale_entry_secs(mut self, secs: u64) -> Self {
        self.config.sync.stale_entry_secs = secs;
        self
    }

    pub fn shutdown_timeout_secs(mut self, secs: u64) -> Self {
        self.config.sync.shutdown_timeout_secs = secs;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: LogFormat) -> Self {
        self.config.logging.format = format;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert!(cfg.paths.network_root.is_none());
        assert_eq!(cfg.paths.backup_dir_name, "backup");
        assert_eq!(cfg.network.probe_attempts, 3);
        assert_eq!(cfg.network.probe_backoff(), Duration::from_secs(1));
        assert_eq!(cfg.network.refresh_interval(), Duration::from_secs(600));
        assert_eq!(cfg.storage.lock_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.storage.write_max_attempts, 3);
        assert_eq!(cfg.storage.write_base_backoff(), Duration::from_millis(500));
        assert_eq!(cfg.storage.write_max_backoff(), Duration::from_millis(3000));
        assert_eq!(cfg.storage.dedup_window(), Duration::from_secs(1));
        assert_eq!(cfg.storage.min_valid_file_size, 2);
        assert!(cfg.storage.obfuscate);
        assert_eq!(cfg.backup.retention_days, 30);
        assert_eq!(cfg.backup.cleanup_interval(), Duration::from_secs(86_400));
        assert_eq!(cfg.backup.medium_retention, 5);
        assert_eq!(cfg.backup.high_retention, 10);
        assert_eq!(cfg.sync.max_retries, 3);
        assert_eq!(cfg.sync.retry_max_delay(), Duration::from_secs(3600));
        assert_eq!(cfg.sync.cleanup_attempts, 3);
        assert_eq!(cfg.sync.cleanup_delay(), Duration::from_millis(200));
        assert_eq!(cfg.sync.shutdown_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    #[test]
    fn backup_root_is_under_local_root() {
        let cfg = ConfigBuilder::new()
            .local_root(PathBuf::from("/opt/ws"))
            .backup_dir_name("bk")
            .build();
        assert_eq!(cfg.backup_root(), PathBuf::from("/opt/ws/bk"));
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
paths:
  local_root: /tmp/ws-local
  network_root: /mnt/share/ws
network:
  probe_attempts: 5
storage:
  dedup_window_ms: 0
  obfuscate: false
backup:
  high_retention: 20
sync:
  max_retries: 7
logging:
  level: debug
  format: json
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.paths.local_root, PathBuf::from("/tmp/ws-local"));
        assert_eq!(cfg.paths.network_root, Some(PathBuf::from("/mnt/share/ws")));
        assert_eq!(cfg.network.probe_attempts, 5);
        assert_eq!(cfg.storage.dedup_window_ms, 0);
        assert!(!cfg.storage.obfuscate);
        assert_eq!(cfg.backup.high_retention, 20);
        assert_eq!(cfg.sync.max_retries, 7);
        assert_eq!(cfg.logging.format, LogFormat::Json);

        // Omitted fields keep defaults
        assert_eq!(cfg.paths.backup_dir_name, "backup");
        assert_eq!(cfg.storage.lock_timeout_ms, 5000);
        assert_eq!(cfg.backup.medium_retention, 5);
    }

    #[test]
    fn load_or_default_falls_back_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/worksync.yaml"));
        assert_eq!(cfg.storage.write_max_attempts, 3);
    }

    #[test]
    fn load_rejects_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"storage: [not, a, map]").unwrap();
        tmp.flush().unwrap();
        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let cfg = ConfigBuilder::new()
            .local_root(dir.path().join("local"))
            .sync_max_retries(9)
            .build();
        cfg.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.paths.local_root, dir.path().join("local"));
        assert_eq!(loaded.sync.max_retries, 9);
    }

    #[test]
    fn default_path_ends_with_worksync_config() {
        let path = Config::default_path();
        assert!(path.ends_with("worksync/config.yaml"));
    }

    // -- Validation --

    #[test]
    fn validate_reports_every_error() {
        let cfg = ConfigBuilder::new()
            .lock_timeout_ms(0)
            .write_backoff_ms(5000, 1000)
            .backup_retention(0, 10)
            .logging_level("loud")
            .build();
        let fields: Vec<_> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"storage.lock_timeout_ms".to_string()));
        assert!(fields.contains(&"storage.write_base_backoff_ms".to_string()));
        assert!(fields.contains(&"backup.medium_retention".to_string()));
        assert!(fields.contains(&"logging.level".to_string()));
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn validate_rejects_same_local_and_network_root() {
        let cfg = ConfigBuilder::new()
            .local_root(PathBuf::from("/data"))
            .network_root(PathBuf::from("/data"))
            .build();
        let errors = cfg.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "paths.network_root");
    }

    #[test]
    fn validate_requires_key_when_obfuscating() {
        let cfg = ConfigBuilder::new().obfuscation_key("").build();
        assert_eq!(cfg.validate()[0].field, "storage.obfuscation_key");

        let cfg = ConfigBuilder::new().obfuscate(false).obfuscation_key("").build();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn build_validated_returns_errors() {
        let result = ConfigBuilder::new().backup_dir_name("a/b").build_validated();
        let errors = result.unwrap_err();
        assert_eq!(errors[0].field, "paths.backup_dir_name");
        assert!(errors[0].to_string().starts_with("paths.backup_dir_name: "));
    }
}
