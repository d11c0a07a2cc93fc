//! WorkSync Daemon - Background replication and maintenance
//!
//! This binary runs as a user service and handles:
//! - Creating the local (and, when reachable, network) directory layout
//! - Reactive backups after every successful write
//! - Periodic network probing, sync retries and backup cleanup
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon builds one `StoreContext`, starts the backup listener and the
//! scheduler, then waits on a `CancellationToken` that is triggered on receipt
//! of SIGTERM or SIGINT. Scheduled tasks get a bounded time to finish.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use worksync_core::config::{Config, LogFormat};
use worksync_store::StoreContext;
use worksync_sync::{ScheduleConfig, Scheduler, SyncService};

/// Environment variable overriding the configuration file location
const CONFIG_ENV: &str = "WORKSYNC_CONFIG";

struct DaemonService {
    ctx: Arc<StoreContext>,
    sync: Arc<SyncService>,
    shutdown: CancellationToken,
}

impl DaemonService {
    fn new(config: Config, shutdown: CancellationToken) -> Self {
        let ctx = Arc::new(StoreContext::new(config));
        let sync = Arc::new(SyncService::from_context(&ctx));
        Self {
            ctx,
            sync,
            shutdown,
        }
    }

    /// Runs until the shutdown token fires
    async fn run(&self) -> Result<()> {
        let layout = self.ctx.resolver.ensure_directories().await;
        if let Some(message) = layout.message() {
            // Each operation reports its own I/O failures later on.
            error!(
                local_root = %self.ctx.resolver.local_root().display(),
                error = message,
                cause = layout.cause().unwrap_or_default(),
                "cannot prepare local storage, continuing"
            );
        }

        let available = self.ctx.network.refresh().await;
        match self.ctx.resolver.network_root() {
            Some(root) if available => {
                info!(network_root = %root.display(), "network storage available")
            }
            Some(root) => warn!(
                network_root = %root.display(),
                "network storage unreachable, running local-only"
            ),
            None => info!("no network root configured, running local-only"),
        }

        let listener = self.ctx.start_backup_listener(self.shutdown.child_token());
        let scheduler = Scheduler::start(
            Arc::clone(&self.ctx),
            Arc::clone(&self.sync),
            ScheduleConfig::from_config(&self.ctx.config),
        );
        info!(tasks = ?scheduler.task_names(), "daemon running");

        self.shutdown.cancelled().await;
        info!("shutting down");

        if !scheduler.shutdown().await {
            warn!("some scheduled tasks were aborted");
        }
        if let Err(e) = listener.await {
            warn!(error = %e, "backup listener ended abnormally");
        }

        let pending = self.sync.statuses().pending().len();
        if pending > 0 {
            warn!(pending, "pending syncs left for the next start");
        }
        Ok(())
    }
}

fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

fn load_config(path: &std::path::Path) -> Result<Config> {
    let config = if path.exists() {
        Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?
    } else {
        Config::default()
    };

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!(field = %e.field, message = %e.message, "invalid configuration");
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }
    Ok(config)
}

fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init(),
    }
}

/// Waits for SIGINT or SIGTERM, then cancels `token`
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path();
    let config = load_config(&config_path)?;
    init_tracing(&config);

    info!(config_path = %config_path.display(), "WorkSync daemon starting (worksyncd)");

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token);
    let result = service.run().await;

    match &result {
        Ok(()) => info!("WorkSync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "WorkSync daemon exiting with error"),
    }

    result
}
