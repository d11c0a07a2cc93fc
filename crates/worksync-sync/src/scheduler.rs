//! Periodic background work
//!
//! ```text
//!               ┌── network-refresh  (10 min)  NetworkMonitor::refresh
//!               ├── retry-sweep      (60 s)    SyncService::retry_pending
//! Scheduler ────┤
//!               ├── backup-cleanup   (24 h)    BackupManager::cleanup_old_backups
//!               └── stale-cleanup    (30 min)  locks, statuses, dedup window
//! ```
//!
//! Every loop is a `tokio::time::interval` raced against a shared
//! [`CancellationToken`]. The first tick is skipped so nothing runs at start.
//! A job that already started runs to completion.
//! [`Scheduler::shutdown`] cancels the token and waits for the loops up to a
//! deadline, then aborts whatever is still running.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use worksync_core::config::Config;
use worksync_store::StoreContext;

use crate::service::SyncService;

const STALE_CLEANUP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Intervals for each scheduled task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub network_refresh: Duration,
    pub retry_sweep: Duration,
    pub backup_cleanup: Duration,
    pub stale_cleanup: Duration,
    /// Age after which idle locks and statuses are evicted
    pub stale_age: Duration,
    pub backup_retention_days: u32,
    pub shutdown_timeout: Duration,
}

impl ScheduleConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            network_refresh: config.network.refresh_interval(),
            retry_sweep: config.sync.retry_sweep_interval(),
            backup_cleanup: config.backup.cleanup_interval(),
            stale_cleanup: STALE_CLEANUP_INTERVAL,
            stale_age: config.sync.stale_entry_age(),
            backup_retention_days: config.backup.retention_days,
            shutdown_timeout: config.sync.shutdown_timeout(),
        }
    }
}

/// Handle to the running periodic tasks
pub struct Scheduler {
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    shutdown_timeout: Duration,
}

impl Scheduler {
    /// Spawns all periodic tasks. Must be called inside a tokio runtime.
    pub fn start(ctx: Arc<StoreContext>, sync: Arc<SyncService>, config: ScheduleConfig) -> Self {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(4);

        let network = Arc::clone(&ctx.network);
        tasks.push((
            "network-refresh",
            spawn_periodic("network-refresh", config.network_refresh, cancel.clone(), move || {
                let network = Arc::clone(&network);
                async move {
                    let available = network.refresh().await;
                    debug!(available, "network probe refreshed");
                }
            }),
        ));

        let retry = Arc::clone(&sync);
        tasks.push((
            "retry-sweep",
            spawn_periodic("retry-sweep", config.retry_sweep, cancel.clone(), move || {
                let retry = Arc::clone(&retry);
                async move {
                    let report = retry.retry_pending().await;
                    if !report.is_empty() {
                        debug!(?report, "retry sweep");
                    }
                }
            }),
        ));

        let backups = Arc::clone(&ctx.backups);
        let retention_days = config.backup_retention_days;
        tasks.push((
            "backup-cleanup",
            spawn_periodic("backup-cleanup", config.backup_cleanup, cancel.clone(), move || {
                let backups = Arc::clone(&backups);
                async move {
                    let report = backups.cleanup_old_backups(retention_days).await;
                    info!(
                        deleted = report.deleted,
                        errors = report.errors.len(),
                        "backup cleanup finished"
                    );
                }
            }),
        ));

        let stale_ctx = Arc::clone(&ctx);
        let statuses = Arc::clone(sync.statuses());
        let stale_age = config.stale_age;
        let policy = *sync.policy();
        tasks.push((
            "stale-cleanup",
            spawn_periodic("stale-cleanup", config.stale_cleanup, cancel.clone(), move || {
                let ctx = Arc::clone(&stale_ctx);
                let statuses = Arc::clone(&statuses);
                async move {
                    let locks = ctx.locks.cleanup_stale(stale_age);
                    let statuses = statuses.cleanup_stale(stale_age, &policy);
                    let dedup = ctx.writer.prune_dedup();
                    debug!(locks, statuses, dedup, "stale entries removed");
                }
            }),
        ));

        info!(tasks = tasks.len(), "scheduler started");
        Self {
            cancel,
            tasks,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Token cancelled on shutdown. Other tasks may share it.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Stops every task. Returns `false` if any had to be aborted.
    pub async fn shutdown(self) -> bool {
        self.cancel.cancel();
        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        let mut clean = true;

        for (name, mut handle) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => debug!(task = name, "task stopped"),
                Ok(Err(e)) => {
                    warn!(task = name, error = %e, "task ended abnormally");
                    clean = false;
                }
                Err(_) => {
                    warn!(task = name, "task did not stop in time, aborting");
                    handle.abort();
                    clean = false;
                }
            }
        }

        info!(clean, "scheduler stopped");
        clean
    }
}

/// Runs `job` every `period` until `cancel` fires
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        debug!(task = name, period_ms = period.as_millis() as u64, "periodic task started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => job().await,
            }
        }
        debug!(task = name, "periodic task stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;
    use worksync_core::config::ConfigBuilder;
    use worksync_core::domain::{SyncDirection, SyncKey, SyncState};

    use super::*;

    fn fast_schedule() -> ScheduleConfig {
        ScheduleConfig {
            network_refresh: Duration::from_millis(20),
            retry_sweep: Duration::from_millis(20),
            backup_cleanup: Duration::from_millis(20),
            stale_cleanup: Duration::from_millis(20),
            stale_age: Duration::from_secs(3600),
            backup_retention_days: 30,
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_schedule_from_default_config() {
        let schedule = ScheduleConfig::from_config(&Config::default());
        assert_eq!(schedule.network_refresh, Duration::from_secs(600));
        assert_eq!(schedule.retry_sweep, Duration::from_secs(60));
        assert_eq!(schedule.backup_cleanup, Duration::from_secs(24 * 3600));
        assert_eq!(schedule.stale_cleanup, Duration::from_secs(1800));
        assert_eq!(schedule.shutdown_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_periodic_runs_until_cancelled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let counter = Arc::clone(&runs);
        let handle = spawn_periodic("count", Duration::from_millis(5), cancel.clone(), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        handle.await.unwrap();

        let seen = runs.load(Ordering::SeqCst);
        assert!(seen >= 2, "ran {seen} times");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stuck_job() {
        let cancel = CancellationToken::new();
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let scheduler = Scheduler {
            cancel,
            tasks: vec![("stuck", stuck)],
            shutdown_timeout: Duration::from_millis(30),
        };
        assert!(!scheduler.shutdown().await);
    }

    #[tokio::test]
    async fn test_retry_sweep_drains_pending_pair() {
        let dir = TempDir::new().unwrap();
        let network_root = dir.path().join("net");
        std::fs::create_dir_all(&network_root).unwrap();
        let config = ConfigBuilder::new()
            .local_root(dir.path().join("local"))
            .network_root(network_root.clone())
            .probe_attempts(1)
            .probe_backoff_ms(0)
            .build();
        let ctx = Arc::new(StoreContext::new(config));
        let sync = Arc::new(SyncService::from_context(&ctx));

        let local = dir.path().join("local/a.json");
        let network = network_root.join("a.json");
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(&local, b"[1]").unwrap();
        let key = SyncKey::new(&local, &network);
        sync.statuses().mark_pending(&key, SyncDirection::ToNetwork);

        let scheduler = Scheduler::start(Arc::clone(&ctx), Arc::clone(&sync), fast_schedule());
        assert_eq!(scheduler.task_names().len(), 4);

        let synced = || {
            sync.statuses()
                .get(&key)
                .is_some_and(|s| s.state() == SyncState::Idle)
        };
        for _ in 0..100 {
            if synced() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(scheduler.shutdown().await);
        assert_eq!(std::fs::read(&network).unwrap(), b"[1]");
        assert!(synced());
    }
}
