//! Bidirectional resolution and queued retries against real directories.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use worksync_core::config::ConfigBuilder;
use worksync_core::domain::{FilePath, SyncDirection, SyncKey, SyncState};
use worksync_store::{FileTransaction, StoreContext, WriteOptions};
use worksync_sync::{SyncOutcome, SyncService};

struct Fixture {
    _dir: TempDir,
    local: PathBuf,
    network: PathBuf,
    service: SyncService,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("local/data.json");
    let network = dir.path().join("share/data.json");
    std::fs::create_dir_all(local.parent().unwrap()).unwrap();
    std::fs::create_dir_all(network.parent().unwrap()).unwrap();

    let ctx = StoreContext::new(ConfigBuilder::new().local_root(dir.path().join("local")).build());
    let service = SyncService::from_context(&ctx);
    Fixture {
        _dir: dir,
        local,
        network,
        service,
    }
}

fn write_aged(path: &Path, content: &[u8], age: Duration) -> SystemTime {
    std::fs::write(path, content).unwrap();
    let at = SystemTime::now() - age;
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(at)
        .unwrap();
    std::fs::metadata(path).unwrap().modified().unwrap()
}

#[tokio::test]
async fn identical_content_with_different_mtimes_copies_nothing() {
    let f = fixture();
    write_aged(&f.local, b"{\"a\":1}", Duration::from_secs(10));
    let network_mtime = write_aged(&f.network, b"{\"a\":1}", Duration::from_secs(3600));

    let outcome = f.service.sync_bidirectional(&f.local, &f.network).await.unwrap();
    assert_eq!(outcome, SyncOutcome::InSync);
    assert_eq!(
        std::fs::metadata(&f.network).unwrap().modified().unwrap(),
        network_mtime
    );
}

#[tokio::test]
async fn newer_local_is_copied_to_network() {
    let f = fixture();
    write_aged(&f.local, b"{\"v\":\"new\"}", Duration::from_secs(5));
    write_aged(&f.network, b"{\"v\":\"old\"}", Duration::from_secs(3600));

    let outcome = f.service.sync_bidirectional(&f.local, &f.network).await.unwrap();
    assert_eq!(outcome, SyncOutcome::CopiedToNetwork);
    assert_eq!(std::fs::read(&f.network).unwrap(), b"{\"v\":\"new\"}");
    assert_eq!(std::fs::read(&f.local).unwrap(), b"{\"v\":\"new\"}");
}

#[tokio::test]
async fn newer_network_is_copied_to_local() {
    let f = fixture();
    write_aged(&f.local, b"{\"v\":\"old\"}", Duration::from_secs(3600));
    write_aged(&f.network, b"{\"v\":\"new\"}", Duration::from_secs(5));

    let outcome = f.service.sync_bidirectional(&f.local, &f.network).await.unwrap();
    assert_eq!(outcome, SyncOutcome::CopiedToLocal);
    assert_eq!(std::fs::read(&f.local).unwrap(), b"{\"v\":\"new\"}");

    // a second pass finds the pair in sync
    let again = f.service.sync_bidirectional(&f.local, &f.network).await.unwrap();
    assert_eq!(again, SyncOutcome::InSync);
}

#[tokio::test]
async fn offline_sync_is_queued_and_retried_when_share_returns() {
    let dir = TempDir::new().unwrap();
    let share = dir.path().join("share");
    let ctx = StoreContext::new(
        ConfigBuilder::new()
            .local_root(dir.path().join("local"))
            .network_root(share.clone())
            .probe_attempts(1)
            .probe_backoff_ms(0)
            .build(),
    );
    let service = Arc::new(SyncService::from_context(&ctx));
    let file = FilePath::users();
    let local = ctx.resolver.local_path(&file);
    std::fs::create_dir_all(local.parent().unwrap()).unwrap();
    std::fs::write(&local, b"[\"ana\"]").unwrap();

    let result = service
        .spawn_sync_file(file.clone(), SyncDirection::ToNetwork)
        .await
        .unwrap();
    assert!(result.is_success());
    assert_eq!(result.path(), Some(local.as_path()));

    let network = share.join("login/users.json");
    let key = SyncKey::new(&local, &network);
    assert!(service.statuses().get(&key).unwrap().is_pending());

    // still offline: nothing attempted
    let report = service.retry_pending().await;
    assert_eq!(report.offline, 1);
    assert_eq!(report.attempted, 0);

    std::fs::create_dir_all(&share).unwrap();
    assert!(ctx.network.refresh().await);

    let report = service.retry_pending().await;
    assert_eq!(report.attempted, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(std::fs::read(&network).unwrap(), b"[\"ana\"]");
    assert_eq!(
        service.statuses().get(&key).unwrap().state(),
        SyncState::Idle
    );
}

fn online_store(dir: &TempDir) -> StoreContext {
    let share = dir.path().join("share");
    std::fs::create_dir_all(&share).unwrap();
    StoreContext::new(
        ConfigBuilder::new()
            .local_root(dir.path().join("local"))
            .network_root(share)
            .probe_attempts(1)
            .probe_backoff_ms(0)
            .build(),
    )
}

#[tokio::test]
async fn committed_transaction_replicates_queued_files() {
    let dir = TempDir::new().unwrap();
    let ctx = online_store(&dir);
    assert!(ctx.network.refresh().await);
    let service = SyncService::from_context(&ctx);

    let file = FilePath::admin_bonus(2024, 5).unwrap();
    let mut tx = FileTransaction::new();
    tx.add_write(file.clone(), &[10, 20], WriteOptions::new()).unwrap();
    tx.add_sync(file.clone());

    let outcome = service.commit_transaction(tx, &ctx.writer).await;
    assert!(outcome.result.is_success());
    assert_eq!(outcome.syncs, vec![file.clone()]);

    let local = ctx.resolver.local_path(&file);
    let network = dir.path().join("share/admin/bonus/admin_bonus_2024_05.json");
    assert_eq!(std::fs::read(&network).unwrap(), std::fs::read(&local).unwrap());
    assert!(service.statuses().pending().is_empty());
}

#[tokio::test]
async fn rolled_back_transaction_leaves_share_untouched() {
    let dir = TempDir::new().unwrap();
    let ctx = online_store(&dir);
    assert!(ctx.network.refresh().await);
    let service = SyncService::from_context(&ctx);

    let file = FilePath::admin_bonus(2024, 6).unwrap();
    let blocked = FilePath::admin_worktime(2024, 6).unwrap();
    let blocked_path = ctx.resolver.local_path(&blocked);
    std::fs::create_dir_all(blocked_path.join("inner")).unwrap();

    let mut tx = FileTransaction::new();
    tx.add_write(file.clone(), &[1], WriteOptions::new()).unwrap();
    tx.add_write(blocked, &[2], WriteOptions::new()).unwrap();
    tx.add_sync(file.clone());

    let outcome = service.commit_transaction(tx, &ctx.writer).await;
    assert!(outcome.result.is_failure());
    assert!(outcome.syncs.is_empty());
    assert!(!ctx.resolver.local_path(&file).exists());
    assert!(!dir.path().join("share/admin/bonus/admin_bonus_2024_06.json").exists());
    assert!(service.statuses().is_empty());
}

#[tokio::test]
async fn background_copies_report_through_join_handles() {
    let f = fixture();
    let service = Arc::new(f.service);
    write_aged(&f.local, b"{\"v\":1}", Duration::from_secs(60));

    let pushed = service
        .spawn_sync_to_network(f.local.clone(), f.network.clone())
        .await
        .unwrap();
    assert!(pushed.is_success());
    assert_eq!(std::fs::read(&f.network).unwrap(), b"{\"v\":1}");

    write_aged(&f.network, b"{\"v\":2}", Duration::from_secs(30));
    let pulled = service
        .spawn_sync_to_local(f.network.clone(), f.local.clone())
        .await
        .unwrap();
    assert!(pulled.is_success());
    assert_eq!(std::fs::read(&f.local).unwrap(), b"{\"v\":2}");

    let outcome = service
        .spawn_sync_bidirectional(f.local.clone(), f.network.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, SyncOutcome::InSync);
}
