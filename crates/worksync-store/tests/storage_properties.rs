//! End-to-end storage behaviour through a real `StoreContext`.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use worksync_core::config::{Config, ConfigBuilder};
use worksync_core::domain::{CriticalityLevel, FilePath, Locality};
use worksync_core::ports::FileEvent;
use worksync_store::{
    simple_backup_path, BackupListener, BackupScope, StoreContext, WriteOptions,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Worktime {
    user: String,
    days: Vec<u32>,
}

fn sample(n: u32) -> Worktime {
    Worktime {
        user: "ana".into(),
        days: vec![n, n + 1, n + 2],
    }
}

fn config(local: &Path) -> ConfigBuilder {
    ConfigBuilder::new()
        .local_root(local.to_path_buf())
        .dedup_window_ms(0)
        .probe_attempts(1)
        .probe_backoff_ms(0)
}

fn context(config: Config) -> StoreContext {
    StoreContext::new(config)
}

#[tokio::test]
async fn written_data_reads_back_equal() {
    let dir = TempDir::new().unwrap();
    let ctx = context(config(dir.path()).build());
    let file = FilePath::worktime("ana", 2024, 3).unwrap();

    let result = ctx.writer.write_file(&file, &sample(1), WriteOptions::new()).await;
    assert!(result.is_success(), "{result}");

    // obfuscated on disk
    let raw = std::fs::read(result.path().unwrap()).unwrap();
    assert!(serde_json::from_slice::<serde_json::Value>(&raw).is_err());

    let back: Option<Worktime> = ctx.reader.read_file(&file).await;
    assert_eq!(back, Some(sample(1)));
}

#[tokio::test]
async fn high_criticality_keeps_ten_newest_backups() {
    let dir = TempDir::new().unwrap();
    let ctx = context(config(dir.path()).build());
    let file = FilePath::register("ana", 7, 2024, 3).unwrap();
    let scope = BackupScope::from_file(&file);
    assert_eq!(file.criticality(), CriticalityLevel::High);

    let mut created = Vec::new();
    for i in 0..13 {
        let written = ctx.writer.write_file(&file, &sample(i), WriteOptions::new()).await;
        let path = written.path().unwrap().to_path_buf();
        let backup = ctx.backups.create_backup(&path, CriticalityLevel::High, &scope).await;
        created.push(backup.path().unwrap().to_path_buf());
    }

    let listed = ctx
        .backups
        .list_available_backups(
            &ctx.resolver.local_path(&file),
            CriticalityLevel::High,
            &scope,
        )
        .await;
    let timestamped: Vec<_> = listed.iter().filter(|e| e.timestamped).collect();
    assert_eq!(timestamped.len(), 10);

    assert!(created[..3].iter().all(|p| !p.exists()));
    assert!(created[3..].iter().all(|p| p.exists()));
    // newest first
    assert_eq!(timestamped[0].path, created[12]);
}

#[tokio::test]
async fn locked_file_is_retried_then_fails() {
    let dir = TempDir::new().unwrap();
    let ctx = context(
        config(dir.path())
            .lock_timeout_ms(40)
            .write_backoff_ms(10, 40)
            .build(),
    );
    let mut events = ctx.events.subscribe();
    let file = FilePath::admin_bonus(2024, 6).unwrap();
    let path = ctx.resolver.local_path(&file);

    let held = ctx.locks.write(&path).await.unwrap();
    let started = Instant::now();
    let result = ctx.writer.write_file(&file, &sample(1), WriteOptions::new()).await;
    let elapsed = started.elapsed();
    drop(held);

    assert!(result.is_failure());
    assert_eq!(result.message(), Some("write failed after 3 attempt(s)"));
    // three lock timeouts plus 10ms and 20ms of backoff
    assert!(elapsed >= Duration::from_millis(150), "elapsed {elapsed:?}");
    assert!(!path.exists());

    match events.recv().await.unwrap() {
        FileEvent::WriteFailed { path: p, .. } => assert_eq!(p, path),
        other => panic!("unexpected event {other:?}"),
    }

    // lock released: the next write goes through
    let retry = ctx.writer.write_file(&file, &sample(2), WriteOptions::new()).await;
    assert!(retry.is_success());
}

#[tokio::test]
async fn second_write_within_window_is_deduplicated() {
    let dir = TempDir::new().unwrap();
    let ctx = context(config(dir.path()).dedup_window_ms(1000).build());
    let mut events = ctx.events.subscribe();
    let file = FilePath::worktime("ana", 2024, 4).unwrap();

    let first = ctx.writer.write_file(&file, &sample(1), WriteOptions::new()).await;
    let second = ctx.writer.write_file(&file, &sample(2), WriteOptions::new()).await;
    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(first.path(), second.path());

    assert!(events.try_recv().unwrap().is_success());
    assert!(events.try_recv().is_err(), "second write must not touch disk");

    let stored: Option<Worktime> = ctx.reader.read_file(&file).await;
    assert_eq!(stored, Some(sample(1)));

    // another user is not affected
    let other = FilePath::worktime("bob", 2024, 4).unwrap();
    assert!(ctx.writer.write_file(&other, &sample(3), WriteOptions::new()).await.is_success());
    assert!(events.try_recv().is_ok());
}

#[tokio::test]
async fn unreachable_network_degrades_to_local() {
    let dir = TempDir::new().unwrap();
    let ctx = context(
        config(dir.path().join("local").as_path())
            .network_root(dir.path().join("share-that-is-not-mounted"))
            .build(),
    );
    let file = FilePath::users().with_locality(Locality::Network);

    assert!(!ctx.resolver.is_network_available().await);
    let resolved = ctx.resolver.resolve(&file).await;
    assert!(resolved.network.is_none());
    assert!(resolved.local.starts_with(dir.path().join("local")));

    let written = ctx.writer.write_file(&file, &vec!["ana"], WriteOptions::new()).await;
    assert_eq!(
        written.path(),
        Some(dir.path().join("local/login/users.json").as_path())
    );
}

#[tokio::test]
async fn zero_byte_primary_restores_last_good_backup() {
    let dir = TempDir::new().unwrap();
    let ctx = context(config(dir.path()).build());
    let listener = BackupListener::new(ctx.backups.clone());
    let mut events = ctx.events.subscribe();
    let file = FilePath::admin_worktime(2024, 2).unwrap();

    ctx.writer.write_file(&file, &sample(5), WriteOptions::new()).await;
    let event = events.recv().await.unwrap();
    assert!(listener.handle(&event).await.unwrap().is_success());

    let path = ctx.resolver.local_path(&file);
    std::fs::write(&path, b"").unwrap();
    assert!(simple_backup_path(&path).exists());

    // reads fall back transparently
    let via_reader: Option<Worktime> = ctx.reader.read_file(&file).await;
    assert_eq!(via_reader, Some(sample(5)));

    // explicit restore rewrites the primary
    let scope = BackupScope::from_file(&file);
    let restored = ctx
        .backups
        .restore_from_latest_backup(&path, file.criticality(), &scope)
        .await;
    assert!(restored.is_success());
    let after: Option<Worktime> = ctx.reader.read_file(&file).await;
    assert_eq!(after, Some(sample(5)));
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
}
