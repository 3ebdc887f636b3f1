//! Integration tests for opening, bootstrapping and closing the store.

use std::time::{Duration, Instant};

use sandq::config::DatabaseConfig;
use sandq::db::Backend;
use sandq::model::TaskOptions;
use sandq::{Error, Store};
use sqlx::Connection;

#[tokio::test]
async fn opens_default_file_under_root() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        root: dir.path().join("sandq"),
        ..DatabaseConfig::default()
    };

    let store = Store::open(None, &config).await.unwrap();
    assert_eq!(store.backend(), Backend::Sqlite);
    assert!(store.health_check().await.is_ok());
    assert!(dir.path().join("sandq").join("db").join("sandq.db").exists());
    store.close().await;
}

#[tokio::test]
async fn reopening_keeps_schema_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("queue.db").display());

    let store = Store::connect(&url).await.unwrap();
    let id = store
        .enqueue_url("http://example.com/a", &TaskOptions::new())
        .await
        .unwrap();
    store.close().await;

    let store = Store::connect(&url).await.unwrap();
    let task = store.get_task(id).await.unwrap().expect("task persisted");
    assert_eq!(task.target, "http://example.com/a");
    store.close().await;
}

#[tokio::test]
async fn explicit_dsn_overrides_config() {
    let dir = tempfile::tempdir().unwrap();
    let explicit = dir.path().join("explicit.db");
    let config = DatabaseConfig {
        root: dir.path().join("unused-root"),
        ..DatabaseConfig::default()
    };

    let store = Store::open(Some(explicit.to_str().unwrap()), &config)
        .await
        .unwrap();
    assert!(explicit.exists());
    assert!(!dir.path().join("unused-root").exists());
    store.close().await;
}

#[tokio::test]
async fn unknown_scheme_fails_with_config_error() {
    let err = Store::connect("mysql://root@localhost/queue").await.unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_medium_fails_with_init_error() {
    let dir = tempfile::tempdir().unwrap();
    // Read-only open of a file that does not exist.
    let url = format!("sqlite://{}?mode=ro", dir.path().join("missing.db").display());
    let err = Store::connect(&url).await.unwrap_err();
    assert!(matches!(err, Error::StoreInit(_)), "got {err:?}");
}

#[tokio::test]
async fn close_is_idempotent() {
    let store = Store::connect(":memory:").await.unwrap();
    assert!(!store.is_closed());
    store.close().await;
    store.close().await;
    assert!(store.is_closed());
}

#[tokio::test]
async fn in_memory_store_works_end_to_end() {
    let store = Store::connect(":memory:").await.unwrap();
    let id = store
        .enqueue_url("http://example.com", &TaskOptions::new())
        .await
        .unwrap();
    let claimed = store.claim_next().await.unwrap().expect("one task");
    assert_eq!(claimed.id, id);
    store.close().await;
}

#[tokio::test]
async fn locked_database_reports_busy_within_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("locked.db").display());
    let config = DatabaseConfig {
        timeout: 1,
        ..DatabaseConfig::default()
    };
    let store = Store::open(Some(&url), &config).await.unwrap();
    let id = store
        .enqueue_url("http://example.com/queued", &TaskOptions::new())
        .await
        .unwrap();

    // Another writer holds the database lock.
    let mut locker = sqlx::SqliteConnection::connect(&url).await.unwrap();
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut locker)
        .await
        .unwrap();

    let err = store
        .enqueue_url("http://example.com/blocked", &TaskOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Busy(_)), "got {err:?}");
    assert!(err.is_transient());

    let started = Instant::now();
    let err = store.claim_next().await.unwrap_err();
    assert!(matches!(err, Error::Busy(_)), "got {err:?}");
    assert!(err.is_transient());
    assert!(
        started.elapsed() < Duration::from_secs(4),
        "claim waited {:?}",
        started.elapsed()
    );

    sqlx::query("ROLLBACK").execute(&mut locker).await.unwrap();
    locker.close().await.unwrap();

    let claimed = store.claim_next().await.unwrap().expect("task still pending");
    assert_eq!(claimed.id, id);
    assert_eq!(store.count_tasks(None).await.unwrap(), 1);
    store.close().await;
}
