//! Guest tracking tests.

use sandq::model::*;
use sandq::{Error, Store};
use tempfile::TempDir;

async fn test_store() -> (Store, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("guests.db").display());
    let store = Store::connect(&url).await.expect("failed to open store");
    (store, dir)
}

async fn queued_task(store: &Store) -> TaskId {
    store
        .enqueue_url("http://example.com/guest", &TaskOptions::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn start_guest_links_the_task() {
    let (store, _dir) = test_store().await;
    let task_id = queued_task(&store).await;

    let guest_id = store
        .start_guest(task_id, "cuckoo1", "win7-x86", "virtualbox")
        .await
        .unwrap();

    let guest = store.get_guest(guest_id).await.unwrap().unwrap();
    assert_eq!(guest.name, "cuckoo1");
    assert_eq!(guest.label, "win7-x86");
    assert_eq!(guest.manager, "virtualbox");
    assert_eq!(guest.task_id, task_id);
    assert!(guest.shutdown_on.is_none());

    let task = store.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.guest_id, Some(guest_id));

    let by_task = store.guest_for_task(task_id).await.unwrap().unwrap();
    assert_eq!(by_task, guest);
}

#[tokio::test]
async fn second_guest_for_a_task_conflicts() {
    let (store, _dir) = test_store().await;
    let task_id = queued_task(&store).await;

    let first = store
        .start_guest(task_id, "cuckoo1", "win7", "kvm")
        .await
        .unwrap();
    let err = store
        .start_guest(task_id, "cuckoo2", "win10", "kvm")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Conflict(_)), "got {err:?}");
    assert!(!err.is_transient());

    let guest = store.guest_for_task(task_id).await.unwrap().unwrap();
    assert_eq!(guest.id, first);
    assert_eq!(guest.name, "cuckoo1");
}

#[tokio::test]
async fn guest_for_missing_task_is_not_found() {
    let (store, _dir) = test_store().await;

    let err = store
        .start_guest(TaskId(77), "cuckoo1", "win7", "kvm")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
    assert!(store.guest_for_task(TaskId(77)).await.unwrap().is_none());
}

#[tokio::test]
async fn stop_guest_stamps_shutdown_once() {
    let (store, _dir) = test_store().await;
    let task_id = queued_task(&store).await;
    let guest_id = store
        .start_guest(task_id, "cuckoo1", "win7", "kvm")
        .await
        .unwrap();

    store.stop_guest(guest_id).await.unwrap();
    let stopped = store.get_guest(guest_id).await.unwrap().unwrap();
    let shutdown_on = stopped.shutdown_on.expect("shutdown_on set");
    assert!(shutdown_on >= stopped.started_on);

    store.stop_guest(guest_id).await.unwrap();
    let again = store.get_guest(guest_id).await.unwrap().unwrap();
    assert_eq!(again.shutdown_on, Some(shutdown_on));
}

#[tokio::test]
async fn stopping_an_unknown_guest_is_ignored() {
    let (store, _dir) = test_store().await;
    store.stop_guest(GuestId(12345)).await.unwrap();
    assert!(store.get_guest(GuestId(12345)).await.unwrap().is_none());
}
