mod support;

use cryptstore_storage::{MemoryStorage, Storage};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn store_load_delete() {
    support::store_load_delete(&MemoryStorage::new()).await;
}

#[tokio::test]
async fn missing_keys_are_not_found() {
    support::missing_keys_are_not_found(&MemoryStorage::new()).await;
}

#[tokio::test]
async fn invalid_keys_are_rejected() {
    support::invalid_keys_are_rejected(&MemoryStorage::new()).await;
}

#[tokio::test]
async fn listing() {
    support::listing(&MemoryStorage::new()).await;
}

#[tokio::test]
async fn stat_values_and_prefixes() {
    support::stat_values_and_prefixes(&MemoryStorage::new()).await;
}

#[tokio::test]
async fn lock_unlock() {
    support::lock_unlock(&MemoryStorage::new()).await;
}

#[tokio::test]
async fn deleting_a_prefix_removes_children() {
    let storage = MemoryStorage::new();
    storage.store("site/a", b"1").await.unwrap();
    storage.store("site/b", b"2").await.unwrap();
    storage.delete("site").await.unwrap();
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn waiter_acquires_lock_after_release() {
    let storage = Arc::new(MemoryStorage::new());
    storage.lock("renew").await.unwrap();

    let contender = {
        let storage = Arc::clone(&storage);
        tokio::spawn(async move {
            storage.lock("renew").await.unwrap();
            storage.unlock("renew").await.unwrap();
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!contender.is_finished());

    storage.unlock("renew").await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), contender)
        .await
        .expect("waiter should wake on unlock")
        .unwrap();
}
