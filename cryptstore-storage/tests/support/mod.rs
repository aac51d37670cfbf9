//! Behavior every backend must share.

use cryptstore_storage::{Storage, StorageError};
use pretty_assertions::assert_eq;

pub async fn store_load_delete(storage: &dyn Storage) {
    assert!(!storage.exists("certs/example.com/cert.pem").await);

    storage
        .store("certs/example.com/cert.pem", b"-----BEGIN CERTIFICATE-----")
        .await
        .unwrap();
    assert!(storage.exists("certs/example.com/cert.pem").await);
    assert_eq!(
        storage.load("certs/example.com/cert.pem").await.unwrap(),
        b"-----BEGIN CERTIFICATE-----"
    );

    storage.store("certs/example.com/cert.pem", b"renewed").await.unwrap();
    assert_eq!(storage.load("certs/example.com/cert.pem").await.unwrap(), b"renewed");

    storage.delete("certs/example.com/cert.pem").await.unwrap();
    assert!(!storage.exists("certs/example.com/cert.pem").await);
}

pub async fn missing_keys_are_not_found(storage: &dyn Storage) {
    assert!(matches!(
        storage.load("nope").await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        storage.stat("nope").await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        storage.delete("nope").await,
        Err(StorageError::NotFound(_))
    ));
}

pub async fn invalid_keys_are_rejected(storage: &dyn Storage) {
    for key in ["", "/abs", "a/../b"] {
        assert!(
            matches!(
                storage.store(key, b"x").await,
                Err(StorageError::InvalidKey { .. })
            ),
            "{key:?}"
        );
        assert!(!storage.exists(key).await);
    }
}

pub async fn listing(storage: &dyn Storage) {
    storage.store("acme/a.example/cert", b"1").await.unwrap();
    storage.store("acme/a.example/key", b"2").await.unwrap();
    storage.store("acme/b.example/cert", b"3").await.unwrap();
    storage.store("acme/index", b"4").await.unwrap();

    assert_eq!(
        storage.list("acme", false).await.unwrap(),
        vec!["acme/a.example", "acme/b.example", "acme/index"]
    );
    assert_eq!(
        storage.list("acme", true).await.unwrap(),
        vec![
            "acme/a.example/cert",
            "acme/a.example/key",
            "acme/b.example/cert",
            "acme/index"
        ]
    );
    assert!(storage.list("missing", false).await.is_err());
}

pub async fn stat_values_and_prefixes(storage: &dyn Storage) {
    storage.store("stat/dir/value", b"12345").await.unwrap();

    let info = storage.stat("stat/dir/value").await.unwrap();
    assert_eq!(info.key, "stat/dir/value");
    assert_eq!(info.size, 5);
    assert!(info.is_terminal);

    let info = storage.stat("stat/dir").await.unwrap();
    assert!(!info.is_terminal);
}

pub async fn lock_unlock(storage: &dyn Storage) {
    storage.lock("issue_cert_example.com").await.unwrap();
    storage.unlock("issue_cert_example.com").await.unwrap();
    assert!(matches!(
        storage.unlock("issue_cert_example.com").await,
        Err(StorageError::Lock(_))
    ));
}
