mod support;

use cryptstore::{
    EncryptedStorage, PayloadFormat, ProxyError, Registry, Storage, StorageConfig, StorageError,
};
use cryptstore_storage::{FileSystemConfig, FileSystemStorage, MemoryStorage};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use support::*;

#[tokio::test]
async fn file_system_round_trip_with_age() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let backend: Arc<dyn Storage> =
        Arc::new(FileSystemStorage::new(&FileSystemConfig::new(dir.path())).unwrap());
    let pair = AgePair::generate();
    let storage = proxy(backend.clone(), vec![group(vec![pair.full()])]);

    storage.store("cert.pem", b"complex-data-value").await.unwrap();
    assert!(storage.exists("cert.pem").await);

    let raw = backend.load("cert.pem").await.unwrap();
    assert!(!String::from_utf8_lossy(&raw).contains("complex-data-value"));
    let on_disk = std::fs::read(dir.path().join("cert.pem")).unwrap();
    assert_eq!(on_disk, raw);

    assert_eq!(storage.load("cert.pem").await.unwrap(), b"complex-data-value");

    storage.delete("cert.pem").await.unwrap();
    assert!(!storage.exists("cert.pem").await);
}

#[tokio::test]
async fn every_store_uses_a_fresh_data_key() {
    let backend = Arc::new(MemoryStorage::new());
    let pair = AgePair::generate();
    let storage = proxy(backend.clone(), vec![group(vec![pair.full()])]);

    storage.store("a", b"same").await.unwrap();
    storage.store("b", b"same").await.unwrap();

    let a = sealed(backend.as_ref(), "a").await;
    let b = sealed(backend.as_ref(), "b").await;
    assert_ne!(a.branches, b.branches);
    assert_ne!(
        a.metadata.key_groups[0][0].enc,
        b.metadata.key_groups[0][0].enc
    );
    assert_eq!(a.metadata.version, cryptstore::FORMAT_VERSION);
}

#[tokio::test]
async fn empty_payload_is_rejected_before_the_backend() {
    let backend = Arc::new(CountingStorage::default());
    let storage = proxy(backend.clone(), vec![group(vec![AgePair::generate().full()])]);

    assert!(matches!(
        storage.store("empty", b"").await,
        Err(ProxyError::EmptyDocument)
    ));
    assert_eq!(backend.stores(), 0);
}

#[tokio::test]
async fn wrap_failure_never_reaches_the_backend() {
    let backend = Arc::new(CountingStorage::default());
    let storage = proxy(backend.clone(), vec![group(vec![Arc::new(BrokenKey)])]);

    let err = storage.store("cert.pem", b"value").await.unwrap_err();
    match err {
        ProxyError::KeyWrap { group, failures } => {
            assert_eq!(group, 0);
            assert_eq!(failures.len(), 1);
            assert!(failures[0].contains("keyring unavailable"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.stores(), 0);
    assert!(!storage.exists("cert.pem").await);
}

#[tokio::test]
async fn partially_failing_group_keeps_the_working_keys() {
    let backend = Arc::new(MemoryStorage::new());
    let pair = AgePair::generate();
    let storage = proxy(
        backend.clone(),
        vec![group(vec![Arc::new(BrokenKey), pair.full()])],
    );

    storage.store("cert.pem", b"value").await.unwrap();
    let document = sealed(backend.as_ref(), "cert.pem").await;
    assert_eq!(document.metadata.key_groups.len(), 1);
    assert_eq!(document.metadata.key_groups[0].len(), 1);
    assert_eq!(document.metadata.key_groups[0][0].key_type.as_deref(), Some("age"));
    assert_eq!(storage.load("cert.pem").await.unwrap(), b"value");
}

#[tokio::test]
async fn any_key_of_a_group_recovers_the_data_key() {
    let backend: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let first = AgePair::generate();
    let second = AgePair::generate();

    let writer = proxy(
        backend.clone(),
        vec![group(vec![first.wrap_only(), second.wrap_only()])],
    );
    writer.store("cert.pem", b"value").await.unwrap();

    let only_second = proxy(backend.clone(), vec![group(vec![second.full()])]);
    assert_eq!(only_second.load("cert.pem").await.unwrap(), b"value");

    let only_first = proxy(backend.clone(), vec![group(vec![first.full()])]);
    assert_eq!(only_first.load("cert.pem").await.unwrap(), b"value");
}

#[tokio::test]
async fn every_group_is_required() {
    let backend: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let ops = AgePair::generate();
    let security = AgePair::generate();

    let both = proxy(
        backend.clone(),
        vec![group(vec![ops.full()]), group(vec![security.full()])],
    );
    assert_eq!(both.group_count(), 2);
    both.store("secret", b"two-person rule").await.unwrap();
    assert_eq!(sealed(backend.as_ref(), "secret").await.metadata.key_groups.len(), 2);
    assert_eq!(both.load("secret").await.unwrap(), b"two-person rule");

    let missing_security = proxy(
        backend.clone(),
        vec![group(vec![ops.full()]), group(vec![security.wrap_only()])],
    );
    match missing_security.load("secret").await {
        Err(ProxyError::KeyRecovery { group, failures }) => {
            assert_eq!(group, 1);
            assert!(failures[0].contains("no identities configured"), "{failures:?}");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn unrelated_identity_cannot_load() {
    let backend: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    proxy(backend.clone(), vec![group(vec![AgePair::generate().full()])])
        .store("cert.pem", b"value")
        .await
        .unwrap();

    let stranger = proxy(backend.clone(), vec![group(vec![AgePair::generate().full()])]);
    assert!(matches!(
        stranger.load("cert.pem").await,
        Err(ProxyError::KeyRecovery { group: 0, .. })
    ));
}

async fn tampered(edit: impl FnOnce(&mut cryptstore::SealedDocument)) -> ProxyError {
    let backend: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let storage = proxy(backend.clone(), vec![group(vec![AgePair::generate().full()])]);
    storage.store("cert.pem", b"complex-data-value").await.unwrap();

    let mut document = sealed(backend.as_ref(), "cert.pem").await;
    edit(&mut document);
    reseal(backend.as_ref(), "cert.pem", &document).await;

    storage.load("cert.pem").await.unwrap_err()
}

fn data_leaf(document: &mut cryptstore::SealedDocument) -> &mut Value {
    document.branches[0].get_mut("data").unwrap()
}

#[tokio::test]
async fn tampered_leaf_ciphertext_fails_integrity() {
    let err = tampered(|doc| {
        let leaf = data_leaf(doc);
        *leaf = Value::String(flip(leaf.as_str().unwrap(), "data"));
    })
    .await;
    assert!(matches!(err, ProxyError::Integrity(_)), "{err}");
}

#[tokio::test]
async fn tampered_leaf_nonce_fails_integrity() {
    let err = tampered(|doc| {
        let leaf = data_leaf(doc);
        *leaf = Value::String(flip(leaf.as_str().unwrap(), "iv"));
    })
    .await;
    assert!(matches!(err, ProxyError::Integrity(_)), "{err}");
}

#[tokio::test]
async fn tampered_leaf_type_fails_integrity() {
    let err = tampered(|doc| {
        let leaf = data_leaf(doc);
        *leaf = Value::String(leaf.as_str().unwrap().replace("type:bytes", "type:bool"));
    })
    .await;
    assert!(matches!(err, ProxyError::Integrity(_)), "{err}");
}

#[tokio::test]
async fn tampered_mac_fails_integrity() {
    let err = tampered(|doc| doc.metadata.mac = flip(&doc.metadata.mac, "data")).await;
    assert!(matches!(err, ProxyError::Integrity(_)), "{err}");
}

#[tokio::test]
async fn moved_leaf_fails_integrity() {
    let err = tampered(|doc| {
        let leaf = doc.branches[0].remove("data").unwrap();
        doc.branches[0].insert("other".into(), leaf);
    })
    .await;
    assert!(matches!(err, ProxyError::Integrity(_)), "{err}");
}

#[tokio::test]
async fn changed_modification_time_fails_integrity() {
    let err = tampered(|doc| {
        doc.metadata.last_modified -= chrono::Duration::seconds(1);
    })
    .await;
    assert!(matches!(err, ProxyError::Integrity(_)), "{err}");
}

#[tokio::test]
async fn unknown_record_type_is_unsupported() {
    let err = tampered(|doc| doc.metadata.key_groups[0][0].key_type = Some("rot13".into())).await;
    assert!(matches!(err, ProxyError::UnsupportedKeyType(ref t) if t == "rot13"), "{err}");
}

#[tokio::test]
async fn untagged_record_is_missing_key() {
    let err = tampered(|doc| doc.metadata.key_groups[0][0].key_type = None).await;
    assert!(matches!(err, ProxyError::MissingKey), "{err}");
}

#[tokio::test]
async fn newer_major_version_is_rejected() {
    let err = tampered(|doc| doc.metadata.version = "2.0".into()).await;
    assert!(matches!(err, ProxyError::Decode(_)), "{err}");
}

#[tokio::test]
async fn plaintext_in_the_backend_is_a_decode_error() {
    let backend: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    backend.store("cert.pem", b"complex-data-value").await.unwrap();
    let storage = proxy(backend, vec![group(vec![AgePair::generate().full()])]);

    let err = storage.load("cert.pem").await.unwrap_err();
    assert!(matches!(err, ProxyError::Decode(_)));
    assert!(err.to_string().starts_with("error loading encrypted file"));
}

#[tokio::test]
async fn missing_key_keeps_not_found_through_the_storage_trait() {
    let storage = proxy(
        Arc::new(MemoryStorage::new()),
        vec![group(vec![AgePair::generate().full()])],
    );

    let err = storage.load("nope").await.unwrap_err();
    assert!(matches!(err, ProxyError::BackendLoad(StorageError::NotFound(_))));
    assert!(err.to_string().starts_with("backend load error"));

    let as_storage: &dyn Storage = &storage;
    assert!(as_storage.load("nope").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn structural_operations_pass_through() {
    let backend: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let storage = proxy(backend.clone(), vec![group(vec![AgePair::generate().full()])]);

    storage.store("acme/a.example/cert", b"1").await.unwrap();
    storage.store("acme/b.example/cert", b"2").await.unwrap();

    assert_eq!(
        Storage::list(&storage, "acme", false).await.unwrap(),
        vec!["acme/a.example", "acme/b.example"]
    );
    assert_eq!(
        Storage::list(&storage, "acme", true).await.unwrap(),
        backend.list("acme", true).await.unwrap()
    );

    let info = Storage::stat(&storage, "acme/a.example/cert").await.unwrap();
    assert!(info.is_terminal);
    assert_eq!(info.size, backend.load("acme/a.example/cert").await.unwrap().len() as u64);

    Storage::lock(&storage, "issue").await.unwrap();
    Storage::unlock(&storage, "issue").await.unwrap();
    assert!(Storage::unlock(&storage, "issue").await.is_err());
}

#[tokio::test]
async fn json_payloads_keep_their_structure() {
    let backend: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let storage = EncryptedStorage::new(
        backend.clone(),
        vec![local(vec![group(vec![AgePair::generate().full()])])],
        PayloadFormat::Json,
    )
    .unwrap();

    let input = json!({
        "domain": "example.com",
        "sans": ["a.example.com", "b.example.com"],
        "meta": { "renewals": 3, "staging": false, "issuer": null }
    });
    storage
        .store("meta.json", &serde_json::to_vec(&input).unwrap())
        .await
        .unwrap();

    let document = sealed(backend.as_ref(), "meta.json").await;
    assert!(document.branches[0]["domain"].as_str().unwrap().starts_with("ENC["));
    assert!(document.branches[0]["sans"].is_array());
    assert!(document.branches[0]["meta"]["staging"].as_str().unwrap().ends_with("type:bool]"));

    let output: Value =
        serde_json::from_slice(&storage.load("meta.json").await.unwrap()).unwrap();
    assert_eq!(output, input);

    assert!(matches!(
        storage.store("bad.json", b"[1, 2]").await,
        Err(ProxyError::MalformedInput(_))
    ));
    assert!(matches!(
        storage.store("empty.json", b"{}").await,
        Err(ProxyError::EmptyDocument)
    ));
}

#[tokio::test]
async fn construction_needs_a_provider() {
    let err = EncryptedStorage::new(Arc::new(MemoryStorage::new()), Vec::new(), PayloadFormat::Binary)
        .unwrap_err();
    assert!(matches!(err, ProxyError::Configuration(_)));
}

#[tokio::test]
async fn provision_from_json_config() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let pair = AgePair::generate();
    let config = StorageConfig::from_json(
        json!({
            "backend": { "module": "file_system", "root": dir.path() },
            "encryption": [{
                "provider": "local",
                "keys": [{ "type": "age", "identities": [pair.identity] }]
            }]
        })
        .to_string()
        .as_bytes(),
    )
    .unwrap();

    let storage = EncryptedStorage::provision(&config, &Registry::with_defaults())
        .await
        .unwrap();
    assert_eq!(storage.format(), PayloadFormat::Binary);
    storage.store("certs/example.com.crt", b"pem").await.unwrap();
    assert!(dir.path().join("certs/example.com.crt").exists());
    assert_eq!(storage.load("certs/example.com.crt").await.unwrap(), b"pem");

    // The same files open with the same identity in another instance.
    let reopened = EncryptedStorage::provision(&config, &Registry::with_defaults())
        .await
        .unwrap();
    assert_eq!(reopened.load("certs/example.com.crt").await.unwrap(), b"pem");
}

#[tokio::test]
async fn provision_with_age_keygen_pair() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig::from_json(
        json!({
            "backend": { "module": "file_system", "root": dir.path() },
            "encryption": [{
                "provider": "local",
                "keys": [{
                    "type": "age",
                    "recipient": "age1pjtsgtdh79nksq08ujpx8hrup0yrpn4sw3gxl4yyh0vuggjjp3ls7f42y2",
                    "identities": ["AGE-SECRET-KEY-16E6P6H93CXNPZQRJVNA5NMK4X06ZHCDU4ED9U89E3PZMASSMC46SX99PEW"]
                }]
            }]
        })
        .to_string()
        .as_bytes(),
    )
    .unwrap();

    let storage = EncryptedStorage::provision(&config, &Registry::with_defaults())
        .await
        .unwrap();
    storage.store("complex-data-key", b"complex-data-value").await.unwrap();
    assert!(storage.exists("complex-data-key").await);

    let on_disk = std::fs::read(dir.path().join("complex-data-key")).unwrap();
    assert!(!String::from_utf8_lossy(&on_disk).contains("complex-data-value"));
    assert_eq!(
        storage.load("complex-data-key").await.unwrap(),
        b"complex-data-value"
    );
}

#[tokio::test]
async fn provision_reports_unknown_modules() {
    let config = StorageConfig::from_json(
        json!({
            "backend": { "module": "tape" },
            "encryption": [{ "provider": "local", "keys": [{ "type": "age", "recipient": AgePair::generate().recipient }] }]
        })
        .to_string()
        .as_bytes(),
    )
    .unwrap();
    let err = EncryptedStorage::provision(&config, &Registry::with_defaults())
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::Configuration(ref m) if m.contains("tape")), "{err}");
}

#[tokio::test]
async fn provision_rejects_both_keys_and_key_groups() {
    let recipient = AgePair::generate().recipient;
    let config = StorageConfig::from_json(
        json!({
            "backend": { "module": "memory" },
            "encryption": [{
                "provider": "local",
                "keys": [{ "type": "age", "recipient": recipient }],
                "key_groups": [[{ "type": "age", "recipient": recipient }]]
            }]
        })
        .to_string()
        .as_bytes(),
    )
    .unwrap();
    let err = EncryptedStorage::provision(&config, &Registry::with_defaults())
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::Configuration(ref m) if m.contains("not both")), "{err}");
}

#[tokio::test]
async fn concurrent_stores_and_loads() {
    let backend: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let storage = Arc::new(proxy(backend, vec![group(vec![AgePair::generate().full()])]));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let storage = Arc::clone(&storage);
            tokio::spawn(async move {
                let key = format!("certs/{i}.pem");
                let value = format!("certificate {i}");
                storage.store(&key, value.as_bytes()).await.unwrap();
                assert_eq!(storage.load(&key).await.unwrap(), value.as_bytes());
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
}
