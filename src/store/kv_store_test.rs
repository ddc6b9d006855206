use std::sync::Arc;

use bytes::Bytes;

use super::*;
use crate::backend::KvBackend;
use crate::MemoryBackend;
use crate::Settings;

fn store() -> (KvStore, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let settings = Settings::default();
    (KvStore::new(&settings, backend.clone()), backend)
}

#[tokio::test]
async fn put_then_get_should_round_trip() {
    let (store, _) = store();

    store
        .put("ns", "app", "user1", Bytes::from("x"), None)
        .await
        .unwrap();

    let item = store.get("ns", "app", "user1").await.unwrap().unwrap();
    assert_eq!(item.key, "user1");
    assert_eq!(item.value, Bytes::from("x"));
    assert_eq!(item.ttl, None);
    assert_eq!(item.expire_at, None);
}

#[tokio::test]
async fn get_should_scope_by_namespace_and_app() {
    let (store, _) = store();

    store
        .put("ns", "app", "user1", Bytes::from("x"), None)
        .await
        .unwrap();

    assert!(store.get("other", "app", "user1").await.unwrap().is_none());
    assert!(store.get("ns", "other", "user1").await.unwrap().is_none());
    // Empty scope falls back to the configured defaults, not to "ns"
    assert!(store.get("", "", "user1").await.unwrap().is_none());
}

#[tokio::test]
async fn put_should_reject_oversized_value() {
    let (store, _) = store();
    let oversized = Bytes::from(vec![0u8; 1024 * 1024 + 1]);

    let result = store.put("ns", "app", "k", oversized, None).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn put_should_reject_out_of_range_ttl() {
    let (store, _) = store();

    assert!(store
        .put("ns", "app", "k", Bytes::from("v"), Some(-1))
        .await
        .is_err());
    assert!(store
        .put("ns", "app", "k", Bytes::from("v"), Some(366 * 24 * 60 * 60))
        .await
        .is_err());
}

#[tokio::test]
async fn put_with_ttl_should_annotate_get_with_remaining_ttl() {
    let (store, _) = store();

    store
        .put("ns", "app", "session", Bytes::from("v"), Some(120))
        .await
        .unwrap();

    let item = store.get("ns", "app", "session").await.unwrap().unwrap();
    let ttl = item.ttl.expect("ttl annotation missing");
    assert!(ttl > 0 && ttl <= 120);
    let expire_at = item.expire_at.expect("expire_at missing");
    assert!(expire_at > crate::now_unix_secs());
}

#[tokio::test]
async fn delete_should_report_whether_key_existed() {
    let (store, _) = store();

    store
        .put("ns", "app", "k", Bytes::from("v"), None)
        .await
        .unwrap();
    assert!(store.delete("ns", "app", "k").await.unwrap());
    assert!(!store.delete("ns", "app", "k").await.unwrap());
}

#[tokio::test]
async fn list_should_return_logical_keys_for_scope() {
    let (store, _) = store();

    store
        .put("ns", "app", "a", Bytes::from("1"), None)
        .await
        .unwrap();
    store
        .put("ns", "app", "b", Bytes::from("2"), None)
        .await
        .unwrap();
    store
        .put("other", "app", "c", Bytes::from("3"), None)
        .await
        .unwrap();

    let mut keys: Vec<String> = store
        .list("ns", "app")
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.key)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn writes_should_not_leave_per_key_locks_held() {
    let (store, backend) = store();

    // Two writes to the same key in sequence: the second would hang if the
    // first leaked its per-key lock.
    store
        .put("ns", "app", "k", Bytes::from("v1"), None)
        .await
        .unwrap();
    tokio::time::timeout(
        std::time::Duration::from_secs(1),
        store.put("ns", "app", "k", Bytes::from("v2"), None),
    )
    .await
    .expect("second write blocked on a leaked lock")
    .unwrap();

    // Lock records live under the locks domain, not the kv domain
    assert!(backend
        .get("/kvstore/locks/ns/app/k")
        .await
        .unwrap()
        .is_none());
}
