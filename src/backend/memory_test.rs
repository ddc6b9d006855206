use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::*;

#[tokio::test]
async fn put_get_delete_should_round_trip() {
    let backend = MemoryBackend::new();

    backend
        .put("/kvstore/kv/ns/app/k", Bytes::from("v"), None)
        .await
        .unwrap();
    let record = backend.get("/kvstore/kv/ns/app/k").await.unwrap().unwrap();
    assert_eq!(record.value, Bytes::from("v"));
    assert_eq!(record.lease, None);

    assert!(backend.delete("/kvstore/kv/ns/app/k").await.unwrap());
    assert!(!backend.delete("/kvstore/kv/ns/app/k").await.unwrap());
    assert!(backend.get("/kvstore/kv/ns/app/k").await.unwrap().is_none());
}

#[tokio::test]
async fn get_prefix_should_only_return_matching_keys() {
    let backend = MemoryBackend::new();
    backend
        .put("/kvstore/kv/ns/app/a", Bytes::from("1"), None)
        .await
        .unwrap();
    backend
        .put("/kvstore/kv/ns/app/b", Bytes::from("2"), None)
        .await
        .unwrap();
    backend
        .put("/kvstore/webhooks/ns/app/w", Bytes::from("3"), None)
        .await
        .unwrap();

    let records = backend.get_prefix("/kvstore/kv/").await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.key.starts_with("/kvstore/kv/")));
}

#[tokio::test]
async fn subscribe_should_deliver_mutations_in_order() {
    let backend = MemoryBackend::new();
    let cancel = CancellationToken::new();
    let mut feed = backend.subscribe("/kvstore/kv/", cancel.clone());

    backend
        .put("/kvstore/kv/ns/app/k", Bytes::from("v1"), None)
        .await
        .unwrap();
    backend
        .put("/kvstore/kv/ns/app/k", Bytes::from("v2"), None)
        .await
        .unwrap();
    backend.delete("/kvstore/kv/ns/app/k").await.unwrap();
    // Outside the subscribed prefix: must not be delivered
    backend
        .put("/kvstore/webhooks/ns/app/w", Bytes::from("x"), None)
        .await
        .unwrap();

    let mut received = Vec::new();
    while received.len() < 3 {
        let batch = feed.recv().await.expect("feed closed early");
        received.extend(batch);
    }
    assert_eq!(received[0].kind, MutationKind::Put);
    assert_eq!(received[0].value, Bytes::from("v1"));
    assert_eq!(received[1].value, Bytes::from("v2"));
    assert_eq!(received[2].kind, MutationKind::Delete);

    // Cancellation closes the feed
    cancel.cancel();
    loop {
        match tokio::time::timeout(Duration::from_secs(1), feed.recv()).await {
            Ok(None) => break,
            Ok(Some(_)) => continue,
            Err(_) => panic!("feed did not close after cancellation"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn lease_expiry_should_remove_attached_keys_and_emit_delete() {
    let backend = MemoryBackend::new();
    let cancel = CancellationToken::new();
    let mut feed = backend.subscribe("/kvstore/kv/", cancel.clone());

    let lease = backend.grant_lease(Duration::from_secs(5)).await.unwrap();
    backend
        .put("/kvstore/kv/ns/app/ephemeral", Bytes::from("v"), Some(lease))
        .await
        .unwrap();

    let remaining = backend.lease_remaining(lease).await.unwrap();
    assert!(remaining <= Duration::from_secs(5));
    assert!(remaining >= Duration::from_secs(4));

    // First batch: the put itself
    let batch = feed.recv().await.unwrap();
    assert_eq!(batch[0].kind, MutationKind::Put);
    assert_eq!(batch[0].lease, Some(lease));

    tokio::time::advance(Duration::from_secs(6)).await;

    let batch = feed.recv().await.unwrap();
    assert_eq!(batch[0].kind, MutationKind::Delete);
    assert_eq!(batch[0].key, "/kvstore/kv/ns/app/ephemeral");
    assert!(backend
        .get("/kvstore/kv/ns/app/ephemeral")
        .await
        .unwrap()
        .is_none());
    assert!(backend.lease_remaining(lease).await.is_err());
}

#[tokio::test]
async fn put_with_unknown_lease_should_fail() {
    let backend = MemoryBackend::new();
    let result = backend
        .put("/kvstore/kv/ns/app/k", Bytes::from("v"), Some(42))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn lock_should_admit_one_holder_at_a_time() {
    let backend = MemoryBackend::new();

    let mut first = backend
        .acquire_lock("/kvstore/locks/watcher", Duration::from_secs(10))
        .await
        .unwrap();

    // Second acquire must block while the first holds
    let second_attempt = tokio::time::timeout(
        Duration::from_millis(100),
        backend.acquire_lock("/kvstore/locks/watcher", Duration::from_secs(10)),
    )
    .await;
    assert!(second_attempt.is_err(), "lock admitted a second holder");

    first.release().await.unwrap();
    // Idempotent
    first.release().await.unwrap();

    let mut second = tokio::time::timeout(
        Duration::from_secs(1),
        backend.acquire_lock("/kvstore/locks/watcher", Duration::from_secs(10)),
    )
    .await
    .expect("lock not released")
    .unwrap();
    second.release().await.unwrap();
}

#[tokio::test]
async fn fail_session_should_fire_expired_signal() {
    let backend = MemoryBackend::new();

    let handle = backend
        .acquire_lock("/kvstore/locks/watcher", Duration::from_secs(10))
        .await
        .unwrap();
    let expired = handle.expired();
    assert!(!expired.is_cancelled());

    backend.fail_session("/kvstore/locks/watcher");
    tokio::time::timeout(Duration::from_secs(1), expired.cancelled())
        .await
        .expect("expired signal never fired");

    // Holder vanishing (handle dropped) frees the lock
    drop(handle);
    let _relock = tokio::time::timeout(
        Duration::from_secs(1),
        backend.acquire_lock("/kvstore/locks/watcher", Duration::from_secs(10)),
    )
    .await
    .expect("lock not freed after holder vanished")
    .unwrap();
}

#[tokio::test]
async fn dropping_handle_should_release_lock_record() {
    let backend = MemoryBackend::new();

    {
        let _handle = backend
            .acquire_lock("/kvstore/locks/watcher", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(backend
            .get("/kvstore/locks/watcher")
            .await
            .unwrap()
            .is_some());
    }

    assert!(backend
        .get("/kvstore/locks/watcher")
        .await
        .unwrap()
        .is_none());
}
