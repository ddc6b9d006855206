//! In-process backend implementation.
//!
//! Implements the full [`KvBackend`] contract against process-local state:
//! sorted prefix reads, lease TTL expiry that removes attached keys and emits
//! delete mutations, prefix-scoped change subscriptions, and named async
//! locks. Sessions in this backend never miss keep-alives on their own;
//! holder death is simulated through [`MemoryBackend::fail_session`].

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::KeyRecord;
use super::KvBackend;
use super::LeaseId;
use super::LockHandle;
use super::MutationEvent;
use super::MutationKind;
use crate::BackendError;
use crate::Result;
use tracing::trace;
use tracing::warn;

/// Per-subscriber channel buffer. When a subscriber falls this far behind,
/// further batches for it are dropped rather than blocking writers.
const SUBSCRIBER_BUFFER_SIZE: usize = 64;

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Bytes,
    lease: Option<LeaseId>,
}

#[derive(Debug, Clone, Copy)]
struct LeaseState {
    deadline: Instant,
}

struct Subscriber {
    id: u64,
    prefix: String,
    tx: mpsc::Sender<Vec<MutationEvent>>,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<BTreeMap<String, StoredEntry>>,
    leases: Mutex<HashMap<LeaseId, LeaseState>>,
    subscribers: Mutex<Vec<Subscriber>>,
    /// One async mutex per lock key; holding its guard is holding the lock
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Expiry token of the current holder's session, per lock key
    sessions: Mutex<HashMap<String, CancellationToken>>,
    next_lease_id: AtomicU64,
    next_subscriber_id: AtomicU64,
}

impl Inner {
    /// Fan one batch out to every subscriber whose prefix matches. Slow
    /// subscribers lose batches; closed ones are removed.
    fn broadcast(
        &self,
        events: Vec<MutationEvent>,
    ) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sub| {
            let matching: Vec<MutationEvent> = events
                .iter()
                .filter(|e| e.key.starts_with(&sub.prefix))
                .cloned()
                .collect();
            if matching.is_empty() {
                return true;
            }
            match sub.tx.try_send(matching) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber_id = sub.id, prefix = %sub.prefix, "Subscriber lagging, dropping batch");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    fn remove_subscriber(
        &self,
        id: u64,
    ) {
        self.subscribers.lock().retain(|sub| sub.id != id);
    }

    /// Remove a key and report the delete to subscribers.
    fn delete_entry(
        &self,
        key: &str,
    ) -> bool {
        let existed = self.entries.lock().remove(key).is_some();
        if existed {
            self.broadcast(vec![MutationEvent {
                key: key.to_string(),
                kind: MutationKind::Delete,
                value: Bytes::new(),
                lease: None,
            }]);
        }
        existed
    }

    /// Drop an expired lease and every key attached to it.
    fn expire_lease(
        &self,
        lease: LeaseId,
    ) {
        if self.leases.lock().remove(&lease).is_none() {
            return;
        }
        let expired_keys: Vec<String> = {
            let mut entries = self.entries.lock();
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| entry.lease == Some(lease))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                entries.remove(key);
            }
            keys
        };
        for key in expired_keys {
            trace!(%key, lease, "Lease expired, key removed");
            self.broadcast(vec![MutationEvent {
                key,
                kind: MutationKind::Delete,
                value: Bytes::new(),
                lease: None,
            }]);
        }
    }
}

/// In-process [`KvBackend`]. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate holder death for the session currently holding `lock_key`:
    /// fires the session-expired signal on the holder's handle. The lock
    /// itself frees once the holder drops its handle, mirroring backend-side
    /// lease expiry after the holder vanishes.
    pub fn fail_session(
        &self,
        lock_key: &str,
    ) {
        if let Some(token) = self.inner.sessions.lock().remove(lock_key) {
            token.cancel();
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        lease: Option<LeaseId>,
    ) -> Result<()> {
        if let Some(lease_id) = lease {
            if !self.inner.leases.lock().contains_key(&lease_id) {
                return Err(BackendError::LeaseNotFound(lease_id).into());
            }
        }
        self.inner.entries.lock().insert(
            key.to_string(),
            StoredEntry {
                value: value.clone(),
                lease,
            },
        );
        self.inner.broadcast(vec![MutationEvent {
            key: key.to_string(),
            kind: MutationKind::Put,
            value,
            lease,
        }]);
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KeyRecord>> {
        Ok(self.inner.entries.lock().get(key).map(|entry| KeyRecord {
            key: key.to_string(),
            value: entry.value.clone(),
            lease: entry.lease,
        }))
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool> {
        Ok(self.inner.delete_entry(key))
    }

    async fn get_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<KeyRecord>> {
        let entries = self.inner.entries.lock();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| KeyRecord {
                key: key.clone(),
                value: entry.value.clone(),
                lease: entry.lease,
            })
            .collect())
    }

    async fn grant_lease(
        &self,
        ttl: Duration,
    ) -> Result<LeaseId> {
        let lease = self.inner.next_lease_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.leases.lock().insert(
            lease,
            LeaseState {
                deadline: Instant::now() + ttl,
            },
        );

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            inner.expire_lease(lease);
        });

        Ok(lease)
    }

    async fn lease_remaining(
        &self,
        lease: LeaseId,
    ) -> Result<Duration> {
        match self.inner.leases.lock().get(&lease) {
            Some(state) => Ok(state.deadline.saturating_duration_since(Instant::now())),
            None => Err(BackendError::LeaseNotFound(lease).into()),
        }
    }

    fn subscribe(
        &self,
        prefix: &str,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<Vec<MutationEvent>> {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER_SIZE);
        self.inner.subscribers.lock().push(Subscriber {
            id,
            prefix: prefix.to_string(),
            tx,
        });

        // Dropping the sender closes the feed on the receiver side.
        let inner = self.inner.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            inner.remove_subscriber(id);
        });

        rx
    }

    async fn acquire_lock(
        &self,
        key: &str,
        _session_ttl: Duration,
    ) -> Result<Box<dyn LockHandle>> {
        let mutex = {
            let mut locks = self.inner.locks.lock();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        // Queue behind the current holder; the caller bounds this wait.
        let guard = mutex.lock_owned().await;

        let expired = CancellationToken::new();
        self.inner
            .sessions
            .lock()
            .insert(key.to_string(), expired.clone());

        // Lock record: visible on the change feed like any other mutation,
        // which is why the watcher filters reserved domains.
        self.inner.entries.lock().insert(
            key.to_string(),
            StoredEntry {
                value: Bytes::from_static(b"held"),
                lease: None,
            },
        );
        self.inner.broadcast(vec![MutationEvent {
            key: key.to_string(),
            kind: MutationKind::Put,
            value: Bytes::from_static(b"held"),
            lease: None,
        }]);

        Ok(Box::new(MemoryLockHandle {
            inner: self.inner.clone(),
            key: key.to_string(),
            guard: Some(guard),
            expired,
        }))
    }
}

struct MemoryLockHandle {
    inner: Arc<Inner>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    expired: CancellationToken,
}

impl MemoryLockHandle {
    fn release_sync(&mut self) {
        if let Some(guard) = self.guard.take() {
            self.inner.sessions.lock().remove(&self.key);
            self.inner.delete_entry(&self.key);
            drop(guard);
        }
    }
}

#[async_trait]
impl LockHandle for MemoryLockHandle {
    async fn release(&mut self) -> Result<()> {
        self.release_sync();
        Ok(())
    }

    fn expired(&self) -> CancellationToken {
        self.expired.clone()
    }
}

impl Drop for MemoryLockHandle {
    fn drop(&mut self) {
        self.release_sync();
    }
}
