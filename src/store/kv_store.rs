use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;
use tracing::warn;

use crate::now_unix_secs;
use crate::BackendError;
use crate::Domain;
use crate::KeyCodec;
use crate::KvBackend;
use crate::LockHandle;
use crate::Result;
use crate::Settings;
use crate::ValidationError;

/// A stored logical key with its value and best-effort TTL annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvItem {
    pub key: String,
    pub value: Bytes,
    /// Remaining TTL in seconds, if the key is attached to a lease
    pub ttl: Option<i64>,
    /// Unix timestamp at which the key expires, derived from `ttl`
    pub expire_at: Option<i64>,
}

/// CRUD operations on logical keys.
///
/// Writes to a logical key go through a per-key distributed lock so that
/// concurrent writers across processes are serialized; reads are lock-free.
pub struct KvStore {
    backend: Arc<dyn KvBackend>,
    codec: KeyCodec,
    max_value_size: usize,
    default_ttl_seconds: i64,
    max_ttl_seconds: i64,
    lock_session_ttl: Duration,
}

impl KvStore {
    pub fn new(
        settings: &Settings,
        backend: Arc<dyn KvBackend>,
    ) -> Self {
        Self {
            backend,
            codec: KeyCodec::new(&settings.keyspace),
            max_value_size: settings.keyspace.max_value_size,
            default_ttl_seconds: settings.keyspace.default_ttl_seconds,
            max_ttl_seconds: settings.keyspace.max_ttl_seconds,
            lock_session_ttl: settings.watcher.session_ttl(),
        }
    }

    /// Store a value under a logical key, with an optional TTL in seconds.
    ///
    /// A missing TTL falls back to the configured default; 0 means no
    /// expiration.
    pub async fn put(
        &self,
        namespace: &str,
        app_name: &str,
        key: &str,
        value: Bytes,
        ttl_seconds: Option<i64>,
    ) -> Result<()> {
        if value.len() > self.max_value_size {
            return Err(ValidationError::ValueTooLarge {
                max: self.max_value_size,
                actual: value.len(),
            }
            .into());
        }
        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds);
        if ttl < 0 || ttl > self.max_ttl_seconds {
            return Err(ValidationError::TtlOutOfRange {
                max: self.max_ttl_seconds,
                actual: ttl,
            }
            .into());
        }

        let backend_key = self.codec.encode(Domain::Kv, namespace, app_name, key)?;
        let lock_key = self.codec.encode(Domain::Locks, namespace, app_name, key)?;
        let mut lock = self.acquire_key_lock(&lock_key).await?;

        let result = async {
            let lease = if ttl > 0 {
                Some(
                    self.backend
                        .grant_lease(Duration::from_secs(ttl as u64))
                        .await?,
                )
            } else {
                None
            };
            self.backend.put(&backend_key, value, lease).await
        }
        .await;

        if let Err(e) = lock.release().await {
            warn!(key = %backend_key, "Failed to release per-key lock: {e}");
        }
        debug!(key = %backend_key, ttl, "put");
        result
    }

    /// Retrieve a logical key with its TTL resolved best-effort from the
    /// attached lease.
    pub async fn get(
        &self,
        namespace: &str,
        app_name: &str,
        key: &str,
    ) -> Result<Option<KvItem>> {
        let backend_key = self.codec.encode(Domain::Kv, namespace, app_name, key)?;
        let record = match self.backend.get(&backend_key).await? {
            Some(record) => record,
            None => return Ok(None),
        };
        let ttl = self.resolve_ttl(record.lease).await;
        Ok(Some(KvItem {
            key: key.to_string(),
            value: record.value,
            ttl,
            expire_at: ttl.map(|t| now_unix_secs() + t),
        }))
    }

    /// Remove a logical key. Returns whether the key existed.
    pub async fn delete(
        &self,
        namespace: &str,
        app_name: &str,
        key: &str,
    ) -> Result<bool> {
        let backend_key = self.codec.encode(Domain::Kv, namespace, app_name, key)?;
        let lock_key = self.codec.encode(Domain::Locks, namespace, app_name, key)?;

        let mut lock = self.acquire_key_lock(&lock_key).await?;
        let result = self.backend.delete(&backend_key).await;
        if let Err(e) = lock.release().await {
            warn!(key = %backend_key, "Failed to release per-key lock: {e}");
        }
        debug!(key = %backend_key, "delete");
        result
    }

    /// All logical keys under one `(namespace, app)` scope.
    pub async fn list(
        &self,
        namespace: &str,
        app_name: &str,
    ) -> Result<Vec<KvItem>> {
        let prefix = self
            .codec
            .scope_prefix(Domain::Kv, namespace, app_name)?;
        let records = self.backend.get_prefix(&prefix).await?;

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let Some(logical_key) = record.key.strip_prefix(&prefix) else {
                continue;
            };
            let ttl = self.resolve_ttl(record.lease).await;
            items.push(KvItem {
                key: logical_key.to_string(),
                value: record.value,
                ttl,
                expire_at: ttl.map(|t| now_unix_secs() + t),
            });
        }
        Ok(items)
    }

    /// Bounded wait for a per-key write lock. The session TTL doubles as the
    /// acquisition deadline.
    async fn acquire_key_lock(
        &self,
        lock_key: &str,
    ) -> Result<Box<dyn LockHandle>> {
        tokio::time::timeout(
            self.lock_session_ttl,
            self.backend.acquire_lock(lock_key, self.lock_session_ttl),
        )
        .await
        .map_err(|_| BackendError::LockTimeout {
            name: lock_key.to_string(),
            timeout: self.lock_session_ttl,
        })?
    }

    /// Remaining lease TTL in whole seconds; lookup failures are swallowed
    /// and the annotation omitted.
    async fn resolve_ttl(
        &self,
        lease: Option<u64>,
    ) -> Option<i64> {
        let lease = lease?;
        match self.backend.lease_remaining(lease).await {
            Ok(remaining) => Some(remaining.as_secs() as i64),
            Err(_) => None,
        }
    }
}
