use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::BackendError;
use crate::KvBackend;
use crate::LockHandle;
use crate::Result;

/// Competes for the cluster-wide watcher lock.
///
/// Every replica runs an elector against the same lock key; the backend
/// guarantees at most one holder at a time. Acquisition is bounded by the
/// caller's timeout so a non-leader replica keeps cycling instead of parking
/// on the lock forever.
pub struct LeaderElector {
    backend: Arc<dyn KvBackend>,
    lock_key: String,
    session_ttl: Duration,
}

impl LeaderElector {
    pub fn new(
        backend: Arc<dyn KvBackend>,
        lock_key: String,
        session_ttl: Duration,
    ) -> Self {
        Self {
            backend,
            lock_key,
            session_ttl,
        }
    }

    /// Try to become leader within `timeout`. A timeout is the normal outcome
    /// for a replica whose peer holds the lock.
    pub async fn acquire(
        &self,
        timeout: Duration,
    ) -> Result<LeaderLease> {
        let handle = tokio::time::timeout(
            timeout,
            self.backend.acquire_lock(&self.lock_key, self.session_ttl),
        )
        .await
        .map_err(|_| BackendError::LockTimeout {
            name: self.lock_key.clone(),
            timeout,
        })??;

        debug!(lock = %self.lock_key, "Watcher lock acquired");
        Ok(LeaderLease {
            lock_key: self.lock_key.clone(),
            handle: Some(handle),
        })
    }
}

/// A held leadership term.
///
/// Release and session expiry are mutually exclusive ends of a term: once the
/// backend declares the session dead the lock is already gone, and the lease
/// must be marked lost instead of released.
pub struct LeaderLease {
    lock_key: String,
    handle: Option<Box<dyn LockHandle>>,
}

impl LeaderLease {
    /// Token cancelled when the backing session dies.
    pub fn expired(&self) -> CancellationToken {
        match &self.handle {
            Some(handle) => handle.expired(),
            // Lost or released leases report an already-ended term.
            None => {
                let token = CancellationToken::new();
                token.cancel();
                token
            }
        }
    }

    /// Voluntarily end the term. Idempotent; a no-op after `mark_lost`.
    pub async fn release(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        if let Err(e) = handle.release().await {
            warn!(lock = %self.lock_key, "Failed to release watcher lock: {e}");
        } else {
            debug!(lock = %self.lock_key, "Watcher lock released");
        }
    }

    /// Record that the backend expired the session. Drops the handle without
    /// releasing; the lock no longer belongs to this holder.
    pub fn mark_lost(&mut self) {
        self.handle = None;
    }
}
