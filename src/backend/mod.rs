//! Coordination/storage backend boundary.
//!
//! The backend provides durable key-value storage, TTL-based expiry via
//! leases, a prefix-scoped change feed, and session-scoped distributed locks
//! that auto-release when the holder's session dies. [`KvBackend`] is the
//! seam every other component is written against; [`MemoryBackend`] is the
//! in-process implementation used by tests and embedders.

mod memory;

#[cfg(test)]
mod memory_test;

pub use memory::*;

//---
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Backend-assigned TTL handle. Keys attached to a lease are removed when the
/// lease expires.
pub type LeaseId = u64;

/// Raw mutation kind as reported by the backend change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Put,
    Delete,
}

/// One raw mutation from the change feed. Ordered within a single feed
/// session; no cross-session ordering guarantee.
#[derive(Debug, Clone)]
pub struct MutationEvent {
    /// Full backend key
    pub key: String,
    pub kind: MutationKind,
    /// New value; empty for deletes
    pub value: Bytes,
    /// Lease attached to the key, if any (puts only)
    pub lease: Option<LeaseId>,
}

/// A stored key with its value and attached lease.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    pub key: String,
    pub value: Bytes,
    pub lease: Option<LeaseId>,
}

/// Handle to a held session-scoped distributed lock.
///
/// The session's keep-alive is owned by the backend implementation and runs on
/// its own lifetime. It must never be tied to the cancellation scope of the
/// operation performed under the lock.
#[async_trait]
pub trait LockHandle: Send + Sync {
    /// Explicit unlock. Idempotent: a second call is a no-op, never an error.
    async fn release(&mut self) -> Result<()>;

    /// Token cancelled when the backend declares the session dead. Once this
    /// fires the lock is already gone; callers must not attempt `release`.
    fn expired(&self) -> CancellationToken;
}

/// Contract consumed from the coordination/storage backend.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvBackend: Send + Sync + 'static {
    /// Store a value, optionally attached to a lease.
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        lease: Option<LeaseId>,
    ) -> Result<()>;

    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KeyRecord>>;

    /// Remove a key. Returns whether the key existed.
    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool>;

    /// One full read of all keys under `prefix`.
    async fn get_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<KeyRecord>>;

    /// Create a lease with the given TTL.
    async fn grant_lease(
        &self,
        ttl: Duration,
    ) -> Result<LeaseId>;

    /// Remaining time-to-live of a lease.
    async fn lease_remaining(
        &self,
        lease: LeaseId,
    ) -> Result<Duration>;

    /// Subscribe to mutations under `prefix`. Events arrive in batches, in
    /// order. The stream closes when `cancel` fires or the backend
    /// disconnects.
    fn subscribe(
        &self,
        prefix: &str,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<Vec<MutationEvent>>;

    /// Acquire the named distributed lock bound to a fresh session with the
    /// given TTL. Waits until the lock is free; callers bound the wait.
    /// At most one holder exists per lock key at any time.
    async fn acquire_lock(
        &self,
        key: &str,
        session_ttl: Duration,
    ) -> Result<Box<dyn LockHandle>>;
}
