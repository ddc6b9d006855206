use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use super::ShadowValueCache;
use crate::EventKind;
use crate::KeyCodec;
use crate::KvBackend;
use crate::LogicalKey;
use crate::MutationEvent;
use crate::MutationKind;

/// A raw backend mutation resolved into the caller-facing change vocabulary.
#[derive(Debug, Clone)]
pub struct ClassifiedEvent {
    pub logical: LogicalKey,
    pub kind: EventKind,
    /// New value for create/update; last observed value for delete, when the
    /// shadow cache had one
    pub value: Option<Bytes>,
    /// Remaining TTL in whole seconds, when the key carries a lease
    pub ttl_seconds: Option<i64>,
}

/// Turns raw put/delete mutations into create/update/delete events using the
/// session's shadow cache as the prior-state oracle.
pub struct EventClassifier {
    backend: Arc<dyn KvBackend>,
    codec: KeyCodec,
}

impl EventClassifier {
    pub fn new(
        backend: Arc<dyn KvBackend>,
        codec: KeyCodec,
    ) -> Self {
        Self { backend, codec }
    }

    /// Classify one mutation, updating the shadow cache as a side effect.
    ///
    /// Returns `None` for mutations that must not reach webhook matching:
    /// reserved-domain keys and keys that do not decode into a logical triple.
    pub async fn classify(
        &self,
        cache: &mut ShadowValueCache,
        event: &MutationEvent,
    ) -> Option<ClassifiedEvent> {
        if self.codec.is_reserved(&event.key) {
            trace!(key = %event.key, "Skipping reserved key mutation");
            return None;
        }
        let Some(logical) = self.codec.split(&event.key) else {
            trace!(key = %event.key, "Skipping undecodable key mutation");
            return None;
        };

        match event.kind {
            MutationKind::Put => {
                let was_present = cache.observe_put(&event.key, event.value.clone());
                let kind = if was_present {
                    EventKind::Update
                } else {
                    EventKind::Create
                };
                Some(ClassifiedEvent {
                    logical,
                    kind,
                    value: Some(event.value.clone()),
                    ttl_seconds: self.resolve_ttl(event).await,
                })
            }
            MutationKind::Delete => {
                let prior = cache.observe_delete(&event.key);
                Some(ClassifiedEvent {
                    logical,
                    kind: EventKind::Delete,
                    value: prior,
                    ttl_seconds: None,
                })
            }
        }
    }

    /// Best-effort remaining TTL of the event's lease. Lookup failures mean
    /// the event simply carries no TTL annotation.
    async fn resolve_ttl(
        &self,
        event: &MutationEvent,
    ) -> Option<i64> {
        let lease = event.lease?;
        let remaining = self.backend.lease_remaining(lease).await.ok()?;
        let secs = remaining.as_secs() as i64;
        (secs > 0).then_some(secs)
    }
}
