use std::collections::HashMap;

use bytes::Bytes;
use tracing::debug;
use tracing::warn;

use crate::KeyCodec;
use crate::KvBackend;

/// Process-local mirror of the last value observed per backend key.
///
/// The change feed reports raw puts with no prior state attached; the shadow
/// cache is what lets the classifier tell a create from an update and recover
/// the deleted value for delete events. It is rebuilt from a full prefix read
/// at the start of every watch session and owned exclusively by that session,
/// so no synchronization is needed.
#[derive(Debug, Default)]
pub struct ShadowValueCache {
    entries: HashMap<String, Bytes>,
}

impl ShadowValueCache {
    /// Snapshot the current state of the watched prefix. Reserved keys are
    /// excluded. A failed read yields an empty cache: watching proceeds, at
    /// the cost of the first mutation per key classifying as a create.
    pub async fn load(
        backend: &dyn KvBackend,
        prefix: &str,
        codec: &KeyCodec,
    ) -> Self {
        let records = match backend.get_prefix(prefix).await {
            Ok(records) => records,
            Err(e) => {
                warn!(prefix, "Failed to load shadow snapshot, starting empty: {e}");
                return Self::default();
            }
        };

        let mut entries = HashMap::with_capacity(records.len());
        for record in records {
            if codec.is_reserved(&record.key) {
                continue;
            }
            entries.insert(record.key, record.value);
        }
        debug!(prefix, keys = entries.len(), "Shadow snapshot loaded");
        Self { entries }
    }

    /// Record a put. Returns whether the key was already present.
    pub fn observe_put(
        &mut self,
        key: &str,
        value: Bytes,
    ) -> bool {
        self.entries.insert(key.to_string(), value).is_some()
    }

    /// Record a delete. Returns the previously observed value, if any.
    pub fn observe_delete(
        &mut self,
        key: &str,
    ) -> Option<Bytes> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
