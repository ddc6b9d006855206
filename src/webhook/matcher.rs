use std::sync::Arc;

use tracing::warn;

use super::EventKind;
use super::Webhook;
use super::WebhookRegistry;

/// Check a logical key against a webhook key pattern.
///
/// A pattern with a trailing `*` matches any key starting with its literal
/// prefix; any other pattern matches by equality.
pub fn key_matches(
    pattern: &str,
    key: &str,
) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}

/// Finds the registered webhooks that a classified change event should be
/// delivered to.
///
/// Every match pass is a full scan of the `(namespace, app)` registry.
/// Registries are expected to be small, so no secondary index is kept.
pub struct WebhookMatcher {
    registry: Arc<WebhookRegistry>,
}

impl WebhookMatcher {
    pub fn new(registry: Arc<WebhookRegistry>) -> Self {
        Self { registry }
    }

    /// All webhooks in the event's scope whose event kind and key pattern
    /// match. Registry read failures yield no matches; they must never fail
    /// the watch loop.
    pub async fn matching(
        &self,
        namespace: &str,
        app_name: &str,
        logical_key: &str,
        kind: EventKind,
    ) -> Vec<Webhook> {
        let webhooks = match self.registry.list(namespace, app_name).await {
            Ok(webhooks) => webhooks,
            Err(e) => {
                warn!(namespace, app_name, "Failed to read webhook registry: {e}");
                return Vec::new();
            }
        };

        webhooks
            .into_iter()
            .filter(|webhook| webhook.event == kind && key_matches(&webhook.key, logical_key))
            .collect()
    }
}
