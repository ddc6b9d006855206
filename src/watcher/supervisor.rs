use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::EventClassifier;
use super::LeaderElector;
use super::LeaderLease;
use super::ShadowValueCache;
use crate::BackendError;
use crate::Error;
use crate::KeyCodec;
use crate::KvBackend;
use crate::MutationEvent;
use crate::Result;
use crate::Settings;
use crate::WatcherConfig;
use crate::WebhookDispatcher;
use crate::WebhookMatcher;
use crate::WebhookRegistry;

/// How a watch session ended, deciding what the supervisor does next.
enum SessionEnd {
    /// External shutdown; the supervisor returns.
    Cancelled,
    /// The backend expired our session; re-elect after the relock interval.
    SessionLost,
    /// The change feed closed; re-elect after the relock interval.
    FeedClosed,
}

/// Drives the watcher lifecycle: elect, watch, re-elect, forever.
///
/// Exactly one replica in the cluster holds the watcher lock and consumes the
/// change feed at any time; the rest cycle through bounded acquisition
/// attempts. The supervisor never gives up on its own, only an external
/// cancellation ends it.
pub struct WatcherSupervisor {
    backend: Arc<dyn KvBackend>,
    codec: KeyCodec,
    elector: LeaderElector,
    classifier: EventClassifier,
    matcher: WebhookMatcher,
    dispatcher: WebhookDispatcher,
    config: WatcherConfig,
}

impl WatcherSupervisor {
    pub fn new(
        settings: &Settings,
        backend: Arc<dyn KvBackend>,
    ) -> Result<Self> {
        let codec = KeyCodec::new(&settings.keyspace);
        let elector = LeaderElector::new(
            backend.clone(),
            codec.lock_key(&settings.watcher.lock_name),
            settings.watcher.session_ttl(),
        );
        let classifier = EventClassifier::new(backend.clone(), codec.clone());
        let registry = Arc::new(WebhookRegistry::new(settings, backend.clone()));
        let matcher = WebhookMatcher::new(registry);
        let dispatcher = WebhookDispatcher::new(&settings.webhook)?;

        Ok(Self {
            backend,
            codec,
            elector,
            classifier,
            matcher,
            dispatcher,
            config: settings.watcher.clone(),
        })
    }

    /// Run until `shutdown` fires. Holds the watcher lock for as long as the
    /// backend lets it, and competes again after every lost term.
    pub async fn run(
        &self,
        shutdown: CancellationToken,
    ) {
        info!("Watcher supervisor started");
        loop {
            if shutdown.is_cancelled() {
                info!("Watcher supervisor stopped");
                return;
            }

            match self.elector.acquire(self.config.acquire_timeout()).await {
                Ok(lease) => match self.watch(&shutdown, lease).await {
                    SessionEnd::Cancelled => {
                        info!("Watcher supervisor stopped");
                        return;
                    }
                    SessionEnd::SessionLost | SessionEnd::FeedClosed => {
                        self.pause(&shutdown, self.config.relock_interval()).await;
                    }
                },
                Err(Error::Backend(BackendError::LockTimeout { .. })) => {
                    debug!("Watcher lock held elsewhere, will retry");
                    self.pause(&shutdown, self.config.retry_interval()).await;
                }
                Err(e) => {
                    error!("Failed to acquire watcher lock: {e}");
                    self.pause(&shutdown, self.config.retry_interval()).await;
                }
            }
        }
    }

    /// One leadership term: snapshot, subscribe, then pump the feed until the
    /// term or the process ends.
    async fn watch(
        &self,
        shutdown: &CancellationToken,
        mut lease: LeaderLease,
    ) -> SessionEnd {
        info!("Watcher leadership acquired, watching for changes");

        let kv_prefix = self.codec.kv_prefix();
        let mut cache = ShadowValueCache::load(self.backend.as_ref(), &kv_prefix, &self.codec).await;

        // Subscription lifetime is scoped to this session, not the process.
        let feed_scope = shutdown.child_token();
        let _feed_guard = feed_scope.clone().drop_guard();
        let mut feed = self.backend.subscribe(&kv_prefix, feed_scope);
        let expired = lease.expired();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, ending watch session");
                    lease.release().await;
                    return SessionEnd::Cancelled;
                }
                _ = expired.cancelled() => {
                    warn!("Watcher session expired, leadership lost");
                    lease.mark_lost();
                    return SessionEnd::SessionLost;
                }
                batch = feed.recv() => match batch {
                    Some(events) => {
                        for event in events {
                            self.process(&mut cache, event).await;
                        }
                    }
                    None => {
                        warn!("Change feed closed, ending watch session");
                        lease.release().await;
                        return SessionEnd::FeedClosed;
                    }
                },
            }
        }
    }

    /// Classify one mutation and fire deliveries for every matching webhook.
    async fn process(
        &self,
        cache: &mut ShadowValueCache,
        event: MutationEvent,
    ) {
        let Some(classified) = self.classifier.classify(cache, &event).await else {
            return;
        };

        let matches = self
            .matcher
            .matching(
                &classified.logical.namespace,
                &classified.logical.app_name,
                &classified.logical.key,
                classified.kind,
            )
            .await;
        if matches.is_empty() {
            return;
        }

        debug!(
            key = %classified.logical.key,
            kind = %classified.kind,
            webhooks = matches.len(),
            "Dispatching webhooks for change event"
        );
        for webhook in matches {
            self.dispatcher.dispatch(webhook, &classified);
        }
    }

    /// Cancellable sleep with a small random jitter so competing replicas
    /// don't hammer the lock in lockstep.
    async fn pause(
        &self,
        shutdown: &CancellationToken,
        base: Duration,
    ) {
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=250));
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(base + jitter) => {}
        }
    }
}
