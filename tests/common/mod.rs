use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use keywatch::KvStore;
use keywatch::MemoryBackend;
use keywatch::Settings;
use keywatch::WatcherSupervisor;
use keywatch::Webhook;
use keywatch::WebhookRegistration;
use keywatch::WebhookRegistry;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use warp::Filter;

pub const LOCK_KEY: &str = "/kvstore/locks/watcher";

const DELIVERY_WAIT: Duration = Duration::from_secs(5);

pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.watcher.session_ttl_seconds = 1;
    settings.watcher.acquire_timeout_ms = 200;
    settings.watcher.retry_interval_ms = 50;
    settings.watcher.relock_interval_ms = 50;
    settings
}

/// One captured webhook delivery.
#[derive(Debug)]
pub struct Delivery {
    pub path: String,
    pub body: Value,
}

/// Local HTTP receiver on an ephemeral port recording every JSON request.
pub fn spawn_delivery_receiver() -> (String, mpsc::Receiver<Delivery>) {
    let (tx, rx) = mpsc::channel(32);
    let route = warp::any()
        .and(warp::path::full())
        .and(warp::body::json())
        .and_then(move |path: warp::path::FullPath, body: Value| {
            let tx = tx.clone();
            async move {
                let _ = tx
                    .send(Delivery {
                        path: path.as_str().to_string(),
                        body,
                    })
                    .await;
                Ok::<_, warp::Rejection>(warp::reply())
            }
        });

    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    (format!("http://{addr}"), rx)
}

/// A running watcher with its backend, stores, and a delivery receiver.
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub store: KvStore,
    pub registry: WebhookRegistry,
    pub endpoint: String,
    pub deliveries: mpsc::Receiver<Delivery>,
    shutdown: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
    probe_seq: u64,
}

impl Harness {
    pub async fn start() -> Self {
        let settings = fast_settings();
        let backend = Arc::new(MemoryBackend::new());
        let (endpoint, deliveries) = spawn_delivery_receiver();

        let store = KvStore::new(&settings, backend.clone());
        let registry = WebhookRegistry::new(&settings, backend.clone());
        let supervisor =
            WatcherSupervisor::new(&settings, backend.clone()).expect("supervisor should construct");

        let shutdown = CancellationToken::new();
        let task = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                supervisor.run(shutdown).await;
            })
        };

        let mut harness = Self {
            backend,
            store,
            registry,
            endpoint,
            deliveries,
            shutdown,
            task: Some(task),
            probe_seq: 0,
        };
        harness.await_watching().await;
        harness
    }

    /// Register a webhook delivering to the local receiver under `path`.
    pub async fn register(
        &self,
        namespace: &str,
        app_name: &str,
        key: &str,
        event: &str,
        path: &str,
    ) -> Webhook {
        self.registry
            .register(
                namespace,
                app_name,
                WebhookRegistration {
                    key: key.to_string(),
                    event: event.to_string(),
                    endpoint: format!("{}{path}", self.endpoint),
                    add_event_data: true,
                    ..Default::default()
                },
            )
            .await
            .expect("webhook registration should succeed")
    }

    pub async fn put(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) {
        self.store
            .put(namespace, "app", key, Bytes::copy_from_slice(value.as_bytes()), None)
            .await
            .expect("put should succeed");
    }

    pub async fn delete(
        &self,
        namespace: &str,
        key: &str,
    ) {
        self.store
            .delete(namespace, "app", key)
            .await
            .expect("delete should succeed");
    }

    pub async fn next_delivery(&mut self) -> Delivery {
        tokio::time::timeout(DELIVERY_WAIT, self.deliveries.recv())
            .await
            .expect("expected a webhook delivery in time")
            .expect("delivery receiver should stay open")
    }

    pub async fn expect_no_delivery(
        &mut self,
        window: Duration,
    ) {
        if let Ok(Some(delivery)) = tokio::time::timeout(window, self.deliveries.recv()).await {
            panic!("unexpected delivery: {delivery:?}");
        }
    }

    /// Block until the watcher is provably consuming the change feed.
    ///
    /// Leadership alone is not enough: the session subscribes shortly after
    /// taking the lock, so mutations issued in that window would be missed.
    /// A probe webhook in its own scope is poked until a delivery comes back.
    pub async fn await_watching(&mut self) {
        if self.probe_seq == 0 {
            self.register("probe", "app", "probe*", "create", "/probe").await;
        }

        for _ in 0..50 {
            self.probe_seq += 1;
            let key = format!("probe{}", self.probe_seq);
            self.put("probe", &key, "1").await;

            match tokio::time::timeout(Duration::from_millis(500), self.deliveries.recv()).await {
                Ok(Some(delivery)) if delivery.path == "/probe" => {
                    self.drain().await;
                    return;
                }
                _ => {}
            }
        }
        panic!("watcher never started consuming the change feed");
    }

    /// Discard stragglers from earlier probes.
    async fn drain(&mut self) {
        tokio::time::sleep(Duration::from_millis(250)).await;
        while self.deliveries.try_recv().is_ok() {}
    }

    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            tokio::time::timeout(Duration::from_secs(2), task)
                .await
                .expect("supervisor should stop on cancellation")
                .unwrap();
        }
    }
}
