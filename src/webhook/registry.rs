use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::warn;

use crate::now_unix_secs;
use crate::Domain;
use crate::KeyCodec;
use crate::KvBackend;
use crate::RegistryError;
use crate::Result;
use crate::Settings;
use crate::ValidationError;

const VALID_METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "HEAD"];
const DEFAULT_METHOD: &str = "POST";

/// The change kinds a webhook can subscribe to. Closed set so match passes
/// are exhaustiveness-checked at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        }
    }

    /// Case-insensitive parse of a caller-supplied event kind.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "create" => Ok(EventKind::Create),
            "update" => Ok(EventKind::Update),
            "delete" => Ok(EventKind::Delete),
            _ => Err(ValidationError::InvalidEventKind(s.to_string()).into()),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored webhook registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Webhook {
    pub id: String,
    pub namespace: String,
    #[serde(rename = "appName")]
    pub app_name: String,
    /// Key pattern: exact logical key, or prefix with trailing `*`
    pub key: String,
    pub event: EventKind,
    /// Delivery target URL
    pub endpoint: String,
    /// HTTP method for delivery
    pub method: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Caller-defined fields merged into every delivery payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,
    #[serde(rename = "add_event_data", default)]
    pub add_event_data: bool,
    #[serde(rename = "created_at")]
    pub created_at: i64,
}

/// A webhook registration request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookRegistration {
    pub key: String,
    pub event: String,
    pub endpoint: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
    #[serde(rename = "add_event_data", default)]
    pub add_event_data: bool,
}

/// Partial update of an existing webhook; unset fields keep their values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookUpdate {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
    #[serde(rename = "add_event_data", default)]
    pub add_event_data: Option<bool>,
}

/// CRUD access to persisted webhook registrations.
///
/// Records live under the reserved `webhooks` domain, one JSON document per
/// registration, keyed by a generated opaque ID.
pub struct WebhookRegistry {
    backend: Arc<dyn KvBackend>,
    codec: KeyCodec,
}

impl WebhookRegistry {
    pub fn new(
        settings: &Settings,
        backend: Arc<dyn KvBackend>,
    ) -> Self {
        Self {
            backend,
            codec: KeyCodec::new(&settings.keyspace),
        }
    }

    /// Validate and persist a new registration. Returns the stored record
    /// with its generated ID.
    pub async fn register(
        &self,
        namespace: &str,
        app_name: &str,
        registration: WebhookRegistration,
    ) -> Result<Webhook> {
        if registration.key.is_empty() {
            return Err(ValidationError::EmptyField("Key").into());
        }
        if registration.event.is_empty() {
            return Err(ValidationError::EmptyField("Event").into());
        }
        if registration.endpoint.is_empty() {
            return Err(ValidationError::EmptyField("Endpoint").into());
        }
        let event = EventKind::parse(&registration.event)?;
        let method = validate_method(registration.method.as_deref())?;
        let (namespace, app_name) = self.codec.resolve_scope(namespace, app_name)?;

        let webhook = Webhook {
            id: nanoid::nanoid!(),
            namespace,
            app_name,
            key: registration.key,
            event,
            endpoint: registration.endpoint,
            method,
            headers: registration.headers,
            payload: registration.payload,
            add_event_data: registration.add_event_data,
            created_at: now_unix_secs(),
        };
        self.persist(&webhook).await?;
        Ok(webhook)
    }

    /// Look up one registration by ID.
    pub async fn get(
        &self,
        namespace: &str,
        app_name: &str,
        id: &str,
    ) -> Result<Webhook> {
        let record_key = self
            .codec
            .encode(Domain::Webhooks, namespace, app_name, id)?;
        let record = self
            .backend
            .get(&record_key)
            .await?
            .ok_or(RegistryError::NotFound)?;
        let webhook = serde_json::from_slice::<Webhook>(&record.value)
            .map_err(RegistryError::Corrupt)?;
        Ok(webhook)
    }

    /// All registrations for one `(namespace, app)` scope. Corrupt stored
    /// records are skipped, never fatal.
    pub async fn list(
        &self,
        namespace: &str,
        app_name: &str,
    ) -> Result<Vec<Webhook>> {
        let prefix = self
            .codec
            .scope_prefix(Domain::Webhooks, namespace, app_name)?;
        let records = self.backend.get_prefix(&prefix).await?;

        let mut webhooks = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_slice::<Webhook>(&record.value) {
                Ok(webhook) => webhooks.push(webhook),
                Err(e) => {
                    warn!(key = %record.key, "Skipping corrupt webhook record: {e}");
                }
            }
        }
        Ok(webhooks)
    }

    /// Registrations whose stored key pattern matches the queried pattern.
    pub async fn find_by_pattern(
        &self,
        namespace: &str,
        app_name: &str,
        pattern: &str,
    ) -> Result<Vec<Webhook>> {
        let webhooks = self.list(namespace, app_name).await?;
        Ok(webhooks
            .into_iter()
            .filter(|webhook| super::key_matches(pattern, &webhook.key))
            .collect())
    }

    /// Apply a partial update to an existing registration.
    pub async fn update(
        &self,
        namespace: &str,
        app_name: &str,
        id: &str,
        update: WebhookUpdate,
    ) -> Result<Webhook> {
        let mut webhook = self.get(namespace, app_name, id).await?;

        if let Some(key) = update.key {
            if !key.is_empty() {
                webhook.key = key;
            }
        }
        if let Some(event) = update.event {
            if !event.is_empty() {
                webhook.event = EventKind::parse(&event)?;
            }
        }
        if let Some(endpoint) = update.endpoint {
            if !endpoint.is_empty() {
                webhook.endpoint = endpoint;
            }
        }
        if let Some(method) = update.method {
            if !method.is_empty() {
                webhook.method = validate_method(Some(&method))?;
            }
        }
        if let Some(headers) = update.headers {
            webhook.headers = headers;
        }
        if let Some(payload) = update.payload {
            webhook.payload = Some(payload);
        }
        if let Some(add_event_data) = update.add_event_data {
            webhook.add_event_data = add_event_data;
        }

        self.persist(&webhook).await?;
        Ok(webhook)
    }

    /// Remove a registration. Returns [`RegistryError::NotFound`] if no such
    /// record exists.
    pub async fn remove(
        &self,
        namespace: &str,
        app_name: &str,
        id: &str,
    ) -> Result<()> {
        let record_key = self
            .codec
            .encode(Domain::Webhooks, namespace, app_name, id)?;
        if !self.backend.delete(&record_key).await? {
            return Err(RegistryError::NotFound.into());
        }
        Ok(())
    }

    async fn persist(
        &self,
        webhook: &Webhook,
    ) -> Result<()> {
        let record_key = self.codec.encode(
            Domain::Webhooks,
            &webhook.namespace,
            &webhook.app_name,
            &webhook.id,
        )?;
        let document = serde_json::to_vec(webhook).map_err(RegistryError::Corrupt)?;
        self.backend
            .put(&record_key, Bytes::from(document), None)
            .await
    }
}

/// Normalize and validate an HTTP method, falling back to the default.
fn validate_method(method: Option<&str>) -> Result<String> {
    match method {
        None | Some("") => Ok(DEFAULT_METHOD.to_string()),
        Some(m) => {
            let upper = m.to_uppercase();
            if VALID_METHODS.contains(&upper.as_str()) {
                Ok(upper)
            } else {
                Err(ValidationError::InvalidMethod(m.to_string()).into())
            }
        }
    }
}
