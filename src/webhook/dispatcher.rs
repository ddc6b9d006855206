use reqwest::header::CONTENT_TYPE;
use reqwest::header::USER_AGENT;
use reqwest::Method;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::error;

use super::Webhook;
use crate::now_unix_secs;
use crate::ClassifiedEvent;
use crate::DeliveryError;
use crate::Result;
use crate::WebhookConfig;

/// Builds delivery payloads and performs the outbound webhook calls.
///
/// Each matched webhook is dispatched as its own fire-and-forget task: one
/// endpoint's slowness or failure never delays another delivery nor the watch
/// loop. Delivery is at-most-once; failures are logged and discarded.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    user_agent: String,
}

impl WebhookDispatcher {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.delivery_timeout())
            .build()
            .map_err(DeliveryError::Http)?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Fire one asynchronous delivery for a matched webhook. Never blocks and
    /// never fails the caller.
    pub fn dispatch(
        &self,
        webhook: Webhook,
        event: &ClassifiedEvent,
    ) {
        let payload = match build_payload(&webhook, event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    key = %event.logical.key,
                    endpoint = %webhook.endpoint,
                    "Error building webhook payload: {e}"
                );
                return;
            }
        };

        let client = self.client.clone();
        let user_agent = self.user_agent.clone();
        let key = event.logical.key.clone();
        tokio::spawn(async move {
            if let Err(e) = deliver(&client, &user_agent, &webhook, payload).await {
                error!(
                    key = %key,
                    endpoint = %webhook.endpoint,
                    "Error sending webhook: {e}"
                );
            }
        });
    }
}

/// Merge the webhook's custom payload with the nested `event` object. Returns
/// an empty body when neither applies.
pub(crate) fn build_payload(
    webhook: &Webhook,
    event: &ClassifiedEvent,
) -> Result<Vec<u8>> {
    let mut payload = Map::new();

    if let Some(custom) = &webhook.payload {
        for (k, v) in custom {
            payload.insert(k.clone(), v.clone());
        }
    }

    if webhook.add_event_data {
        payload.insert("event".to_string(), build_event_data(webhook, event));
    }

    if payload.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::to_vec(&Value::Object(payload)).map_err(|e| DeliveryError::Payload(e).into())
}

fn build_event_data(
    webhook: &Webhook,
    event: &ClassifiedEvent,
) -> Value {
    let mut data = Map::new();
    data.insert("event".to_string(), json!(event.kind.as_str()));
    data.insert("namespace".to_string(), json!(webhook.namespace));
    data.insert("appName".to_string(), json!(webhook.app_name));
    data.insert("key".to_string(), json!(event.logical.key));
    data.insert("timestamp".to_string(), json!(now_unix_secs()));

    match &event.value {
        Some(value) => {
            data.insert(
                "value".to_string(),
                json!(String::from_utf8_lossy(value).into_owned()),
            );
            if let Some(ttl) = event.ttl_seconds {
                data.insert("ttl".to_string(), json!(ttl));
                data.insert("expire_at".to_string(), json!(now_unix_secs() + ttl));
            }
        }
        None => {
            data.insert("value".to_string(), Value::Null);
        }
    }

    Value::Object(data)
}

/// One HTTP request to the webhook's endpoint: its configured method, JSON
/// content type, the fixed identifying user-agent, and any caller-supplied
/// headers overlaid. Bounded by the client's timeout; no retry.
async fn deliver(
    client: &reqwest::Client,
    user_agent: &str,
    webhook: &Webhook,
    payload: Vec<u8>,
) -> Result<()> {
    let method = Method::from_bytes(webhook.method.as_bytes())
        .map_err(|_| DeliveryError::InvalidMethod(webhook.method.clone()))?;

    let mut request = client
        .request(method, &webhook.endpoint)
        .header(CONTENT_TYPE, "application/json")
        .header(USER_AGENT, user_agent);
    for (name, value) in &webhook.headers {
        request = request.header(name, value);
    }

    let response = request.body(payload).send().await?;
    debug!(
        endpoint = %webhook.endpoint,
        status = %response.status(),
        "Webhook delivered"
    );
    Ok(())
}
