use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Outbound webhook delivery parameters.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Per-request delivery timeout
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    /// Fixed identifying User-Agent on every delivery
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: default_delivery_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl WebhookConfig {
    pub fn validate(&self) -> Result<()> {
        if self.delivery_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "delivery_timeout_ms must be greater than 0".into(),
            )));
        }
        if self.user_agent.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "user_agent must not be empty".into(),
            )));
        }
        Ok(())
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

fn default_delivery_timeout_ms() -> u64 {
    10_000
}
fn default_user_agent() -> String {
    "keywatch".to_string()
}
