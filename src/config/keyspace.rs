use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Key encoding parameters: the backend base prefix, namespace/app fallbacks,
/// and the length/size limits enforced on caller input.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KeyspaceConfig {
    /// First segment of every backend key, e.g. `/kvstore/kv/...`
    #[serde(default = "default_base_prefix")]
    pub base_prefix: String,

    /// Namespace used when the caller does not supply one
    #[serde(default = "default_scope_segment")]
    pub default_namespace: String,

    /// App name used when the caller does not supply one
    #[serde(default = "default_scope_segment")]
    pub default_app_name: String,

    /// Maximum namespace length in characters
    #[serde(default = "default_max_scope_len")]
    pub max_namespace_len: usize,

    /// Maximum app name length in characters
    #[serde(default = "default_max_scope_len")]
    pub max_app_name_len: usize,

    /// Maximum logical key length in characters
    #[serde(default = "default_max_key_len")]
    pub max_key_len: usize,

    /// Maximum value size in bytes
    #[serde(default = "default_max_value_size")]
    pub max_value_size: usize,

    /// TTL applied to writes that do not specify one; 0 means no expiration
    #[serde(default)]
    pub default_ttl_seconds: i64,

    /// Upper bound on caller-supplied TTLs
    #[serde(default = "default_max_ttl_seconds")]
    pub max_ttl_seconds: i64,
}

impl Default for KeyspaceConfig {
    fn default() -> Self {
        Self {
            base_prefix: default_base_prefix(),
            default_namespace: default_scope_segment(),
            default_app_name: default_scope_segment(),
            max_namespace_len: default_max_scope_len(),
            max_app_name_len: default_max_scope_len(),
            max_key_len: default_max_key_len(),
            max_value_size: default_max_value_size(),
            default_ttl_seconds: 0,
            max_ttl_seconds: default_max_ttl_seconds(),
        }
    }
}

impl KeyspaceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_prefix.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "base_prefix must not be empty".into(),
            )));
        }
        if self.base_prefix.contains('/') {
            return Err(Error::Config(ConfigError::Message(
                "base_prefix must not contain '/'".into(),
            )));
        }
        if self.max_namespace_len == 0 || self.max_app_name_len == 0 || self.max_key_len == 0 {
            return Err(Error::Config(ConfigError::Message(
                "length limits must be greater than 0".into(),
            )));
        }
        if self.default_ttl_seconds < 0 || self.default_ttl_seconds > self.max_ttl_seconds {
            return Err(Error::Config(ConfigError::Message(
                "default_ttl_seconds must be within [0, max_ttl_seconds]".into(),
            )));
        }
        Ok(())
    }
}

fn default_base_prefix() -> String {
    "kvstore".to_string()
}
fn default_scope_segment() -> String {
    "default".to_string()
}
fn default_max_scope_len() -> usize {
    25
}
fn default_max_key_len() -> usize {
    100
}
fn default_max_value_size() -> usize {
    1024 * 1024 // 1 MiB
}
fn default_max_ttl_seconds() -> i64 {
    365 * 24 * 60 * 60 // 1 year
}
