use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Leader election and watch loop timing.
///
/// The session TTL bounds how long a crashed holder keeps the watcher lock;
/// the retry/relock intervals pace the supervisor's outer loop so it never
/// hot-loops against the backend.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatcherConfig {
    /// Name of the distributed lock that elects the active watcher
    #[serde(default = "default_lock_name")]
    pub lock_name: String,

    /// Lock session TTL in seconds; the backend auto-releases the lock this
    /// long after the holder stops renewing
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,

    /// Bounded wait for each lock acquisition attempt
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Sleep after a failed acquisition attempt
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Sleep after a watch session ends before re-attempting acquisition
    #[serde(default = "default_relock_interval_ms")]
    pub relock_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            lock_name: default_lock_name(),
            session_ttl_seconds: default_session_ttl(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            relock_interval_ms: default_relock_interval_ms(),
        }
    }
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lock_name.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "lock_name must not be empty".into(),
            )));
        }
        if self.session_ttl_seconds == 0 {
            return Err(Error::Config(ConfigError::Message(
                "session_ttl_seconds must be greater than 0".into(),
            )));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "acquire_timeout_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn relock_interval(&self) -> Duration {
        Duration::from_millis(self.relock_interval_ms)
    }
}

fn default_lock_name() -> String {
    "watcher".to_string()
}
fn default_session_ttl() -> u64 {
    10
}
fn default_acquire_timeout_ms() -> u64 {
    5_000
}
fn default_retry_interval_ms() -> u64 {
    5_000
}
fn default_relock_interval_ms() -> u64 {
    2_000
}
