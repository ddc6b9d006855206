//! Configuration management for the keywatch service.
//!
//! Provides hierarchical configuration loading with priority:
//! 1. Default values (hardcoded)
//! 2. Optional config file
//! 3. Environment variables (highest priority)
//!
//! The resulting [`Settings`] struct is constructed once at startup and passed
//! by reference into every component constructor; core logic never performs
//! ambient process-wide lookups.

mod keyspace;
mod watcher;
mod webhook;


pub use keyspace::*;
pub use watcher::*;
pub use webhook::*;

//---
use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix, e.g. `KEYWATCH__KEYSPACE__MAX_KEY_LEN=64`.
const ENV_PREFIX: &str = "KEYWATCH";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Key encoding: base prefix, namespace/app defaults and limits
    #[serde(default)]
    pub keyspace: KeyspaceConfig,

    /// Leader election and watch loop timing
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Outbound webhook delivery parameters
    #[serde(default)]
    pub webhook: WebhookConfig,
}

impl Settings {
    /// Load configuration from defaults, an optional file, and environment
    /// variables, in that priority order.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize::<Settings>()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates all subsystem configurations
    pub fn validate(&self) -> Result<()> {
        self.keyspace.validate()?;
        self.watcher.validate()?;
        self.webhook.validate()?;
        Ok(())
    }
}
