//! Error hierarchy for the keywatch subsystems.
//!
//! Errors are categorized by concern: request validation, coordination-backend
//! failures, webhook registry access, and outbound delivery. Nothing in this
//! hierarchy is meant to terminate the hosting process; the watcher supervisor
//! retries backend failures with backoff and delivery failures are logged and
//! discarded.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed keys, namespaces, values, or webhook registrations
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Coordination/storage backend failures
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Webhook registry access failures
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Outbound webhook delivery failures
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Configuration loading/validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors surfaced to the plain CRUD caller for malformed input.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Key must not be empty")]
    EmptyKey,

    #[error("Namespace too long (max {max} characters, got {actual})")]
    NamespaceTooLong { max: usize, actual: usize },

    #[error("App name too long (max {max} characters, got {actual})")]
    AppNameTooLong { max: usize, actual: usize },

    #[error("Key too long (max {max} characters, got {actual})")]
    KeyTooLong { max: usize, actual: usize },

    #[error("Value too large (max {max} bytes, got {actual})")]
    ValueTooLarge { max: usize, actual: usize },

    #[error("TTL must be between 0 and {max} seconds (got {actual})")]
    TtlOutOfRange { max: i64, actual: i64 },

    /// Backend key does not live under the prefix implied by the expected
    /// namespace/app
    #[error("Backend key '{key}' does not start with expected prefix '{expected_prefix}'")]
    PrefixMismatch { key: String, expected_prefix: String },

    #[error("Event must be one of: create, update, delete (got '{0}')")]
    InvalidEventKind(String),

    #[error("Invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Backend unreachable or operation rejected; retried with backoff by the
    /// watcher supervisor, never fatal
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Bounded lock acquisition expired without obtaining the lock
    #[error("Timed out acquiring lock '{name}' after {timeout:?}")]
    LockTimeout { name: String, timeout: Duration },

    /// The lock session was declared dead by the backend; treated as a normal
    /// re-election trigger
    #[error("Lock session expired")]
    SessionExpired,

    #[error("Lease {0} not found")]
    LeaseNotFound(u64),

    /// The change feed channel closed (cancellation or backend disconnect)
    #[error("Change feed closed")]
    FeedClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Webhook not found")]
    NotFound,

    /// Stored webhook record failed to deserialize
    #[error("Corrupt webhook record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid HTTP method '{0}' on stored webhook")]
    InvalidMethod(String),

    #[error("Failed to serialize delivery payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Request failed or timed out; logged and discarded, no retry
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

// ============== Conversion Implementations ============== //
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Registry(RegistryError::Corrupt(e))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Delivery(DeliveryError::Http(e))
    }
}
