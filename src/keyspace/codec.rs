use crate::KeyspaceConfig;
use crate::Result;
use crate::ValidationError;

/// Backend key domain segment. A closed set: every backend key under the base
/// prefix belongs to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// Caller data
    Kv,
    /// Persisted webhook registrations
    Webhooks,
    /// Distributed lock records
    Locks,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Kv => "kv",
            Domain::Webhooks => "webhooks",
            Domain::Locks => "locks",
        }
    }
}

/// The caller-facing identifier, scoped by namespace and application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalKey {
    pub namespace: String,
    pub app_name: String,
    pub key: String,
}

/// Maps logical `(namespace, app, key)` triples to/from backend key strings.
///
/// Backend key format: `/{base_prefix}/{domain}/{namespace}/{app}/{key}`.
/// Within a domain the mapping is a total bijection; decoding a key outside
/// the expected prefix fails with [`ValidationError::PrefixMismatch`].
#[derive(Debug, Clone)]
pub struct KeyCodec {
    config: KeyspaceConfig,
}

impl KeyCodec {
    pub fn new(config: &KeyspaceConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Substitute configured defaults for empty scope segments and enforce
    /// length limits.
    pub fn resolve_scope(
        &self,
        namespace: &str,
        app_name: &str,
    ) -> Result<(String, String)> {
        let namespace = if namespace.is_empty() {
            self.config.default_namespace.clone()
        } else {
            namespace.to_string()
        };
        let app_name = if app_name.is_empty() {
            self.config.default_app_name.clone()
        } else {
            app_name.to_string()
        };

        if namespace.len() > self.config.max_namespace_len {
            return Err(ValidationError::NamespaceTooLong {
                max: self.config.max_namespace_len,
                actual: namespace.len(),
            }
            .into());
        }
        if app_name.len() > self.config.max_app_name_len {
            return Err(ValidationError::AppNameTooLong {
                max: self.config.max_app_name_len,
                actual: app_name.len(),
            }
            .into());
        }
        Ok((namespace, app_name))
    }

    /// Encode a logical key into its backend key string.
    pub fn encode(
        &self,
        domain: Domain,
        namespace: &str,
        app_name: &str,
        key: &str,
    ) -> Result<String> {
        if key.is_empty() {
            return Err(ValidationError::EmptyKey.into());
        }
        if key.len() > self.config.max_key_len {
            return Err(ValidationError::KeyTooLong {
                max: self.config.max_key_len,
                actual: key.len(),
            }
            .into());
        }
        let prefix = self.scope_prefix(domain, namespace, app_name)?;
        Ok(format!("{prefix}{key}"))
    }

    /// Recover the logical key from a backend key, verifying that it lives
    /// under the prefix implied by the expected namespace/app.
    pub fn decode(
        &self,
        backend_key: &str,
        namespace: &str,
        app_name: &str,
    ) -> Result<String> {
        let prefix = self.scope_prefix(Domain::Kv, namespace, app_name)?;
        match backend_key.strip_prefix(&prefix) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(ValidationError::PrefixMismatch {
                key: backend_key.to_string(),
                expected_prefix: prefix,
            }
            .into()),
        }
    }

    /// Backend key prefix covering one `(namespace, app)` scope of a domain,
    /// trailing separator included.
    pub fn scope_prefix(
        &self,
        domain: Domain,
        namespace: &str,
        app_name: &str,
    ) -> Result<String> {
        let (namespace, app_name) = self.resolve_scope(namespace, app_name)?;
        Ok(format!(
            "/{}/{}/{}/{}/",
            self.config.base_prefix,
            domain.as_str(),
            namespace,
            app_name
        ))
    }

    /// Backend key prefix covering a whole domain.
    pub fn domain_prefix(
        &self,
        domain: Domain,
    ) -> String {
        format!("/{}/{}/", self.config.base_prefix, domain.as_str())
    }

    /// The prefix the watcher subscribes to.
    pub fn kv_prefix(&self) -> String {
        self.domain_prefix(Domain::Kv)
    }

    /// Backend key for a named distributed lock.
    pub fn lock_key(
        &self,
        name: &str,
    ) -> String {
        format!("{}{}", self.domain_prefix(Domain::Locks), name)
    }

    /// Split a kv-domain backend key back into its logical parts.
    ///
    /// Returns `None` for keys outside the kv domain or with too few
    /// segments; the watcher silently skips those.
    pub fn split(
        &self,
        backend_key: &str,
    ) -> Option<LogicalKey> {
        let rest = backend_key.strip_prefix(&self.kv_prefix())?;
        let mut parts = rest.splitn(3, '/');
        let namespace = parts.next()?.to_string();
        let app_name = parts.next()?.to_string();
        let key = parts.next()?.to_string();
        if namespace.is_empty() || app_name.is_empty() || key.is_empty() {
            return None;
        }
        Some(LogicalKey {
            namespace,
            app_name,
            key,
        })
    }

    /// True for keys under the webhook or lock domains. The watcher must not
    /// classify mutations on these.
    pub fn is_reserved(
        &self,
        backend_key: &str,
    ) -> bool {
        backend_key.starts_with(&self.domain_prefix(Domain::Webhooks))
            || backend_key.starts_with(&self.domain_prefix(Domain::Locks))
    }
}
