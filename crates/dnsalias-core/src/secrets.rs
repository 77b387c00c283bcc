//! Secret substitution for configuration fragments
//!
//! String values of the form `@NAME` inside provider and alert
//! configuration are looked up through a [`SecretProvider`] instead of
//! being used literally. This keeps API tokens out of the config file.

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Source of named secrets
pub trait SecretProvider: Send + Sync {
    /// Look up a secret by id, `None` if it is not defined
    fn secret(&self, id: &str) -> Option<String>;
}

/// Reads secrets from environment variables
///
/// With a prefix of `DNSALIAS_`, the reference `@CF_TOKEN` reads the
/// variable `DNSALIAS_CF_TOKEN`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider {
    prefix: String,
}

impl EnvSecretProvider {
    /// Create a provider reading unprefixed variables
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider that prepends `prefix` to every id
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl SecretProvider for EnvSecretProvider {
    fn secret(&self, id: &str) -> Option<String> {
        std::env::var(format!("{}{}", self.prefix, id)).ok()
    }
}

/// Fixed in-memory secrets
#[derive(Debug, Clone, Default)]
pub struct StaticSecretProvider {
    secrets: HashMap<String, String>,
}

impl StaticSecretProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret
    pub fn with(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(id.into(), value.into());
        self
    }
}

impl SecretProvider for StaticSecretProvider {
    fn secret(&self, id: &str) -> Option<String> {
        self.secrets.get(id).cloned()
    }
}

/// Resolve a single configuration string
///
/// Values starting with `@` are secret references; anything else is
/// returned unchanged.
pub fn resolve_secret(value: &str, secrets: &dyn SecretProvider) -> Result<String> {
    match value.strip_prefix('@') {
        Some(id) if !id.is_empty() => secrets
            .secret(id)
            .ok_or_else(|| Error::secret(format!("Secret {} is not defined", id))),
        _ => Ok(value.to_string()),
    }
}

/// Required string field of a configuration object, with secret substitution
pub fn required_secret_string(
    config: &Value,
    key: &str,
    secrets: &dyn SecretProvider,
) -> Result<String> {
    let raw = config
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::config(format!("Missing required value: {}", key)))?;

    resolve_secret(raw, secrets)
}

/// Optional string field of a configuration object, with secret substitution
pub fn optional_secret_string(
    config: &Value,
    key: &str,
    secrets: &dyn SecretProvider,
) -> Result<Option<String>> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => resolve_secret(raw, secrets).map(Some),
        Some(_) => Err(Error::config(format!("Value {} must be a string", key))),
    }
}
