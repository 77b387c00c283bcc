//! Plugin-based provider registry
//!
//! The registry allows DNS providers to be registered dynamically at
//! runtime, avoiding hardcoded if-else chains on the `type` field.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dnsalias_core::registry::ProviderRegistry;
//! use dnsalias_core::secrets::EnvSecretProvider;
//!
//! // Built-in `memory` and `option` providers
//! let registry = ProviderRegistry::with_builtins();
//!
//! // In dnsalias-provider-cloudflare crate
//! dnsalias_provider_cloudflare::register(&registry);
//!
//! let fragment = serde_json::json!({ "type": "cloudflare", "apiToken": "@CF_TOKEN" });
//! let provider = registry.create_provider(&fragment, &EnvSecretProvider::new())?;
//! ```

use crate::error::{Error, Result};
use crate::providers::{MemoryProviderFactory, OptionProviderFactory};
use crate::secrets::SecretProvider;
use crate::traits::{DnsProvider, DnsProviderFactory};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Provider registry for plugin-based DNS provider creation
///
/// The registry maintains a map of provider type names to factory objects,
/// allowing dynamic instantiation of providers based on configuration.
/// Type names are matched case-insensitively.
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes. The lock is released before a factory runs,
/// so composite factories may call back into the registry.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Arc<dyn DnsProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in `memory` and `option` providers
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_provider("memory", Box::new(MemoryProviderFactory));
        registry.register_provider("option", Box::new(OptionProviderFactory));
        registry
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "cloudflare", "memory")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let name = name.into().to_lowercase();
        self.providers.write().insert(name, Arc::from(factory));
    }

    /// Create a DNS provider from its configuration fragment
    ///
    /// # Parameters
    ///
    /// - `config`: Provider fragment with a `type` field
    /// - `secrets`: Resolves `@NAME` references
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error)`: If the type is missing or not registered, or creation fails
    pub fn create_provider(
        &self,
        config: &Value,
        secrets: &dyn SecretProvider,
    ) -> Result<Arc<dyn DnsProvider>> {
        let provider_type = config
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::config("Missing required value: type"))?
            .to_lowercase();

        let factory = self
            .providers
            .read()
            .get(&provider_type)
            .cloned()
            .ok_or_else(|| {
                Error::undefined_option(format!("Provider type {} not known", provider_type))
            })?;

        factory.create(config, secrets, self)
    }

    /// List all registered provider types
    ///
    /// # Returns
    ///
    /// A vector of registered provider type names
    pub fn list_providers(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }

    /// Check if a provider type is registered
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name
    ///
    /// # Returns
    ///
    /// `true` if registered, `false` otherwise
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.read().contains_key(&name.to_lowercase())
    }
}
