// # Option DNS Provider
//
// Routes zone lookups to one of several nested providers.
//
// ## Configuration
//
// ```json
// {
//   "type": "option",
//   "options": [
//     { "type": "cloudflare", "apiToken": "@CF_TOKEN", "zones": ["contoso.com"] },
//     { "type": "memory", "zones": ["lab.local"] },
//     { "type": "cloudflare", "apiToken": "@CF_OTHER" }
//   ]
// }
// ```
//
// An option with `zones` serves exactly those apexes. At most one option
// may omit `zones`; it serves everything else.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::registry::ProviderRegistry;
use crate::secrets::SecretProvider;
use crate::traits::{DnsProvider, DnsProviderFactory, DnsZone};
use crate::{Error, Result};

/// Composite provider dispatching by zone apex
pub struct OptionDnsProvider {
    by_zone: HashMap<String, Arc<dyn DnsProvider>>,
    default: Option<Arc<dyn DnsProvider>>,
}

impl OptionDnsProvider {
    /// Create a provider without routes
    pub fn new() -> Self {
        Self {
            by_zone: HashMap::new(),
            default: None,
        }
    }

    /// Route the given zones to `provider`
    pub fn with_zones<I, S>(mut self, zones: I, provider: Arc<dyn DnsProvider>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for zone in zones {
            self.by_zone
                .insert(zone.as_ref().to_lowercase(), provider.clone());
        }
        self
    }

    /// Set the provider for zones without an explicit route
    pub fn with_default(mut self, provider: Arc<dyn DnsProvider>) -> Result<Self> {
        if self.default.is_some() {
            return Err(Error::config("Multiple options are declared as default."));
        }
        self.default = Some(provider);
        Ok(self)
    }

    fn route(&self, apex: &str) -> Option<&Arc<dyn DnsProvider>> {
        self.by_zone
            .get(&apex.to_lowercase())
            .or(self.default.as_ref())
    }
}

impl Default for OptionDnsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DnsProvider for OptionDnsProvider {
    async fn get_zone(&self, apex: &str) -> Result<Option<Arc<dyn DnsZone>>> {
        match self.route(apex) {
            Some(provider) => provider.get_zone(apex).await,
            None => {
                tracing::debug!("No option routes zone {}", apex);
                Ok(None)
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "option"
    }
}

/// Factory for creating option providers
///
/// Nested options are built through the same registry, so any registered
/// type (including `option`) may appear inside `options`.
pub struct OptionProviderFactory;

impl DnsProviderFactory for OptionProviderFactory {
    fn create(
        &self,
        config: &Value,
        secrets: &dyn SecretProvider,
        registry: &ProviderRegistry,
    ) -> Result<Arc<dyn DnsProvider>> {
        let options = config
            .get("options")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::config("Missing required value: options"))?;

        let mut provider = OptionDnsProvider::new();
        for (index, option) in options.iter().enumerate() {
            let nested = registry.create_provider(option, secrets)?;

            provider = match option.get("zones") {
                None | Some(Value::Null) => provider.with_default(nested)?,
                Some(Value::Array(zones)) => {
                    let zones = zones
                        .iter()
                        .map(|zone| {
                            zone.as_str().ok_or_else(|| {
                                Error::config(format!("options[{}].zones must be strings", index))
                            })
                        })
                        .collect::<Result<Vec<&str>>>()?;
                    provider.with_zones(zones, nested)
                }
                Some(_) => {
                    return Err(Error::config(format!(
                        "options[{}].zones must be an array",
                        index
                    )));
                }
            };
        }

        Ok(Arc::new(provider))
    }
}
