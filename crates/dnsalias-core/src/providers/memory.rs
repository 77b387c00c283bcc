// # Memory DNS Provider
//
// In-memory implementation of DnsProvider.
//
// ## Purpose
//
// Serves a fixed set of zones from a HashMap. Nothing is persisted and
// nothing leaves the process. Useful for testing and for dry runs of a
// configuration before pointing it at a real provider.
//
// ## Configuration
//
// ```json
// { "type": "memory", "zones": ["contoso.com"], "negativeTtl": 300 }
// ```

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::alias::APEX;
use crate::registry::ProviderRegistry;
use crate::secrets::SecretProvider;
use crate::traits::{DnsProvider, DnsProviderFactory, DnsRecord, DnsZone, RecordType};
use crate::{Error, Result};

/// Default negative TTL for memory zones (5 minutes)
const DEFAULT_NEGATIVE_TTL: u32 = 300;

/// One in-memory zone
///
/// Records are keyed by lower-cased relative name and type; each key
/// holds one record set.
///
/// # Example
///
/// ```rust,no_run
/// use dnsalias_core::providers::MemoryZone;
/// use dnsalias_core::traits::{DnsRecord, DnsZone, RecordType};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let zone = MemoryZone::new("contoso.com", 300);
///
///     zone.create_record(&DnsRecord::a("www", ["10.0.0.1".parse()?], None), true).await?;
///
///     let records = zone.find_records("www", RecordType::A).await?;
///     assert_eq!(records[0].values, vec!["10.0.0.1"]);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryZone {
    apex: String,
    negative_ttl: u32,
    inner: Arc<RwLock<HashMap<(String, RecordType), DnsRecord>>>,
}

impl MemoryZone {
    /// Create an empty zone
    pub fn new(apex: impl Into<String>, negative_ttl: u32) -> Self {
        Self {
            apex: apex.into().to_lowercase(),
            negative_ttl,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Zone apex
    pub fn apex(&self) -> &str {
        &self.apex
    }

    /// Get the number of record sets in the zone
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the zone is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    fn key(name: &str, record_type: RecordType) -> (String, RecordType) {
        let name = if name.is_empty() { APEX } else { name };
        (name.to_lowercase(), record_type)
    }
}

#[async_trait]
impl DnsZone for MemoryZone {
    async fn find_records(&self, name: &str, record_type: RecordType) -> Result<Vec<DnsRecord>> {
        let guard = self.inner.read().await;
        Ok(guard
            .get(&Self::key(name, record_type))
            .cloned()
            .into_iter()
            .collect())
    }

    async fn create_record(&self, record: &DnsRecord, overwrite: bool) -> Result<()> {
        let key = Self::key(&record.name, record.record_type);
        let mut guard = self.inner.write().await;

        match guard.get_mut(&key) {
            Some(existing) if !overwrite => {
                for value in &record.values {
                    if !existing.values.contains(value) {
                        existing.values.push(value.clone());
                    }
                }
                if record.ttl.is_some() {
                    existing.ttl = record.ttl;
                }
            }
            _ => {
                let mut stored = record.clone();
                stored.name = key.0.clone();
                guard.insert(key, stored);
            }
        }
        Ok(())
    }

    async fn delete_record(&self, name: &str, record_type: RecordType) -> Result<bool> {
        let mut guard = self.inner.write().await;
        Ok(guard.remove(&Self::key(name, record_type)).is_some())
    }

    async fn negative_ttl(&self) -> Result<u32> {
        Ok(self.negative_ttl)
    }
}

/// In-memory DNS provider serving a fixed set of zones
#[derive(Debug, Clone, Default)]
pub struct MemoryDnsProvider {
    zones: HashMap<String, MemoryZone>,
}

impl MemoryDnsProvider {
    /// Create a provider without zones
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a zone, replacing any zone with the same apex
    pub fn with_zone(mut self, zone: MemoryZone) -> Self {
        self.zones.insert(zone.apex().to_string(), zone);
        self
    }

    /// Direct access to a zone, for inspection
    pub fn zone(&self, apex: &str) -> Option<&MemoryZone> {
        self.zones.get(&apex.to_lowercase())
    }
}

#[async_trait]
impl DnsProvider for MemoryDnsProvider {
    async fn get_zone(&self, apex: &str) -> Result<Option<Arc<dyn DnsZone>>> {
        Ok(self
            .zone(apex)
            .map(|zone| Arc::new(zone.clone()) as Arc<dyn DnsZone>))
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemoryProviderConfig {
    #[serde(default)]
    zones: Vec<String>,
    #[serde(default)]
    negative_ttl: Option<u32>,
}

/// Factory for creating memory providers
pub struct MemoryProviderFactory;

impl DnsProviderFactory for MemoryProviderFactory {
    fn create(
        &self,
        config: &Value,
        _secrets: &dyn SecretProvider,
        _registry: &ProviderRegistry,
    ) -> Result<Arc<dyn DnsProvider>> {
        let config: MemoryProviderConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::config(format!("Invalid memory provider: {}", e)))?;

        let negative_ttl = config.negative_ttl.unwrap_or(DEFAULT_NEGATIVE_TTL);
        let provider = config
            .zones
            .into_iter()
            .fold(MemoryDnsProvider::new(), |provider, apex| {
                provider.with_zone(MemoryZone::new(apex, negative_ttl))
            });

        Ok(Arc::new(provider))
    }
}
