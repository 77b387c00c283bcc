// # DNS Provider Trait
//
// Defines the interface for reading and writing records in a managed zone.
//
// ## Implementations
//
// - Cloudflare: `dnsalias-provider-cloudflare` crate
// - Route53: `dnsalias-provider-route53` crate
// - Memory: `providers::memory` (in-process zones)
// - Option: `providers::option` (routes zones to nested providers)
//
// ## Usage
//
// ```rust,ignore
// use dnsalias_core::traits::{DnsProvider, DnsRecord, RecordType};
//
// let zone = provider.get_zone("contoso.com").await?.expect("zone exists");
//
// let current = zone.find_records("portal", RecordType::A).await?;
// zone.create_record(&DnsRecord::a("portal", ["10.0.0.5".parse()?], Some(300)), true).await?;
// ```

use crate::registry::ProviderRegistry;
use crate::secrets::SecretProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// A record (IPv4)
    A,
    /// AAAA record (IPv6)
    Aaaa,
    /// TXT record
    Txt,
}

impl RecordType {
    /// Wire name, e.g. `A`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Txt => "TXT",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record set: every value for one name and type
///
/// Providers that store one value per record bundle them into a single
/// `DnsRecord` with several values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    /// Name relative to the zone, `@` for the apex
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Values in their text form
    pub values: Vec<String>,
    /// Positive TTL in seconds, `None` for the zone default
    pub ttl: Option<u32>,
}

impl DnsRecord {
    /// Build an A record set
    pub fn a(
        name: impl Into<String>,
        addresses: impl IntoIterator<Item = Ipv4Addr>,
        ttl: Option<u32>,
    ) -> Self {
        Self {
            name: name.into(),
            record_type: RecordType::A,
            values: addresses.into_iter().map(|a| a.to_string()).collect(),
            ttl,
        }
    }

    /// Values parsed as IPv4 addresses, ignoring anything unparseable
    pub fn ipv4_values(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.values.iter().filter_map(|v| v.parse().ok())
    }
}

/// Handle on one managed zone
///
/// # Thread Safety
///
/// Zones are shared by every alias writing into them and must be usable
/// from concurrent tasks. Retries are the caller's concern: a failed
/// call returns its error and the scheduler rechecks later.
#[async_trait]
pub trait DnsZone: Send + Sync {
    /// Find all records matching a name and type
    ///
    /// # Parameters
    ///
    /// - `name`: Name relative to the zone, `""` or `"@"` for the apex
    /// - `record_type`: Record type
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<DnsRecord>)`: Matching record sets, empty if none
    /// - `Err(Error)`: If the provider API failed
    async fn find_records(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Create a record set
    ///
    /// With `overwrite`, every existing value of the same name and type is
    /// replaced; otherwise the values are added next to the existing ones.
    async fn create_record(&self, record: &DnsRecord, overwrite: bool) -> Result<(), crate::Error>;

    /// Delete every record matching a name and type
    ///
    /// # Returns
    ///
    /// `true` if anything was deleted
    async fn delete_record(&self, name: &str, record_type: RecordType) -> Result<bool, crate::Error>;

    /// Seconds a missing record is cached as a negative answer
    async fn negative_ttl(&self) -> Result<u32, crate::Error>;
}

/// Trait for DNS provider implementations
///
/// A provider manages any number of zones and hands out [`DnsZone`]
/// handles by apex.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Look up a zone by apex
    ///
    /// # Parameters
    ///
    /// - `apex`: Zone name, e.g. `contoso.com`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(zone))`: The zone handle
    /// - `Ok(None)`: The provider does not manage this zone
    /// - `Err(Error)`: If the provider API failed
    async fn get_zone(&self, apex: &str) -> Result<Option<Arc<dyn DnsZone>>, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from its configuration fragment
    ///
    /// # Parameters
    ///
    /// - `config`: Provider fragment, including its `type`
    /// - `secrets`: Resolves `@NAME` references in string values
    /// - `registry`: Registry for composite providers that build nested ones
    ///
    /// # Returns
    ///
    /// A shared DnsProvider trait object
    fn create(
        &self,
        config: &Value,
        secrets: &dyn SecretProvider,
        registry: &ProviderRegistry,
    ) -> Result<Arc<dyn DnsProvider>, crate::Error>;
}
