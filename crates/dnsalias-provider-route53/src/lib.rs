// # AWS Route53 DNS Provider
//
// This crate provides a Route53 implementation of the `DnsProvider` and
// `DnsZone` traits for the DNS alias daemon.
//
// - One API call per operation, errors propagated to the caller
// - The SDK client is built on first use, inside the caller's runtime
// - Credentials: static access key pair, or the default AWS chain
//   (environment, profile, instance metadata), optionally assuming a role
// - Dry-run mode: reads are performed, changes are only logged
//
// Route53 stores every value of a name and type in one resource record
// set, so a `DnsRecord` maps onto a single set. Writes go through
// `ChangeResourceRecordSets` with CREATE, UPSERT or DELETE.
//
// ## Security Requirements
//
// - The secret access key NEVER appears in logs or Debug output
// - The key is usually a `@NAME` secret reference in the configuration
//
// ## API Reference
//
// - ListHostedZonesByName: zone lookup by apex
// - ListResourceRecordSets: a listing that starts at (name, type)
// - ChangeResourceRecordSets: batched record set changes

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::sts::AssumeRoleProvider;
use aws_sdk_route53::Client;
use aws_sdk_route53::config::{Credentials, Region, SharedCredentialsProvider};
use aws_sdk_route53::error::DisplayErrorContext;
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use dnsalias_core::alias::APEX;
use dnsalias_core::registry::ProviderRegistry;
use dnsalias_core::secrets::{SecretProvider, optional_secret_string, required_secret_string};
use dnsalias_core::traits::{DnsProvider, DnsProviderFactory, DnsRecord, DnsZone, RecordType};
use dnsalias_core::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// TTL for new record sets when the record carries none
const DEFAULT_TTL: i64 = 600;

/// Default lifetime of assumed-role sessions, in minutes
const DEFAULT_ASSUME_ROLE_MINUTES: u64 = 60;

/// Session name reported to STS when assuming a role
const ROLE_SESSION_NAME: &str = "dnsalias";

/// Longest TXT string Route53 accepts in one quoted chunk
const TXT_CHUNK: usize = 255;

/// Prefix Route53 puts in front of hosted zone ids
const HOSTED_ZONE_PREFIX: &str = "/hostedzone/";

/// A hosted zone as listed by the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HostedZoneInfo {
    id: String,
    name: String,
}

/// A resource record set, reduced to what this provider reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordSet {
    name: String,
    record_type: String,
    ttl: Option<i64>,
    values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Create,
    Upsert,
    Delete,
}

/// The Route53 operations this provider uses
#[async_trait]
pub(crate) trait RecordSetApi: Send + Sync {
    async fn hosted_zones_by_name(&self, dns_name: &str) -> Result<Vec<HostedZoneInfo>>;

    /// Record sets in zone order, starting at `name` and `record_type`
    async fn record_sets_from(
        &self,
        zone_id: &str,
        name: &str,
        record_type: &str,
    ) -> Result<Vec<RecordSet>>;

    async fn change_record_sets(&self, zone_id: &str, changes: Vec<(ChangeKind, RecordSet)>) -> Result<()>;
}

/// Connection settings from the provider fragment
#[derive(Clone)]
struct ConnectionSettings {
    region: String,
    access_key: Option<String>,
    /// ⚠️ NEVER log this value
    secret_key: Option<String>,
    assume_role: Option<String>,
    assume_role_duration: Duration,
    endpoint: Option<String>,
}

// Custom Debug implementation that hides the secret key
impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<REDACTED>"))
            .field("assume_role", &self.assume_role)
            .field("assume_role_duration", &self.assume_role_duration)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl ConnectionSettings {
    async fn build_client(&self) -> Result<Client> {
        let region = Region::new(self.region.clone());
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region.clone());
        if let (Some(access_key), Some(secret_key)) = (&self.access_key, &self.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "dnsalias",
            ));
        }
        let base = loader.load().await;

        let sdk_config = match &self.assume_role {
            None => base,
            Some(role) => {
                tracing::debug!("Assuming role {} for Route53", role);
                let provider = AssumeRoleProvider::builder(role.clone())
                    .session_name(ROLE_SESSION_NAME)
                    .session_length(self.assume_role_duration)
                    .region(region)
                    .configure(&base)
                    .build()
                    .await;
                base.into_builder()
                    .credentials_provider(SharedCredentialsProvider::new(provider))
                    .build()
            }
        };

        let mut builder = aws_sdk_route53::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint_url(endpoint.clone());
        }
        Ok(Client::from_conf(builder.build()))
    }
}

/// `RecordSetApi` over the AWS SDK client
#[derive(Debug)]
struct SdkApi {
    settings: ConnectionSettings,
    client: OnceCell<Client>,
}

impl SdkApi {
    async fn client(&self) -> Result<&Client> {
        self.client
            .get_or_try_init(|| self.settings.build_client())
            .await
    }
}

fn api_error(what: &str, err: impl std::error::Error + 'static) -> Error {
    Error::provider("route53", format!("{}: {}", what, DisplayErrorContext(&err)))
}

#[async_trait]
impl RecordSetApi for SdkApi {
    async fn hosted_zones_by_name(&self, dns_name: &str) -> Result<Vec<HostedZoneInfo>> {
        let output = self
            .client()
            .await?
            .list_hosted_zones_by_name()
            .dns_name(dns_name)
            .send()
            .await
            .map_err(|e| api_error("Unable to query AWS for hosted zone ID", e))?;

        Ok(output
            .hosted_zones()
            .iter()
            .map(|zone| HostedZoneInfo {
                id: zone.id().to_string(),
                name: zone.name().to_string(),
            })
            .collect())
    }

    async fn record_sets_from(
        &self,
        zone_id: &str,
        name: &str,
        record_type: &str,
    ) -> Result<Vec<RecordSet>> {
        let output = self
            .client()
            .await?
            .list_resource_record_sets()
            .hosted_zone_id(zone_id)
            .start_record_name(name)
            .start_record_type(RrType::from(record_type))
            .send()
            .await
            .map_err(|e| api_error("Unable to list resource record sets", e))?;

        Ok(output
            .resource_record_sets()
            .iter()
            .map(|set| RecordSet {
                name: set.name().to_string(),
                record_type: set.r#type().as_str().to_string(),
                ttl: set.ttl(),
                values: set
                    .resource_records()
                    .iter()
                    .map(|record| record.value().to_string())
                    .collect(),
            })
            .collect())
    }

    async fn change_record_sets(&self, zone_id: &str, changes: Vec<(ChangeKind, RecordSet)>) -> Result<()> {
        let mut batch = Vec::with_capacity(changes.len());
        for (kind, set) in changes {
            let records = set
                .values
                .iter()
                .map(|value| {
                    ResourceRecord::builder()
                        .value(value)
                        .build()
                        .map_err(|e| api_error("Invalid resource record", e))
                })
                .collect::<Result<Vec<_>>>()?;

            let mut builder = ResourceRecordSet::builder()
                .name(&set.name)
                .r#type(RrType::from(set.record_type.as_str()))
                .set_resource_records(Some(records));
            if let Some(ttl) = set.ttl {
                builder = builder.ttl(ttl);
            }
            let record_set = builder
                .build()
                .map_err(|e| api_error("Invalid resource record set", e))?;

            let action = match kind {
                ChangeKind::Create => ChangeAction::Create,
                ChangeKind::Upsert => ChangeAction::Upsert,
                ChangeKind::Delete => ChangeAction::Delete,
            };
            batch.push(
                Change::builder()
                    .action(action)
                    .resource_record_set(record_set)
                    .build()
                    .map_err(|e| api_error("Invalid change", e))?,
            );
        }

        let change_batch = ChangeBatch::builder()
            .set_changes(Some(batch))
            .build()
            .map_err(|e| api_error("Invalid change batch", e))?;

        self.client()
            .await?
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(change_batch)
            .send()
            .await
            .map_err(|e| api_error("Failed to change record sets", e))?;
        Ok(())
    }
}

/// Apex in the canonical Route53 form, lower case with a trailing dot
fn canonical_root(apex: &str) -> String {
    let apex = apex.trim_end_matches('.').to_lowercase();
    format!("{}.", apex)
}

fn strip_zone_prefix(id: &str) -> &str {
    id.strip_prefix(HOSTED_ZONE_PREFIX).unwrap_or(id)
}

/// Negative caching TTL: the last field of an SOA value
fn soa_negative_ttl(apex: &str, soa: &str) -> Result<u32> {
    let parts: Vec<&str> = soa.split_whitespace().collect();
    if parts.len() != 7 {
        return Err(Error::provider(
            "route53",
            format!("SOA record for zone {} does not have 7 parts.", apex),
        ));
    }
    parts[6].parse().map_err(|_| {
        Error::provider(
            "route53",
            format!("SOA record TTL for zone {} is not a valid number.", apex),
        )
    })
}

/// TXT value as quoted strings of at most 255 characters
fn txt_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.is_empty() {
        return "\"\"".to_string();
    }
    chars
        .chunks(TXT_CHUNK)
        .map(|chunk| format!("\"{}\"", chunk.iter().collect::<String>()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Inverse of [`txt_value`]
fn txt_text(value: &str) -> String {
    value
        .split("\" \"")
        .map(|part| part.trim_matches('"'))
        .collect()
}

/// Route53 DNS provider
pub struct Route53Provider {
    api: Arc<dyn RecordSetApi>,
    description: String,
    dry_run: bool,
}

impl std::fmt::Debug for Route53Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route53Provider")
            .field("description", &self.description)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl Route53Provider {
    fn with_api(api: Arc<dyn RecordSetApi>, description: impl Into<String>, dry_run: bool) -> Self {
        Self {
            api,
            description: description.into(),
            dry_run,
        }
    }

    /// Whether changes are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[async_trait]
impl DnsProvider for Route53Provider {
    async fn get_zone(&self, apex: &str) -> Result<Option<Arc<dyn DnsZone>>> {
        let root = canonical_root(apex);
        tracing::debug!("Looking up hosted zone for {} ({})", root, self.description);

        let zones = self.api.hosted_zones_by_name(&root).await?;
        let mut matching = zones
            .iter()
            .filter(|zone| zone.name.eq_ignore_ascii_case(&root));

        let Some(zone) = matching.next() else {
            tracing::debug!("No hosted zone matches {}", root);
            return Ok(None);
        };
        if matching.next().is_some() {
            return Err(Error::provider(
                "route53",
                format!("More than one hosted zone matches the requested apex {}", apex),
            ));
        }

        let zone_id = strip_zone_prefix(&zone.id).to_string();
        tracing::debug!("Found hosted zone {} for {}", zone_id, root);
        Ok(Some(Arc::new(Route53Zone {
            api: self.api.clone(),
            zone_id,
            root,
            dry_run: self.dry_run,
            negative_ttl: OnceCell::new(),
        })))
    }

    fn provider_name(&self) -> &'static str {
        "route53"
    }
}

/// One Route53 hosted zone
pub struct Route53Zone {
    api: Arc<dyn RecordSetApi>,
    zone_id: String,
    /// Canonical apex, ending in a dot
    root: String,
    dry_run: bool,
    negative_ttl: OnceCell<u32>,
}

impl Route53Zone {
    /// Canonical name for a zone-relative name
    fn fqdn(&self, name: &str) -> String {
        if name.is_empty() || name == APEX {
            self.root.clone()
        } else {
            format!("{}.{}", name.trim_end_matches('.').to_lowercase(), self.root)
        }
    }

    /// Record sets of exactly `name` and `record_type`
    ///
    /// The listing starts at the requested name and continues with later
    /// ones, so anything past it is filtered out here.
    async fn matching(&self, name: &str, record_type: &str) -> Result<Vec<RecordSet>> {
        let fqdn = self.fqdn(name);
        let sets = self
            .api
            .record_sets_from(&self.zone_id, &fqdn, record_type)
            .await?;
        Ok(sets
            .into_iter()
            .filter(|set| set.name.eq_ignore_ascii_case(&fqdn) && set.record_type == record_type)
            .collect())
    }

    async fn apply(&self, changes: Vec<(ChangeKind, RecordSet)>) -> Result<()> {
        for (kind, set) in &changes {
            tracing::info!(
                "{} {:?} {} {} -> [{}] (ttl {:?}) [mode: {}]",
                if self.dry_run { "Would send" } else { "Sending" },
                kind,
                set.record_type,
                set.name,
                set.values.join(", "),
                set.ttl,
                if self.dry_run { "DRY-RUN" } else { "LIVE" }
            );
        }
        if self.dry_run {
            return Ok(());
        }
        self.api.change_record_sets(&self.zone_id, changes).await
    }
}

#[async_trait]
impl DnsZone for Route53Zone {
    async fn find_records(&self, name: &str, record_type: RecordType) -> Result<Vec<DnsRecord>> {
        let sets = self.matching(name, record_type.as_str()).await?;
        Ok(sets
            .into_iter()
            .map(|set| DnsRecord {
                name: name.to_string(),
                record_type,
                values: match record_type {
                    RecordType::Txt => set.values.iter().map(|v| txt_text(v)).collect(),
                    _ => set.values,
                },
                ttl: set.ttl.and_then(|ttl| u32::try_from(ttl).ok()),
            })
            .collect())
    }

    async fn create_record(&self, record: &DnsRecord, overwrite: bool) -> Result<()> {
        let mut values: Vec<String> = match record.record_type {
            RecordType::Txt => record.values.iter().map(|v| txt_value(v)).collect(),
            _ => record.values.clone(),
        };
        let record_ttl = record.ttl.map(i64::from);

        let existing = self.matching(&record.name, record.record_type.as_str()).await?;
        if existing.len() > 1 {
            tracing::warn!(
                "Found more than one matching resource record set for {}",
                self.fqdn(&record.name)
            );
        }

        let change = match existing.into_iter().next() {
            Some(mut set) => {
                if !overwrite {
                    for value in set.values.drain(..) {
                        if !values.contains(&value) {
                            values.push(value);
                        }
                    }
                }
                set.values = values;
                set.ttl = record_ttl.or(set.ttl);
                (ChangeKind::Upsert, set)
            }
            None => (
                ChangeKind::Create,
                RecordSet {
                    name: self.fqdn(&record.name),
                    record_type: record.record_type.as_str().to_string(),
                    ttl: Some(record_ttl.unwrap_or(DEFAULT_TTL)),
                    values,
                },
            ),
        };
        self.apply(vec![change]).await
    }

    async fn delete_record(&self, name: &str, record_type: RecordType) -> Result<bool> {
        // A delete must match the stored set exactly
        let changes: Vec<(ChangeKind, RecordSet)> = self
            .matching(name, record_type.as_str())
            .await?
            .into_iter()
            .map(|set| (ChangeKind::Delete, set))
            .collect();
        if changes.is_empty() {
            return Ok(false);
        }
        self.apply(changes).await?;
        Ok(true)
    }

    async fn negative_ttl(&self) -> Result<u32> {
        self.negative_ttl
            .get_or_try_init(|| async {
                let soa = self.matching(APEX, "SOA").await?;
                let value = soa
                    .first()
                    .and_then(|set| set.values.first())
                    .ok_or_else(|| {
                        Error::provider("route53", format!("Zone {} has no SOA record", self.root))
                    })?;
                soa_negative_ttl(&self.root, value)
            })
            .await
            .copied()
    }
}

/// Factory for creating Route53 providers
///
/// ```json
/// {
///   "type": "route53",
///   "region": "us-east-1",
///   "accessKey": "@AWS_ACCESS_KEY",
///   "secretKey": "@AWS_SECRET_KEY",
///   "assumeRole": "arn:aws:iam::123456789012:role/dns",
///   "assumeRoleMinutes": 60,
///   "dryRun": false
/// }
/// ```
///
/// Without `accessKey` and `secretKey` the default AWS credential chain is
/// used. `endpoint` overrides the API endpoint.
pub struct Route53Factory;

impl Route53Factory {
    fn settings(config: &Value, secrets: &dyn SecretProvider) -> Result<ConnectionSettings> {
        let region = required_secret_string(config, "region", secrets)?;
        if region.is_empty() {
            return Err(Error::config("Route53 region cannot be empty"));
        }

        let access_key = optional_secret_string(config, "accessKey", secrets)?;
        let secret_key = optional_secret_string(config, "secretKey", secrets)?;
        if access_key.is_some() != secret_key.is_some() {
            return Err(Error::config(
                "Route53 accessKey and secretKey must be given together",
            ));
        }

        let minutes = match config.get("assumeRoleMinutes") {
            None | Some(Value::Null) => DEFAULT_ASSUME_ROLE_MINUTES,
            Some(value) => value
                .as_u64()
                .filter(|minutes| *minutes > 0)
                .ok_or_else(|| Error::config("Value assumeRoleMinutes must be a positive integer"))?,
        };

        Ok(ConnectionSettings {
            region,
            access_key,
            secret_key,
            assume_role: optional_secret_string(config, "assumeRole", secrets)?,
            assume_role_duration: Duration::from_secs(minutes * 60),
            endpoint: optional_secret_string(config, "endpoint", secrets)?,
        })
    }
}

impl DnsProviderFactory for Route53Factory {
    fn create(
        &self,
        config: &Value,
        secrets: &dyn SecretProvider,
        _registry: &ProviderRegistry,
    ) -> Result<Arc<dyn DnsProvider>> {
        let settings = Self::settings(config, secrets)?;
        let dry_run = match config.get("dryRun") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => return Err(Error::config("Value dryRun must be a boolean")),
        };
        let description = match config.get("description").and_then(Value::as_str) {
            Some(description) => description.to_string(),
            None => format!("route53 {}", settings.region),
        };

        if dry_run {
            tracing::warn!("Route53 provider running in DRY-RUN mode - no changes will be made");
        }

        let api = SdkApi {
            settings,
            client: OnceCell::new(),
        };
        Ok(Arc::new(Route53Provider::with_api(Arc::new(api), description, dry_run)))
    }
}

/// Register the Route53 provider with a registry
///
/// Registered as `route53` and `awsroute53`.
///
/// # Example
///
/// ```rust
/// use dnsalias_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::with_builtins();
/// dnsalias_provider_route53::register(&registry);
/// assert!(registry.has_provider("route53"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider("route53", Box::new(Route53Factory));
    registry.register_provider("awsroute53", Box::new(Route53Factory));
}
