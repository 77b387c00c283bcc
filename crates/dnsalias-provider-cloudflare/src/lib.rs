// # Cloudflare DNS Provider
//
// This crate provides a Cloudflare implementation of the `DnsProvider` and
// `DnsZone` traits for the DNS alias daemon.
//
// - One HTTP request per API operation, errors propagated to the caller
// - HTTP timeout configured (30 seconds)
// - Specific error mapping for HTTP status codes (401, 403, 404, 409, 429, 5xx)
// - Dry-run mode: reads are performed, writes are only logged
// - No retry logic, no caching, no background tasks
//
// Cloudflare stores one record per value. A `DnsRecord` set is written as
// one record per value and read back bundled into a single set.
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - The token is usually a `@NAME` secret reference in the configuration
// - Provider MUST fail fast if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use dnsalias_core::alias::APEX;
use dnsalias_core::registry::ProviderRegistry;
use dnsalias_core::secrets::{SecretProvider, optional_secret_string, required_secret_string};
use dnsalias_core::traits::{DnsProvider, DnsProviderFactory, DnsRecord, DnsZone, RecordType};
use dnsalias_core::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// TTL value Cloudflare treats as "automatic"
const AUTOMATIC_TTL: u32 = 1;

/// Accepted explicit TTL range
const MIN_TTL: u32 = 60;
const MAX_TTL: u32 = 86_400;

/// Negative caching TTL reported for Cloudflare zones
const NEGATIVE_TTL: u32 = 3600;

/// Largest page Cloudflare returns for record listings
const PAGE_SIZE: &str = "100";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ZoneInfo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RecordInfo {
    id: String,
    content: String,
    ttl: u32,
}

/// Authenticated API client shared by a provider and its zones
struct Api {
    /// ⚠️ NEVER log this value
    token: String,
    base: String,
    client: reqwest::Client,
}

impl Api {
    async fn call<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("Cloudflare request failed ({}): {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status.as_u16(), what, &error_text));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::provider("cloudflare", format!("Failed to parse response ({}): {}", what, e))
        })?;

        if !envelope.success {
            let messages: Vec<String> = envelope
                .errors
                .iter()
                .map(|m| format!("{} ({})", m.message, m.code))
                .collect();
            return Err(Error::provider(
                "cloudflare",
                format!("{} rejected: {}", what, messages.join("; ")),
            ));
        }

        envelope.result.ok_or_else(|| {
            Error::provider("cloudflare", format!("Invalid response format ({}): missing result", what))
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.trim_end_matches('/'), path)
    }
}

fn status_error(status: u16, what: &str, error_text: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "Invalid API token or insufficient permissions ({}). Status: {}",
            what, status
        )),
        404 => Error::provider("cloudflare", format!("Not found ({}): {}", what, error_text)),
        409 => Error::provider(
            "cloudflare",
            format!("Conflict: record is being changed by another process ({})", what),
        ),
        429 => Error::rate_limited(format!("Cloudflare rate limit exceeded ({})", what)),
        500..=599 => Error::provider(
            "cloudflare",
            format!("Cloudflare server error (transient): {} - {}", status, error_text),
        ),
        _ => Error::provider(
            "cloudflare",
            format!("{} failed: {} - {}", what, status, error_text),
        ),
    }
}

/// TTL sent to the API for a record set TTL
fn api_ttl(ttl: Option<u32>) -> u32 {
    match ttl {
        None => AUTOMATIC_TTL,
        Some(ttl) if !(MIN_TTL..=MAX_TTL).contains(&ttl) => {
            let clamped = ttl.clamp(MIN_TTL, MAX_TTL);
            tracing::warn!(
                "TTL {} is outside the range Cloudflare accepts, using {}",
                ttl,
                clamped
            );
            clamped
        }
        Some(ttl) => ttl,
    }
}

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, zone and record lookups are performed but
/// creates and deletes are only logged.
pub struct CloudflareProvider {
    api: Arc<Api>,
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("api_base", &self.api.base)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a provider against the public API
    ///
    /// # Errors
    ///
    /// - `Error::Config`: the token is empty
    /// - `Error::Http`: the HTTP client could not be built
    pub fn new(api_token: impl Into<String>, dry_run: bool) -> Result<Self> {
        Self::with_api_base(api_token, CLOUDFLARE_API_BASE, dry_run)
    }

    /// Create a provider against a custom API base URL
    pub fn with_api_base(
        api_token: impl Into<String>,
        api_base: impl Into<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let token = api_token.into();
        if token.is_empty() {
            return Err(Error::config("Cloudflare API token is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api: Arc::new(Api {
                token,
                base: api_base.into(),
                client,
            }),
            dry_run,
        })
    }

    /// Whether writes are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn get_zone(&self, apex: &str) -> Result<Option<Arc<dyn DnsZone>>> {
        tracing::debug!("Looking up zone ID for {}", apex);

        let request = self
            .api
            .client
            .get(self.api.url("/zones"))
            .query(&[("name", apex)]);
        let zones: Vec<ZoneInfo> = self.api.call(request, "zone lookup").await?;

        Ok(zones.into_iter().next().map(|zone| {
            tracing::debug!("Found zone ID {} for {}", zone.id, apex);
            Arc::new(CloudflareZone {
                api: self.api.clone(),
                zone_id: zone.id,
                apex: apex.to_lowercase(),
                dry_run: self.dry_run,
            }) as Arc<dyn DnsZone>
        }))
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// One Cloudflare zone
pub struct CloudflareZone {
    api: Arc<Api>,
    zone_id: String,
    apex: String,
    dry_run: bool,
}

impl CloudflareZone {
    /// Fully qualified name for a zone-relative name
    fn fqdn(&self, name: &str) -> String {
        if name.is_empty() || name == APEX {
            self.apex.clone()
        } else {
            format!("{}.{}", name.to_lowercase(), self.apex)
        }
    }

    fn records_path(&self) -> String {
        format!("/zones/{}/dns_records", self.zone_id)
    }

    async fn list(&self, name: &str, record_type: RecordType) -> Result<Vec<RecordInfo>> {
        let fqdn = self.fqdn(name);
        let request = self
            .api
            .client
            .get(self.api.url(&self.records_path()))
            .query(&[
                ("name", fqdn.as_str()),
                ("type", record_type.as_str()),
                ("per_page", PAGE_SIZE),
            ]);
        self.api.call(request, "record lookup").await
    }
}

#[async_trait]
impl DnsZone for CloudflareZone {
    async fn find_records(&self, name: &str, record_type: RecordType) -> Result<Vec<DnsRecord>> {
        let found = self.list(name, record_type).await?;
        if found.is_empty() {
            return Ok(Vec::new());
        }

        let ttl = found.iter().map(|r| r.ttl).min();
        Ok(vec![DnsRecord {
            name: name.to_string(),
            record_type,
            values: found.into_iter().map(|r| r.content).collect(),
            ttl,
        }])
    }

    async fn create_record(&self, record: &DnsRecord, overwrite: bool) -> Result<()> {
        let fqdn = self.fqdn(&record.name);
        let ttl = api_ttl(record.ttl);

        let values: Vec<&String> = if overwrite {
            self.delete_record(&record.name, record.record_type).await?;
            record.values.iter().collect()
        } else {
            let existing: Vec<String> = self
                .list(&record.name, record.record_type)
                .await?
                .into_iter()
                .map(|r| r.content)
                .collect();
            record.values.iter().filter(|v| !existing.contains(v)).collect()
        };

        tracing::info!(
            "{} {} record {} -> [{}] (ttl {}) [mode: {}]",
            if self.dry_run { "Would create" } else { "Creating" },
            record.record_type,
            fqdn,
            record.values.join(", "),
            ttl,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        for value in values {
            let payload = json!({
                "type": record.record_type.as_str(),
                "name": fqdn,
                "content": value,
                "ttl": ttl,
                "proxied": false,
            });

            if self.dry_run {
                tracing::info!(
                    "[DRY-RUN] Would send POST request to {} with payload: {}",
                    self.records_path(),
                    payload
                );
                continue;
            }

            let request = self
                .api
                .client
                .post(self.api.url(&self.records_path()))
                .json(&payload);
            let _: Value = self.api.call(request, "record create").await?;
        }
        Ok(())
    }

    async fn delete_record(&self, name: &str, record_type: RecordType) -> Result<bool> {
        let found = self.list(name, record_type).await?;
        if found.is_empty() {
            return Ok(false);
        }

        for record in &found {
            let path = format!("{}/{}", self.records_path(), record.id);
            if self.dry_run {
                tracing::info!("[DRY-RUN] Would send DELETE request to {}", path);
                continue;
            }

            tracing::debug!("Deleting {} record {} ({})", record_type, self.fqdn(name), record.id);
            let request = self.api.client.delete(self.api.url(&path));
            let _: Value = self.api.call(request, "record delete").await?;
        }
        Ok(true)
    }

    async fn negative_ttl(&self) -> Result<u32> {
        Ok(NEGATIVE_TTL)
    }
}

/// Factory for creating Cloudflare providers
///
/// ```json
/// { "type": "cloudflare", "apiToken": "@CLOUDFLARE_TOKEN", "dryRun": false }
/// ```
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(
        &self,
        config: &Value,
        secrets: &dyn SecretProvider,
        _registry: &ProviderRegistry,
    ) -> Result<Arc<dyn DnsProvider>> {
        let api_token = required_secret_string(config, "apiToken", secrets)?;
        let api_base = optional_secret_string(config, "apiBase", secrets)?
            .unwrap_or_else(|| CLOUDFLARE_API_BASE.to_string());
        let dry_run = match config.get("dryRun") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => return Err(Error::config("Value dryRun must be a boolean")),
        };

        if dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }

        Ok(Arc::new(CloudflareProvider::with_api_base(
            api_token, api_base, dry_run,
        )?))
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use dnsalias_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::with_builtins();
/// dnsalias_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider("cloudflare", Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnsalias_core::secrets::StaticSecretProvider;
    use std::net::Ipv4Addr;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ok(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "errors": [],
            "messages": [],
            "result": result
        }))
    }

    async fn mount_zone(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(query_param("name", "dest.com"))
            .and(bearer_token("test_token"))
            .respond_with(ok(json!([{ "id": "zone123", "name": "dest.com" }])))
            .mount(server)
            .await;
    }

    async fn zone(server: &MockServer, dry_run: bool) -> Arc<dyn DnsZone> {
        mount_zone(server).await;
        CloudflareProvider::with_api_base("test_token", server.uri(), dry_run)
            .unwrap()
            .get_zone("dest.com")
            .await
            .unwrap()
            .expect("zone exists")
    }

    #[test]
    fn test_factory_creation() {
        let registry = ProviderRegistry::new();
        let secrets = StaticSecretProvider::new().with("CF_TOKEN", "test_token");

        let provider = CloudflareFactory.create(
            &json!({ "type": "cloudflare", "apiToken": "@CF_TOKEN" }),
            &secrets,
            &registry,
        );
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().provider_name(), "cloudflare");
    }

    #[test]
    fn test_factory_missing_token() {
        let registry = ProviderRegistry::new();
        let secrets = StaticSecretProvider::new();

        let missing = CloudflareFactory.create(&json!({ "type": "cloudflare" }), &secrets, &registry);
        assert!(matches!(missing, Err(Error::Config(_))));

        let empty = CloudflareFactory.create(
            &json!({ "type": "cloudflare", "apiToken": "" }),
            &secrets,
            &registry,
        );
        assert!(matches!(empty, Err(Error::Config(_))));

        let unresolved = CloudflareFactory.create(
            &json!({ "type": "cloudflare", "apiToken": "@NOPE" }),
            &secrets,
            &registry,
        );
        assert!(matches!(unresolved, Err(Error::Secret(_))));
    }

    #[test]
    fn test_dry_run_mode() {
        let provider_dry = CloudflareProvider::new("token", true).unwrap();
        let provider_live = CloudflareProvider::new("token", false).unwrap();

        assert!(provider_dry.is_dry_run(), "Dry-run provider should have dry_run=true");
        assert!(!provider_live.is_dry_run(), "Live provider should have dry_run=false");
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let provider = CloudflareProvider::new("secret_token_12345", false).unwrap();

        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token_12345"));
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));
    }

    #[test]
    fn test_ttl_mapping() {
        assert_eq!(api_ttl(None), AUTOMATIC_TTL);
        assert_eq!(api_ttl(Some(300)), 300);
        assert_eq!(api_ttl(Some(5)), MIN_TTL);
        assert_eq!(api_ttl(Some(1_000_000)), MAX_TTL);
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(status_error(401, "x", ""), Error::Authentication(_)));
        assert!(matches!(status_error(403, "x", ""), Error::Authentication(_)));
        assert!(matches!(status_error(429, "x", ""), Error::RateLimited(_)));
        assert!(matches!(status_error(503, "x", ""), Error::Provider { .. }));
        assert!(matches!(status_error(409, "x", ""), Error::Provider { .. }));
    }

    #[tokio::test]
    async fn test_unknown_zone_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ok(json!([])))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::with_api_base("test_token", server.uri(), false).unwrap();
        assert!(provider.get_zone("nowhere.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_records_bundles_values() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones/zone123/dns_records"))
            .and(query_param("name", "portal.dest.com"))
            .and(query_param("type", "A"))
            .respond_with(ok(json!([
                { "id": "r1", "content": "10.0.0.1", "ttl": 300, "type": "A" },
                { "id": "r2", "content": "10.0.0.2", "ttl": 120, "type": "A" }
            ])))
            .mount(&server)
            .await;

        let zone = zone(&server, false).await;
        let records = zone.find_records("portal", RecordType::A).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].values, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(records[0].ttl, Some(120));
        assert_eq!(records[0].name, "portal");
    }

    #[tokio::test]
    async fn test_overwrite_replaces_every_value() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones/zone123/dns_records"))
            .and(query_param("name", "dest.com"))
            .respond_with(ok(json!([
                { "id": "old1", "content": "10.0.0.9", "ttl": 60, "type": "A" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/zones/zone123/dns_records/old1"))
            .respond_with(ok(json!({ "id": "old1" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/zones/zone123/dns_records"))
            .and(body_partial_json(json!({ "type": "A", "name": "dest.com", "ttl": 300 })))
            .respond_with(ok(json!({ "id": "new" })))
            .expect(2)
            .mount(&server)
            .await;

        let zone = zone(&server, false).await;
        let record = DnsRecord::a(
            APEX,
            [Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)],
            Some(300),
        );
        zone.create_record(&record, true).await.unwrap();

        server.verify().await;
    }

    #[tokio::test]
    async fn test_dry_run_skips_writes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones/zone123/dns_records"))
            .respond_with(ok(json!([
                { "id": "old1", "content": "10.0.0.9", "ttl": 60, "type": "A" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ok(json!({})))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ok(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let zone = zone(&server, true).await;
        let record = DnsRecord::a("portal", [Ipv4Addr::new(10, 0, 0, 1)], None);
        zone.create_record(&record, true).await.unwrap();
        assert!(zone.delete_record("portal", RecordType::A).await.unwrap());

        server.verify().await;
    }

    #[tokio::test]
    async fn test_delete_missing_record_is_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones/zone123/dns_records"))
            .respond_with(ok(json!([])))
            .mount(&server)
            .await;

        let zone = zone(&server, false).await;
        assert!(!zone.delete_record("portal", RecordType::A).await.unwrap());
    }

    #[tokio::test]
    async fn test_forbidden_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::with_api_base("bad_token", server.uri(), false).unwrap();
        let err = provider.get_zone("dest.com").await.err().expect("expected error");
        assert!(matches!(err, Error::Authentication(_)), "got {:?}", err);
        assert!(!err.to_string().contains("bad_token"));
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "errors": [{ "code": 1003, "message": "Invalid or missing zone id." }],
                "result": null
            })))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::with_api_base("test_token", server.uri(), false).unwrap();
        let err = provider.get_zone("dest.com").await.err().expect("expected error");
        assert!(err.to_string().contains("Invalid or missing zone id. (1003)"), "got {}", err);
    }
}
