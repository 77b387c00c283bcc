// # Hickory Source Resolver
//
// SourceResolver backed by hickory-resolver.
//
// Lookups without a nameserver go through the system resolver
// configuration. Each explicit nameserver gets its own UDP resolver,
// created on first use and kept for later lookups.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::rr::{RData, RecordType};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use crate::traits::{ResolvedAddress, SourceResolver};
use crate::{Error, Result};

/// Port used for nameservers given without one
const DNS_PORT: u16 = 53;

/// SourceResolver using hickory-resolver
pub struct HickorySourceResolver {
    system: TokioAsyncResolver,
    by_server: Mutex<HashMap<String, TokioAsyncResolver>>,
}

impl HickorySourceResolver {
    /// Create a resolver using the host's resolver configuration
    pub fn from_system_conf() -> Result<Self> {
        let system = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| Error::config(format!("Unable to read system resolver configuration: {}", e)))?;
        Ok(Self::with_system(system))
    }

    /// Create a resolver around an existing default resolver
    pub fn with_system(system: TokioAsyncResolver) -> Self {
        Self {
            system,
            by_server: Mutex::new(HashMap::new()),
        }
    }

    async fn resolver_for(&self, server: &str) -> Result<TokioAsyncResolver> {
        if let Some(resolver) = self.by_server.lock().get(server) {
            return Ok(resolver.clone());
        }

        let address = server_address(server).await?;

        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig {
            socket_addr: address,
            protocol: Protocol::Udp,
            tls_dns_name: None,
            trust_negative_responses: true,
            bind_addr: None,
        });
        let mut opts = ResolverOpts::default();
        opts.use_hosts_file = false;

        let resolver = TokioAsyncResolver::tokio(config, opts);
        tracing::debug!("Created resolver for nameserver {} ({})", server, address);

        Ok(self
            .by_server
            .lock()
            .entry(server.to_string())
            .or_insert(resolver)
            .clone())
    }
}

/// Parse `server` as an IP, a socket address, or a hostname
async fn server_address(server: &str) -> Result<SocketAddr> {
    if let Ok(ip) = server.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DNS_PORT));
    }
    if let Ok(address) = server.parse::<SocketAddr>() {
        return Ok(address);
    }

    tokio::net::lookup_host((server, DNS_PORT))
        .await
        .map_err(|e| Error::lookup_with(format!("Unable to locate nameserver {}", server), e))?
        .next()
        .ok_or_else(|| Error::lookup(format!("Nameserver {} has no address", server)))
}

fn fully_qualified(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

async fn lookup_a(resolver: &TokioAsyncResolver, name: &str) -> std::result::Result<Vec<ResolvedAddress>, ResolveError> {
    match resolver.lookup(fully_qualified(name), RecordType::A).await {
        Ok(lookup) => Ok(lookup
            .record_iter()
            .filter_map(|record| match record.data() {
                Some(RData::A(a)) => Some(ResolvedAddress {
                    address: a.0,
                    ttl: record.ttl(),
                }),
                _ => None,
            })
            .collect()),
        Err(e) => match e.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => Ok(Vec::new()),
            _ => Err(e),
        },
    }
}

#[async_trait]
impl SourceResolver for HickorySourceResolver {
    async fn resolve_a(&self, name: &str, nameserver: Option<&str>) -> Result<Vec<ResolvedAddress>> {
        let resolver = match nameserver {
            Some(server) => self.resolver_for(server).await?,
            None => self.system.clone(),
        };

        let addresses = lookup_a(&resolver, name).await.map_err(|e| {
            Error::lookup_with(
                format!(
                    "Unable to resolve {} via {}",
                    name,
                    nameserver.unwrap_or("system resolver")
                ),
                e,
            )
        })?;

        tracing::debug!(
            "Resolved {} via {}: {} address(es)",
            name,
            nameserver.unwrap_or("system resolver"),
            addresses.len()
        );
        Ok(addresses)
    }
}
