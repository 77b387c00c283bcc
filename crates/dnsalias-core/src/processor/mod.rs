//! Replication of one alias
//!
//! An [`AliasProcessor`] resolves the source names of its alias and makes
//! the destination A record set match the union of the answers. It keeps
//! the last destination set it knows about, so an unchanged answer costs
//! no provider writes.

use crate::alert::{Alert, AlertCategory, AlertSink};
use crate::alias::Alias;
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsRecord, DnsZone, RecordType, SourceResolver};
use std::collections::BTreeSet;
use std::fmt;
use futures::FutureExt;
use std::net::Ipv4Addr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

/// Upper bound for the returned recheck interval, in seconds
pub const MAX_RECHECK_TTL: u32 = 600;

/// Stateful worker for one alias
///
/// `process` takes `&mut self`; callers serialize invocations.
pub struct AliasProcessor {
    alias: Alias,
    provider: Arc<dyn DnsProvider>,
    resolver: Arc<dyn SourceResolver>,
    last: Option<BTreeSet<Ipv4Addr>>,
}

impl AliasProcessor {
    /// Create a processor with an unknown destination state
    pub fn new(alias: Alias, provider: Arc<dyn DnsProvider>, resolver: Arc<dyn SourceResolver>) -> Self {
        Self {
            alias,
            provider,
            resolver,
            last: None,
        }
    }

    /// The alias being replicated
    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    /// Last destination set written or observed, `None` before the first run
    pub fn last_known(&self) -> Option<&BTreeSet<Ipv4Addr>> {
        self.last.as_ref()
    }

    /// Run one check, turning a panic anywhere below it into an error
    ///
    /// A panicking provider or resolver yields `Err(Error::Other)` carrying
    /// the panic message, so callers treat it like any other processing
    /// failure.
    pub async fn process_guarded(&mut self, alerts: &dyn AlertSink) -> Result<u32> {
        let name = self.to_string();
        match AssertUnwindSafe(self.process(alerts)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Check of {} panicked: {}", name, message);
                Err(Error::Other(format!("Alias check panicked: {}", message)))
            }
        }
    }

    /// Run one check
    ///
    /// # Returns
    ///
    /// - `Ok(seconds)`: Lowest source TTL seen, capped at [`MAX_RECHECK_TTL`]
    /// - `Err(Error::Lookup)`: A source name could not be resolved
    /// - `Err(Error::Update)`: The destination zone could not be read or written
    pub async fn process(&mut self, alerts: &dyn AlertSink) -> Result<u32> {
        if self.last.is_none() {
            let initial = self.read_destination().await?;
            debug!("Retrieved initial set of [{}] for {}", join(&initial), self);
            self.last = Some(initial);
        }

        let (destinations, lowest_ttl) = self.resolve_sources().await?;

        if self.last.as_ref() == Some(&destinations) {
            return Ok(lowest_ttl);
        }

        let zone = self.zone().await?;
        if destinations.is_empty() {
            zone.delete_record(self.alias.destination_name(), RecordType::A)
                .await
                .map_err(|e| Error::update_with("Error updating DNS record", e))?;
        } else {
            debug!("Targets: {}", join(&destinations));
            let record = DnsRecord::a(
                self.alias.destination_name(),
                destinations.iter().copied(),
                Some(lowest_ttl),
            );
            zone.create_record(&record, true)
                .await
                .map_err(|e| Error::update_with("Error updating DNS record", e))?;
        }

        let previous = match &self.last {
            Some(set) => join(set),
            None => "UNKNOWN".to_string(),
        };
        let message = format!(
            "The DNS resolution for [{}] in zone [{}] has been updated from [{}] to [{}]",
            self.alias.destination_name(),
            self.alias.destination_zone(),
            previous,
            join(&destinations)
        );
        let category = if destinations.is_empty() {
            AlertCategory::ResolutionEmpty
        } else {
            AlertCategory::ResolutionChange
        };
        alerts.send_alert(&Alert::new(category, message)).await;

        self.last = Some(destinations);
        Ok(lowest_ttl)
    }

    async fn zone(&self) -> Result<Arc<dyn DnsZone>> {
        self.provider
            .get_zone(self.alias.destination_zone())
            .await
            .map_err(|e| Error::update_with("Error locating the destination zone", e))?
            .ok_or_else(|| Error::update("The destination zone could not be located by the update API"))
    }

    async fn read_destination(&self) -> Result<BTreeSet<Ipv4Addr>> {
        let zone = self.zone().await?;
        let records = zone
            .find_records(self.alias.destination_name(), RecordType::A)
            .await
            .map_err(|e| Error::update_with("Error retrieving DNS record", e))?;

        Ok(records.iter().flat_map(DnsRecord::ipv4_values).collect())
    }

    async fn resolve_sources(&self) -> Result<(BTreeSet<Ipv4Addr>, u32)> {
        let mut destinations = BTreeSet::new();
        let mut lowest_ttl = MAX_RECHECK_TTL;

        for name in self.alias.source_names() {
            let answer = match self.alias.source_servers() {
                None => {
                    debug!("Looking up {} using default nameservers", name);
                    self.resolver.resolve_a(name, None).await.map_err(|e| {
                        Error::lookup_with(format!("Unable to resolve [{}] with system resolver.", name), e)
                    })?
                }
                Some(servers) => self.resolve_with_servers(name, servers).await?,
            };

            for resolved in answer {
                destinations.insert(resolved.address);
                lowest_ttl = lowest_ttl.min(resolved.ttl);
            }
        }

        Ok((destinations, lowest_ttl))
    }

    async fn resolve_with_servers(
        &self,
        name: &str,
        servers: &[String],
    ) -> Result<Vec<crate::traits::ResolvedAddress>> {
        let mut last_error = None;
        for server in servers {
            debug!("Looking up {} using nameserver {}", name, server);
            match self.resolver.resolve_a(name, Some(server)).await {
                Ok(answer) => return Ok(answer),
                Err(e) => {
                    debug!("Nameserver {} failed for {}: {}", server, name, e);
                    last_error = Some(e);
                }
            }
        }

        let message = format!(
            "Unable to resolve [{}] with any listed resolver.  The exception attached is the last.",
            name
        );
        Err(match last_error {
            Some(e) => Error::lookup_with(message, e),
            None => Error::lookup(message),
        })
    }
}

impl fmt::Display for AliasProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.alias.fmt(f)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn join(set: &BTreeSet<Ipv4Addr>) -> String {
    set.iter()
        .map(Ipv4Addr::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
