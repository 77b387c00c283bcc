//! Test doubles and common utilities for contract tests
//!
//! - [`ScriptedResolver`]: answers from a script, counts lookups
//! - [`Recorder`]: backs the `recording` provider type, counts zone calls
//! - Configuration builders

#![allow(dead_code)]

use async_trait::async_trait;
use dnsalias_core::error::{Error, Result};
use dnsalias_core::providers::MemoryZone;
use dnsalias_core::registry::ProviderRegistry;
use dnsalias_core::secrets::SecretProvider;
use dnsalias_core::traits::{
    DnsProvider, DnsProviderFactory, DnsRecord, DnsZone, RecordType, ResolvedAddress,
    SourceResolver,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted outcome for one source name
#[derive(Clone)]
enum Script {
    Answer(Vec<ResolvedAddress>),
    Fail,
}

/// A SourceResolver driven by a per-name script
///
/// Names without a script resolve to nothing. Nameservers listed with
/// [`ScriptedResolver::fail_server`] fail every lookup.
#[derive(Default)]
pub struct ScriptedResolver {
    scripts: Mutex<HashMap<String, Script>>,
    delays: Mutex<HashMap<String, Duration>>,
    panics: Mutex<HashMap<String, usize>>,
    failing_servers: Mutex<Vec<String>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `name` with `addresses`, each served with `ttl`
    pub fn answer(&self, name: &str, addresses: &[[u8; 4]], ttl: u32) {
        let answer = addresses
            .iter()
            .map(|octets| ResolvedAddress {
                address: Ipv4Addr::from(*octets),
                ttl,
            })
            .collect();
        self.scripts
            .lock()
            .insert(name.to_string(), Script::Answer(answer));
    }

    /// Fail every lookup of `name`
    pub fn fail(&self, name: &str) {
        self.scripts.lock().insert(name.to_string(), Script::Fail);
    }

    /// Fail every lookup sent to `server`
    pub fn fail_server(&self, server: &str) {
        self.failing_servers.lock().push(server.to_string());
    }

    /// Make every lookup of `name` take `delay`
    pub fn delay(&self, name: &str, delay: Duration) {
        self.delays.lock().insert(name.to_string(), delay);
    }

    /// Panic on the next `times` lookups of `name`
    pub fn panic_next(&self, name: &str, times: usize) {
        self.panics.lock().insert(name.to_string(), times);
    }

    /// Total number of lookups
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of lookups of `name`
    pub fn calls_for(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|(n, _)| n == name).count()
    }

    /// Nameservers used, in order, `None` for the system resolver
    pub fn servers_used(&self) -> Vec<Option<String>> {
        self.calls.lock().iter().map(|(_, s)| s.clone()).collect()
    }
}

#[async_trait]
impl SourceResolver for ScriptedResolver {
    async fn resolve_a(&self, name: &str, nameserver: Option<&str>) -> Result<Vec<ResolvedAddress>> {
        self.calls
            .lock()
            .push((name.to_string(), nameserver.map(str::to_string)));

        let delay = self.delays.lock().get(name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let panic_now = match self.panics.lock().get_mut(name) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if panic_now {
            panic!("resolver blew up on {}", name);
        }

        if let Some(server) = nameserver {
            if self.failing_servers.lock().iter().any(|s| s == server) {
                return Err(Error::lookup(format!("{} timed out", server)));
            }
        }

        let script = self.scripts.lock().get(name).cloned();
        match script {
            Some(Script::Answer(answer)) => Ok(answer),
            Some(Script::Fail) => Err(Error::lookup(format!("SERVFAIL for {}", name))),
            None => Ok(Vec::new()),
        }
    }
}

/// Call counters shared by every recording zone
#[derive(Default)]
pub struct ZoneCounters {
    pub finds: AtomicUsize,
    pub creates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

/// A zone that counts calls and can be told to fail
pub struct RecordingZone {
    inner: MemoryZone,
    counters: Arc<ZoneCounters>,
}

#[async_trait]
impl DnsZone for RecordingZone {
    async fn find_records(&self, name: &str, record_type: RecordType) -> Result<Vec<DnsRecord>> {
        self.counters.finds.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::provider("recording", "read refused"));
        }
        self.inner.find_records(name, record_type).await
    }

    async fn create_record(&self, record: &DnsRecord, overwrite: bool) -> Result<()> {
        self.counters.creates.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::provider("recording", "write refused"));
        }
        self.inner.create_record(record, overwrite).await
    }

    async fn delete_record(&self, name: &str, record_type: RecordType) -> Result<bool> {
        self.counters.deletes.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::provider("recording", "write refused"));
        }
        self.inner.delete_record(name, record_type).await
    }

    async fn negative_ttl(&self) -> Result<u32> {
        self.inner.negative_ttl().await
    }
}

struct RecordingProvider {
    zones: HashMap<String, Arc<RecordingZone>>,
}

#[async_trait]
impl DnsProvider for RecordingProvider {
    async fn get_zone(&self, apex: &str) -> Result<Option<Arc<dyn DnsZone>>> {
        Ok(self
            .zones
            .get(apex)
            .map(|zone| zone.clone() as Arc<dyn DnsZone>))
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// Backing store of the `recording` provider type
///
/// Zones are shared by every provider instance the factory creates, the
/// way a remote API outlives the client objects talking to it.
#[derive(Default)]
pub struct Recorder {
    pub counters: Arc<ZoneCounters>,
    zones: Mutex<HashMap<String, MemoryZone>>,
    providers_created: AtomicUsize,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn finds(&self) -> usize {
        self.counters.finds.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.counters.creates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.counters.deletes.load(Ordering::SeqCst)
    }

    pub fn providers_created(&self) -> usize {
        self.providers_created.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.counters.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.counters.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The backing zone for `apex`, created on first use
    pub fn zone(&self, apex: &str) -> MemoryZone {
        self.zones
            .lock()
            .entry(apex.to_string())
            .or_insert_with(|| MemoryZone::new(apex, 300))
            .clone()
    }

    /// Current values of an A record set, sorted
    pub async fn a_values(&self, apex: &str, name: &str) -> Vec<String> {
        let records = self
            .zone(apex)
            .find_records(name, RecordType::A)
            .await
            .unwrap_or_default();
        let mut values: Vec<String> = records.into_iter().flat_map(|r| r.values).collect();
        values.sort();
        values
    }

    /// TTL of an A record set
    pub async fn a_ttl(&self, apex: &str, name: &str) -> Option<u32> {
        self.zone(apex)
            .find_records(name, RecordType::A)
            .await
            .ok()
            .and_then(|records| records.first().and_then(|r| r.ttl))
    }
}

struct RecordingFactory {
    recorder: Arc<Recorder>,
}

impl DnsProviderFactory for RecordingFactory {
    fn create(
        &self,
        config: &Value,
        _secrets: &dyn SecretProvider,
        _registry: &ProviderRegistry,
    ) -> Result<Arc<dyn DnsProvider>> {
        let zones = config
            .get("zones")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::config("recording provider needs zones"))?;

        let zones = zones
            .iter()
            .filter_map(Value::as_str)
            .map(|apex| {
                let zone = RecordingZone {
                    inner: self.recorder.zone(apex),
                    counters: self.recorder.counters.clone(),
                };
                (apex.to_string(), Arc::new(zone))
            })
            .collect();

        self.recorder.providers_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(RecordingProvider { zones }))
    }
}

/// Built-in registry plus the `recording` type backed by `recorder`
pub fn registry_with(recorder: &Arc<Recorder>) -> Arc<ProviderRegistry> {
    let registry = ProviderRegistry::with_builtins();
    registry.register_provider(
        "recording",
        Box::new(RecordingFactory {
            recorder: recorder.clone(),
        }),
    );
    Arc::new(registry)
}

/// A `recording` provider fragment serving `zones`
pub fn recording_provider(zones: &[&str]) -> Value {
    json!({ "type": "recording", "zones": zones })
}

/// An alias fragment with one source name, system resolver
pub fn alias(provider: &str, source: &str, destination: &str) -> Value {
    json!({
        "provider": provider,
        "source": { "name": source },
        "destination": { "name": destination }
    })
}

/// A full configuration document
pub fn document(providers: Value, aliases: Value) -> Value {
    json!({ "providers": providers, "aliases": aliases })
}
