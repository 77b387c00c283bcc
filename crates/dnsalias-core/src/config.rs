//! Configuration types for the DNS alias system
//!
//! A configuration document is a JSON object with three sections:
//!
//! - `alerts` (optional): alert sink fragment, see [`crate::alert::create_sink`]
//! - `providers` (required): named provider fragments, each with a `type`
//! - `aliases` (required): named alias fragments, see [`AliasConfig`]
//!
//! Each named fragment is kept as raw JSON next to its parsed form so
//! the scheduler can compare [`fingerprint`]s between reconfigurations.

use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

/// Parsed top-level configuration document
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    /// Alert sink fragment, `None` disables delivery
    pub alerts: Option<Value>,

    /// Scheduler tuning, if present
    pub scheduler: Option<SchedulerSettings>,

    /// Named provider fragments
    pub providers: Vec<(String, Value)>,

    /// Named alias fragments
    pub aliases: Vec<(String, Value)>,

    /// Whether single-shot runs log their full output
    pub log_output: bool,
}

impl ConfigDocument {
    /// Parse a document from its JSON value
    pub fn parse(value: &Value) -> Result<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| Error::config("Configuration must be a JSON object"))?;

        let alerts = match root.get("alerts") {
            None | Some(Value::Null) => None,
            Some(fragment @ Value::Object(_)) => Some(fragment.clone()),
            Some(_) => return Err(Error::config("Section alerts must be an object")),
        };

        let scheduler = match root.get("scheduler") {
            None | Some(Value::Null) => None,
            Some(fragment) => Some(
                serde_json::from_value(fragment.clone())
                    .map_err(|e| Error::config(format!("Invalid scheduler section: {}", e)))?,
            ),
        };

        let log_output = match root.get("logOutput") {
            None => true,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => return Err(Error::config("Value logOutput must be a boolean")),
        };

        Ok(Self {
            alerts,
            scheduler,
            providers: named_section(root, "providers")?,
            aliases: named_section(root, "aliases")?,
            log_output,
        })
    }

    /// Parse a document from JSON text
    pub fn parse_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::parse(&value)
    }
}

fn named_section(root: &serde_json::Map<String, Value>, key: &str) -> Result<Vec<(String, Value)>> {
    let section = root
        .get(key)
        .ok_or_else(|| Error::config(format!("Missing required section: {}", key)))?
        .as_object()
        .ok_or_else(|| Error::config(format!("Section {} must be an object", key)))?;

    section
        .iter()
        .map(|(name, fragment)| {
            if fragment.is_object() {
                Ok((name.clone(), fragment.clone()))
            } else {
                Err(Error::config(format!("{}.{} must be an object", key, name)))
            }
        })
        .collect()
}

/// Read a JSON configuration file
pub fn load_file(path: impl AsRef<Path>) -> Result<Value> {
    let text = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&text)?)
}

/// Alias fragment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasConfig {
    /// Name of the provider entry that owns the destination zone
    pub provider: String,

    /// Where addresses are read from
    pub source: SourceConfig,

    /// Where addresses are written to
    pub destination: DestinationConfig,
}

impl AliasConfig {
    /// Parse an alias fragment
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| Error::config(e.to_string()))
    }
}

/// Source side of an alias
///
/// Either `name` or `names` must be present. `server` and `servers` are
/// both optional; without them the system resolver is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// Single source name
    #[serde(default)]
    pub name: Option<String>,

    /// Multiple source names
    #[serde(default)]
    pub names: Option<Vec<String>>,

    /// Single nameserver
    #[serde(default)]
    pub server: Option<String>,

    /// Nameservers tried in order
    #[serde(default)]
    pub servers: Option<Vec<String>>,
}

impl SourceConfig {
    /// Source names, `name` taking precedence over `names`
    pub fn source_names(&self) -> Result<Vec<String>> {
        if let Some(name) = &self.name {
            return Ok(vec![name.clone()]);
        }
        match &self.names {
            Some(names) if !names.is_empty() => Ok(names.clone()),
            _ => Err(Error::config("Missing required value: source.names")),
        }
    }

    /// Explicit nameservers, `server` taking precedence over `servers`
    pub fn source_servers(&self) -> Option<Vec<String>> {
        if let Some(server) = &self.server {
            return Some(vec![server.clone()]);
        }
        self.servers.clone()
    }
}

/// Destination side of an alias
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationConfig {
    /// Record name, relative to `zone` or fully qualified without it
    pub name: String,

    /// Zone apex
    #[serde(default)]
    pub zone: Option<String>,
}

/// Scheduler tuning
///
/// All values have defaults; a configuration usually omits the section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSettings {
    /// Earliest a next run may be scheduled after the previous one finished
    #[serde(default = "default_minimum_schedule_ms")]
    pub minimum_schedule_ms: u64,

    /// How far ahead of its due time an entry may be dispatched
    #[serde(default = "default_dispatch_slack_ms")]
    pub dispatch_slack_ms: u64,

    /// Dispatch lag above which a warning is logged
    #[serde(default = "default_late_warning_ms")]
    pub late_warning_ms: u64,

    /// Consecutive lookup or update failures tolerated before alerting
    #[serde(default = "default_allowed_consecutive_failures")]
    pub allowed_consecutive_failures: u32,

    /// Recheck interval after a failed run
    #[serde(default = "default_failure_recheck_secs")]
    pub failure_recheck_secs: u64,

    /// Spacing between aliases newly created by one `configure` call
    #[serde(default = "default_configure_stagger_ms")]
    pub configure_stagger_ms: u64,

    /// Spacing between aliases when the scheduler first starts
    #[serde(default = "default_start_stagger_ms")]
    pub start_stagger_ms: u64,

    /// How long `stop` waits for running checks
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
}

impl SchedulerSettings {
    /// Minimum schedule floor
    pub fn minimum_schedule(&self) -> Duration {
        Duration::from_millis(self.minimum_schedule_ms)
    }

    /// Dispatch slack
    pub fn dispatch_slack(&self) -> Duration {
        Duration::from_millis(self.dispatch_slack_ms)
    }

    /// Late dispatch warning threshold
    pub fn late_warning(&self) -> Duration {
        Duration::from_millis(self.late_warning_ms)
    }

    /// Recheck interval after a failure
    pub fn failure_recheck(&self) -> Duration {
        Duration::from_secs(self.failure_recheck_secs)
    }

    /// Stagger for newly configured aliases
    pub fn configure_stagger(&self) -> Duration {
        Duration::from_millis(self.configure_stagger_ms)
    }

    /// Stagger applied on first start
    pub fn start_stagger(&self) -> Duration {
        Duration::from_millis(self.start_stagger_ms)
    }

    /// Stop grace period
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            minimum_schedule_ms: default_minimum_schedule_ms(),
            dispatch_slack_ms: default_dispatch_slack_ms(),
            late_warning_ms: default_late_warning_ms(),
            allowed_consecutive_failures: default_allowed_consecutive_failures(),
            failure_recheck_secs: default_failure_recheck_secs(),
            configure_stagger_ms: default_configure_stagger_ms(),
            start_stagger_ms: default_start_stagger_ms(),
            stop_grace_secs: default_stop_grace_secs(),
        }
    }
}

fn default_minimum_schedule_ms() -> u64 {
    100
}

fn default_dispatch_slack_ms() -> u64 {
    20
}

fn default_late_warning_ms() -> u64 {
    500
}

fn default_allowed_consecutive_failures() -> u32 {
    1
}

fn default_failure_recheck_secs() -> u64 {
    300
}

fn default_configure_stagger_ms() -> u64 {
    1000
}

fn default_start_stagger_ms() -> u64 {
    5000
}

fn default_stop_grace_secs() -> u64 {
    30
}

/// Content fingerprint of a configuration fragment
///
/// SHA-256 over a key-sorted serialization, base64 encoded. Two
/// fragments that differ only in key order have the same fingerprint.
pub fn fingerprint(fragment: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(fragment, &mut canonical);

    let digest = Sha256::digest(canonical.as_bytes());
    STANDARD.encode(digest)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
