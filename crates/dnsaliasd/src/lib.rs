// # dnsaliasd - shared entry point plumbing
//
// This is a THIN integration layer. All alias, DNS and scheduling logic
// lives in dnsalias-core; the binaries only read the environment, install
// logging, register providers and hand the configuration document over.
//
// ## Environment
//
// - `DNSALIAS_CONFIG`: Path to the JSON configuration document (daemon)
// - `DNSALIAS_RELOAD_INTERVAL_SECS`: Periodic reload, 10..=86400 seconds (optional)
// - `DNSALIAS_SECRET_PREFIX`: Prefix for `@NAME` secret lookups (optional)
// - `DNSALIAS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export DNSALIAS_CONFIG=/etc/dnsalias/config.json
// export DNSALIAS_SECRET_PREFIX=DNSALIAS_SECRET_
// export DNSALIAS_SECRET_CLOUDFLARE_TOKEN=your_token
//
// dnsaliasd
// ```

use anyhow::Result;
use dnsalias_core::{EnvSecretProvider, ProviderRegistry};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
/// - 3: Single-shot run finished but alerts carried errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsAliasExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
    /// Alerts raised during a single-shot run carried errors
    AlertsWithErrors = 3,
}

impl From<DnsAliasExitCode> for ExitCode {
    fn from(code: DnsAliasExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Process configuration read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Configuration document path
    pub config_path: Option<PathBuf>,
    /// Periodic reload interval, in seconds
    pub reload_interval_secs: Option<u64>,
    /// Prefix applied to secret names before the environment lookup
    pub secret_prefix: Option<String>,
    /// Log level name
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let reload_interval_secs = match lookup("DNSALIAS_RELOAD_INTERVAL_SECS") {
            None => None,
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
                anyhow::anyhow!(
                    "DNSALIAS_RELOAD_INTERVAL_SECS must be a number of seconds. Got: '{}' ({})",
                    raw,
                    e
                )
            })?),
        };

        Ok(Self {
            config_path: lookup("DNSALIAS_CONFIG")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            reload_interval_secs,
            secret_prefix: lookup("DNSALIAS_SECRET_PREFIX").filter(|s| !s.is_empty()),
            log_level: lookup("DNSALIAS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the settings shared by both binaries
    pub fn validate(&self) -> Result<()> {
        if let Some(interval) = self.reload_interval_secs
            && !(10..=86_400).contains(&interval)
        {
            anyhow::bail!(
                "DNSALIAS_RELOAD_INTERVAL_SECS must be between 10 and 86400 seconds. Got: {}",
                interval
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DNSALIAS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Validate the daemon settings
    ///
    /// The daemon additionally needs an existing configuration document.
    pub fn validate_daemon(&self) -> Result<()> {
        self.validate()?;

        let path = self.document_path()?;
        if !path.is_file() {
            anyhow::bail!(
                "DNSALIAS_CONFIG does not point to a file: {}",
                path.display()
            );
        }
        Ok(())
    }

    /// Configuration document path
    pub fn document_path(&self) -> Result<&Path> {
        self.config_path.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "DNSALIAS_CONFIG is required. \
                Set it via: export DNSALIAS_CONFIG=/etc/dnsalias/config.json"
            )
        })
    }

    /// Periodic reload interval
    pub fn reload_interval(&self) -> Option<Duration> {
        self.reload_interval_secs.map(Duration::from_secs)
    }

    /// Tracing level for `log_level`
    pub fn tracing_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Secret provider reading the process environment
    pub fn secret_provider(&self) -> EnvSecretProvider {
        match &self.secret_prefix {
            Some(prefix) => EnvSecretProvider::with_prefix(prefix.clone()),
            None => EnvSecretProvider::new(),
        }
    }
}

/// Install the global tracing subscriber
///
/// Output goes to stderr when `to_stderr` is set, keeping stdout free for
/// machine-readable output.
pub fn init_tracing(level: Level, to_stderr: bool) -> Result<()> {
    let result = if to_stderr {
        tracing::subscriber::set_global_default(
            FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish(),
        )
    } else {
        tracing::subscriber::set_global_default(FmtSubscriber::builder().with_max_level(level).finish())
    };
    result.map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

/// Provider registry with every provider compiled into this build
pub fn provider_registry() -> Arc<ProviderRegistry> {
    let registry = ProviderRegistry::with_builtins();

    #[cfg(feature = "cloudflare")]
    {
        info!("Registering Cloudflare provider");
        dnsalias_provider_cloudflare::register(&registry);
    }

    #[cfg(feature = "route53")]
    {
        info!("Registering Route53 provider");
        dnsalias_provider_route53::register(&registry);
    }

    let mut types = registry.list_providers();
    types.sort();
    info!("Provider types available: {}", types.join(", "));
    Arc::new(registry)
}
