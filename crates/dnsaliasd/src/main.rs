// # dnsaliasd - DNS Alias Daemon
//
// The dnsaliasd daemon is responsible for:
// 1. Reading process configuration from environment variables
// 2. Initializing the runtime and logging
// 3. Registering providers
// 4. Starting the scheduler and applying the configuration document
// 5. Reloading the document on SIGHUP or a fixed interval
//
// A reload that fails is logged and raised as a CONFIGURATION_EXCEPTION
// alert; the previous configuration stays live.

use anyhow::Result;
use dnsalias_core::alert::{Alert, AlertCategory, AlertSink};
use dnsalias_core::config::{ConfigDocument, load_file};
use dnsalias_core::resolver::HickorySourceResolver;
use dnsalias_core::{EnvSecretProvider, Scheduler};
use dnsaliasd::{Config, DnsAliasExitCode, init_tracing, provider_registry};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DnsAliasExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate_daemon() {
        eprintln!("Configuration validation error: {}", e);
        return DnsAliasExitCode::ConfigError.into();
    }

    if let Err(e) = init_tracing(config.tracing_level(), false) {
        eprintln!("{}", e);
        return DnsAliasExitCode::ConfigError.into();
    }

    info!("Starting dnsaliasd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DnsAliasExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config).await {
            Ok(code) => code,
            Err(e) => {
                error!("Daemon error: {}", e);
                DnsAliasExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// What woke the main loop
enum Event {
    Reload(&'static str),
    Shutdown(&'static str),
}

/// Run the daemon until a shutdown signal
async fn run_daemon(config: Config) -> Result<DnsAliasExitCode> {
    let path = config.document_path()?.to_path_buf();
    let secrets = config.secret_provider();

    // Settings are fixed at construction, so the first document supplies them
    let document = match load_file(&path) {
        Ok(document) => document,
        Err(e) => {
            error!("Unable to read configuration {}: {}", path.display(), e);
            return Ok(DnsAliasExitCode::ConfigError);
        }
    };
    let settings = match ConfigDocument::parse(&document) {
        Ok(parsed) => parsed.scheduler.unwrap_or_default(),
        Err(e) => {
            error!("Configuration {} is invalid: {}", path.display(), e);
            return Ok(DnsAliasExitCode::ConfigError);
        }
    };

    let resolver = Arc::new(HickorySourceResolver::from_system_conf()?);
    let scheduler = Scheduler::with_settings(provider_registry(), resolver, settings);
    scheduler.start()?;

    if let Err(e) = scheduler.configure(&document, &secrets) {
        error!("Unable to apply configuration {}: {}", path.display(), e);
        scheduler.stop().await;
        return Ok(DnsAliasExitCode::ConfigError);
    }
    if scheduler.aliases().is_empty() {
        warn!("Configuration {} defines no aliases", path.display());
    }

    let mut events = Events::new(config.reload_interval())?;
    info!("Daemon initialized successfully");

    loop {
        match events.next().await {
            Event::Reload(reason) => {
                info!("Reloading configuration ({})", reason);
                reload(&scheduler, &path, &secrets).await;
            }
            Event::Shutdown(signal) => {
                info!("Received shutdown signal: {}", signal);
                break;
            }
        }
    }

    info!("Shutting down daemon");
    scheduler.stop().await;
    Ok(DnsAliasExitCode::CleanShutdown)
}

/// Re-read and apply the configuration document
async fn reload(scheduler: &Scheduler, path: &Path, secrets: &EnvSecretProvider) {
    let outcome = load_file(path).and_then(|document| scheduler.configure(&document, secrets));
    match outcome {
        Ok(summary) => info!(
            "Reload complete: {} alias(es) created, {} kept, {} removed",
            summary.aliases_created, summary.aliases_kept, summary.aliases_removed
        ),
        Err(e) => {
            error!("Reload of {} failed, keeping the running configuration: {}", path.display(), e);
            let alert = Alert::with_error(
                AlertCategory::ConfigurationException,
                format!("An exception occurred applying the configuration from {}", path.display()),
                &e,
            );
            scheduler.alert_sink().send_alert(&alert).await;
        }
    }
}

/// Signal and timer sources of the main loop
struct Events {
    reload: Option<Interval>,
    #[cfg(unix)]
    sighup: Signal,
    #[cfg(unix)]
    sigterm: Signal,
    #[cfg(unix)]
    sigint: Signal,
}

impl Events {
    fn new(reload_interval: Option<Duration>) -> Result<Self> {
        let reload = reload_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        if let Some(period) = reload_interval {
            info!("Configuration reloads every {:?}", period);
        }

        #[cfg(unix)]
        {
            Ok(Self {
                reload,
                sighup: signal(SignalKind::hangup())
                    .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?,
                sigterm: signal(SignalKind::terminate())
                    .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?,
                sigint: signal(SignalKind::interrupt())
                    .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self { reload })
        }
    }

    #[cfg(unix)]
    async fn next(&mut self) -> Event {
        let reload = next_tick(&mut self.reload);
        tokio::select! {
            _ = self.sighup.recv() => Event::Reload("SIGHUP"),
            _ = reload => Event::Reload("interval"),
            _ = self.sigterm.recv() => Event::Shutdown("SIGTERM"),
            _ = self.sigint.recv() => Event::Shutdown("SIGINT"),
        }
    }

    /// Fallback implementation for non-Unix platforms: CTRL-C only
    #[cfg(not(unix))]
    async fn next(&mut self) -> Event {
        let reload = next_tick(&mut self.reload);
        tokio::select! {
            _ = reload => Event::Reload("interval"),
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to wait for CTRL-C: {}", e);
                }
                Event::Shutdown("SIGINT")
            }
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
