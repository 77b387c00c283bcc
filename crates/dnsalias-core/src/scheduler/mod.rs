//! Adaptive alias scheduler
//!
//! The Scheduler owns the live provider and alias tables, the ready
//! queue, one dispatch task and the worker tasks it spawns.
//!
//! ## Architecture
//!
//! ```text
//!   configure(doc) ──► provider table ──► alias table ──┐
//!                                                       │ new entries
//!                                                       ▼
//!                 ┌──────────── ready queue (min-heap by due time)
//!                 │                     ▲
//!                 ▼                     │ re-queue at now + TTL
//!           dispatch task ──spawn──► worker ── AliasProcessor::process
//! ```
//!
//! ## Lock Order
//!
//! lifecycle → provider table → alias table → entry flags → queue.
//! No lock is held across an `.await` except the per-entry task mutex,
//! which only serializes runs of that one entry.

mod configure;
mod dispatch;
mod entry;
mod queue;

pub use configure::ConfigureSummary;

use crate::alert::ConfigurableAlertSink;
use crate::config::SchedulerSettings;
use crate::error::{Error, Result};
use crate::registry::ProviderRegistry;
use crate::traits::SourceResolver;
use entry::{AliasEntry, ProviderEntry};
use parking_lot::Mutex;
use queue::ReadyQueue;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Snapshot of one live alias entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasStatus {
    /// Alias name from the configuration
    pub name: String,
    /// Entry id, changes whenever the entry is recreated
    pub id: u64,
    /// Name of the provider entry it writes through
    pub provider: String,
    /// Whether the entry will be re-queued after its next run
    pub active: bool,
    /// When the entry is next due
    pub next_run: Instant,
}

pub(crate) struct DispatchState {
    queue: ReadyQueue<Arc<AliasEntry>>,
    running: bool,
    generation: u64,
}

pub(crate) struct Inner {
    settings: SchedulerSettings,
    registry: Arc<ProviderRegistry>,
    resolver: Arc<dyn SourceResolver>,
    alerts: Arc<ConfigurableAlertSink>,
    providers: Mutex<BTreeMap<String, Arc<ProviderEntry>>>,
    aliases: Mutex<BTreeMap<String, Arc<AliasEntry>>>,
    dispatch: Mutex<DispatchState>,
    wake: Notify,
    next_id: AtomicU64,
}

impl Inner {
    /// Insert an entry into the ready queue, waking the dispatcher if it
    /// became the head
    ///
    /// With a generation, the insert only happens while that dispatch
    /// run is still current.
    fn enqueue(&self, entry: Arc<AliasEntry>, due: Instant, generation: Option<u64>) -> bool {
        let mut state = self.dispatch.lock();
        if let Some(generation) = generation {
            if !state.running || state.generation != generation {
                debug!("Not re-queueing {} because the scheduler stopped", entry.name);
                return false;
            }
        }

        if state.queue.push(due, entry) {
            self.wake.notify_one();
        }
        true
    }
}

/// Adaptive priority-queue scheduler for alias checks
///
/// # Example
///
/// ```rust,no_run
/// use dnsalias_core::{ProviderRegistry, Scheduler};
/// use dnsalias_core::resolver::HickorySourceResolver;
/// use dnsalias_core::secrets::EnvSecretProvider;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let scheduler = Scheduler::new(
///         Arc::new(ProviderRegistry::with_builtins()),
///         Arc::new(HickorySourceResolver::from_system_conf()?),
///     );
///
///     scheduler.start()?;
///     let config = dnsalias_core::config::load_file("/etc/dnsalias.json")?;
///     scheduler.configure(&config, &EnvSecretProvider::new())?;
///
///     tokio::signal::ctrl_c().await?;
///     scheduler.stop().await;
///     Ok(())
/// }
/// ```
pub struct Scheduler {
    inner: Arc<Inner>,
    lifecycle: Mutex<Option<JoinHandle<JoinSet<()>>>>,
}

impl Scheduler {
    /// Create a stopped scheduler with default settings
    pub fn new(registry: Arc<ProviderRegistry>, resolver: Arc<dyn SourceResolver>) -> Self {
        Self::with_settings(registry, resolver, SchedulerSettings::default())
    }

    /// Create a stopped scheduler
    pub fn with_settings(
        registry: Arc<ProviderRegistry>,
        resolver: Arc<dyn SourceResolver>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                registry,
                resolver,
                alerts: Arc::new(ConfigurableAlertSink::new()),
                providers: Mutex::new(BTreeMap::new()),
                aliases: Mutex::new(BTreeMap::new()),
                dispatch: Mutex::new(DispatchState {
                    queue: ReadyQueue::new(),
                    running: false,
                    generation: 0,
                }),
                wake: Notify::new(),
                next_id: AtomicU64::new(1),
            }),
            lifecycle: Mutex::new(None),
        }
    }

    /// Settings fixed at construction
    pub fn settings(&self) -> &SchedulerSettings {
        &self.inner.settings
    }

    /// The alert proxy fed by `configure`'s `alerts` section
    pub fn alert_sink(&self) -> Arc<ConfigurableAlertSink> {
        self.inner.alerts.clone()
    }

    /// Start the dispatch task
    ///
    /// The ready queue is rebuilt from the live table. On the first start
    /// every live alias is staggered from now, `start_stagger` apart; on a
    /// restart only aliases already overdue are, the rest keep their
    /// pending due time. Calling this
    /// on a running scheduler only logs a warning.
    ///
    /// # Errors
    ///
    /// Fails outside a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Other("The scheduler must be started inside a Tokio runtime".into()))?;

        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.is_some() {
            warn!("Scheduler start requested while already running");
            return Ok(());
        }

        let first_start = self.inner.dispatch.lock().generation == 0;
        let mut staged = Vec::new();
        {
            let aliases = self.inner.aliases.lock();
            let now = Instant::now();
            let mut due = now;
            for entry in aliases.values() {
                let mut flags = entry.flags.lock();
                if !flags.active {
                    continue;
                }
                if first_start || flags.next_run <= now {
                    flags.next_run = due;
                    due += self.inner.settings.start_stagger();
                }
                staged.push((entry.clone(), flags.next_run));
            }
        }

        let generation = {
            let mut state = self.inner.dispatch.lock();
            state.queue.clear();
            for (entry, due) in staged {
                state.queue.push(due, entry);
            }
            state.running = true;
            state.generation += 1;
            state.generation
        };

        info!(
            "Scheduler starting with {} alias(es) queued",
            self.queued_len()
        );
        *lifecycle = Some(handle.spawn(dispatch::dispatch_loop(self.inner.clone(), generation)));
        Ok(())
    }

    /// Stop dispatching and wait for running checks
    ///
    /// Checks still running after the grace period are abandoned. The
    /// ready queue is emptied; the live tables are kept.
    pub async fn stop(&self) {
        let handle = self.lifecycle.lock().take();

        self.inner.dispatch.lock().running = false;
        self.inner.wake.notify_one();

        let Some(handle) = handle else {
            debug!("Scheduler stop requested while not running");
            return;
        };

        let mut workers = match handle.await {
            Ok(workers) => workers,
            Err(e) => {
                error!("Scheduler dispatch task failed: {}", e);
                JoinSet::new()
            }
        };

        let grace = self.inner.settings.stop_grace();
        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = workers.join_next().await {
                dispatch::log_worker_result(result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "{} alias check(s) still running after {:?}, abandoning them",
                workers.len(),
                grace
            );
            workers.detach_all();
        }

        self.inner.dispatch.lock().queue.clear();
        info!("Scheduler stopped");
    }

    /// Whether the dispatch task is running
    pub fn is_running(&self) -> bool {
        self.inner.dispatch.lock().running
    }

    /// Number of entries in the ready queue, including stale ones
    pub fn queued_len(&self) -> usize {
        self.inner.dispatch.lock().queue.len()
    }

    /// Snapshot of the live alias table, ordered by name
    pub fn aliases(&self) -> Vec<AliasStatus> {
        let aliases = self.inner.aliases.lock();
        aliases
            .values()
            .map(|entry| {
                let flags = entry.flags.lock();
                AliasStatus {
                    name: entry.name.clone(),
                    id: entry.id,
                    provider: entry.provider.name.clone(),
                    active: flags.active,
                    next_run: flags.next_run,
                }
            })
            .collect()
    }

    /// Names of the live provider entries, ordered by name
    pub fn provider_names(&self) -> Vec<String> {
        self.inner.providers.lock().keys().cloned().collect()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.lifecycle.get_mut().is_some() {
            self.inner.dispatch.lock().running = false;
            self.inner.wake.notify_one();
        }
    }
}
