//! Live reconfiguration
//!
//! `configure` runs in two phases. The first parses the whole document,
//! builds the alert routing and every new or changed provider, and
//! resolves each alias's provider reference; any failure returns before
//! a table is touched. The second commits the result:
//!
//! 1. Every provider entry is marked pending-delete. Entries whose
//!    fingerprint is unchanged are unmarked; changed ones are replaced
//!    under the same name and stay marked; what is still marked goes.
//! 2. Every alias entry is marked pending-delete. An entry is kept only
//!    if its own fingerprint is unchanged and its provider entry is not
//!    marked. Otherwise it is deactivated and a new entry is created and
//!    queued. Entries still marked at the end are deactivated and removed.

use super::Scheduler;
use super::entry::{AliasEntry, ProviderEntry};
use crate::alert::AlertRouting;
use crate::alias::Alias;
use crate::config::{AliasConfig, ConfigDocument, fingerprint};
use crate::error::{Error, Result};
use crate::processor::AliasProcessor;
use crate::secrets::SecretProvider;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What a `configure` call changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigureSummary {
    /// Providers created or replaced
    pub providers_created: usize,
    /// Providers kept as they were
    pub providers_kept: usize,
    /// Providers dropped
    pub providers_removed: usize,
    /// Alias entries created or recreated
    pub aliases_created: usize,
    /// Alias entries kept with their schedule and state
    pub aliases_kept: usize,
    /// Alias entries dropped
    pub aliases_removed: usize,
}

struct PlannedAlias {
    name: String,
    fingerprint: String,
    provider: Arc<ProviderEntry>,
    alias: Alias,
}

impl Scheduler {
    /// Apply a configuration document
    ///
    /// # Errors
    ///
    /// - `Error::Config`: a section is missing or malformed
    /// - `Error::UndefinedOption`: an alias names an undefined provider,
    ///   or a provider or alert type is unknown
    ///
    /// On error the previous configuration stays in effect.
    pub fn configure(&self, config: &Value, secrets: &dyn SecretProvider) -> Result<ConfigureSummary> {
        let document = ConfigDocument::parse(config)?;

        if let Some(settings) = &document.scheduler {
            if *settings != self.inner.settings {
                warn!("Scheduler settings differ from the running ones and are ignored until the process restarts");
            }
        }

        let routing = AlertRouting::from_config(document.alerts.as_ref(), secrets)?;

        let mut providers = self.inner.providers.lock();
        let mut summary = ConfigureSummary::default();

        // Phase one: build everything that can fail
        let mut next_providers: BTreeMap<String, Arc<ProviderEntry>> = BTreeMap::new();
        for (name, fragment) in &document.providers {
            let digest = fingerprint(fragment);
            let entry = match providers.get(name) {
                Some(existing) if existing.fingerprint == digest => existing.clone(),
                existing => {
                    if existing.is_some() {
                        info!("Provider entry for {} has changed.", name);
                    }
                    let provider = self
                        .inner
                        .registry
                        .create_provider(fragment, secrets)
                        .map_err(|e| with_context(e, &format!("providers.{}", name)))?;
                    Arc::new(ProviderEntry::new(name.clone(), digest, provider))
                }
            };
            next_providers.insert(name.clone(), entry);
        }

        let mut planned = Vec::with_capacity(document.aliases.len());
        for (name, fragment) in &document.aliases {
            let context = format!("aliases.{}", name);
            let alias_config =
                AliasConfig::from_value(fragment).map_err(|e| with_context(e, &context))?;
            let provider = next_providers
                .get(&alias_config.provider)
                .cloned()
                .ok_or_else(|| {
                    Error::undefined_option(format!(
                        "DNS provider {} is not defined.",
                        alias_config.provider
                    ))
                })?;
            let alias = Alias::from_config(&alias_config).map_err(|e| with_context(e, &context))?;

            planned.push(PlannedAlias {
                name: name.clone(),
                fingerprint: fingerprint(fragment),
                provider,
                alias,
            });
        }

        // Phase two: commit
        self.inner.alerts.apply(routing);

        for entry in providers.values() {
            entry.set_pending_delete(true);
        }
        for (name, entry) in next_providers {
            let kept = providers
                .get(&name)
                .is_some_and(|existing| Arc::ptr_eq(existing, &entry));
            if kept {
                summary.providers_kept += 1;
            } else {
                summary.providers_created += 1;
                providers.insert(name, entry.clone());
            }
            entry.set_pending_delete(false);
        }
        providers.retain(|name, entry| {
            if entry.is_pending_delete() {
                info!("Provider entry for {} has been removed.", name);
                summary.providers_removed += 1;
                false
            } else {
                true
            }
        });

        let mut aliases = self.inner.aliases.lock();
        for entry in aliases.values() {
            entry.flags.lock().pending_delete = true;
        }

        let mut due = Instant::now();
        let mut created = Vec::new();
        for plan in planned {
            if let Some(existing) = aliases.get(&plan.name) {
                let provider_changed = existing.provider.is_pending_delete();
                if existing.fingerprint == plan.fingerprint && !provider_changed {
                    existing.flags.lock().pending_delete = false;
                    summary.aliases_kept += 1;
                    continue;
                }

                existing.deactivate();
                if provider_changed {
                    info!(
                        "Alias entry for {} is being recreated because it references a provider that has been changed.",
                        plan.name
                    );
                } else {
                    info!("Alias entry for {} has changed.", plan.name);
                }
            }

            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            let processor =
                AliasProcessor::new(plan.alias, plan.provider.provider.clone(), self.inner.resolver.clone());
            let entry = Arc::new(AliasEntry::new(
                id,
                plan.name.clone(),
                plan.fingerprint,
                plan.provider,
                processor,
                due,
            ));
            debug!("Created alias entry {} ({})", plan.name, id);

            aliases.insert(plan.name, entry.clone());
            created.push((entry, due));
            due += self.inner.settings.configure_stagger();
        }

        aliases.retain(|name, entry| {
            let mut flags = entry.flags.lock();
            if flags.pending_delete {
                flags.active = false;
                info!("Alias entry for {} has been removed.", name);
                summary.aliases_removed += 1;
                false
            } else {
                true
            }
        });

        summary.aliases_created = created.len();
        for (entry, due) in created {
            self.inner.enqueue(entry, due, None);
        }
        drop(aliases);
        drop(providers);

        info!(
            "Configuration applied: providers {} new, {} kept, {} removed; aliases {} new, {} kept, {} removed",
            summary.providers_created,
            summary.providers_kept,
            summary.providers_removed,
            summary.aliases_created,
            summary.aliases_kept,
            summary.aliases_removed
        );
        Ok(summary)
    }
}

fn with_context(err: Error, context: &str) -> Error {
    match err {
        Error::Config(msg) => Error::Config(format!("{}: {}", context, msg)),
        Error::UndefinedOption(msg) => Error::UndefinedOption(format!("{}: {}", context, msg)),
        Error::Secret(msg) => Error::Secret(format!("{}: {}", context, msg)),
        other => other,
    }
}
