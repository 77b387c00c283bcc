//! Single-shot execution
//!
//! Runs every alias of a configuration exactly once, in parallel, and
//! reports the alerts raised. There is no queue, no reconfiguration and
//! no failure gating: every failure becomes an alert.

use crate::alert::{
    Alert, AlertCategory, AlertRouting, AlertSink, CollectingAlertSink, ConfigurableAlertSink,
    ErrorDetail,
};
use crate::alias::Alias;
use crate::config::{AliasConfig, ConfigDocument};
use crate::error::{Error, Result};
use crate::processor::AliasProcessor;
use crate::registry::ProviderRegistry;
use crate::secrets::SecretProvider;
use crate::traits::{DnsProvider, SourceResolver};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Outcome of a single-shot run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleRunReport {
    /// Whether the run itself completed
    pub success: bool,

    /// Alerts raised by the run
    #[serde(default)]
    pub alerts: Vec<Alert>,

    /// Why the run could not complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl SingleRunReport {
    /// Number of alerts that carried an error
    pub fn alerts_with_errors(&self) -> usize {
        self.alerts.iter().filter(|a| a.error.is_some()).count()
    }

    /// True when the run failed or any alert carried an error
    pub fn failed(&self) -> bool {
        !self.success || self.alerts_with_errors() > 0
    }
}

/// Sends every alert to the caller and to the configured sink
struct FanOutSink {
    caller: Arc<dyn AlertSink>,
    configured: ConfigurableAlertSink,
}

#[async_trait]
impl AlertSink for FanOutSink {
    async fn send_alert(&self, alert: &Alert) {
        self.caller.send_alert(alert).await;
        self.configured.send_alert(alert).await;
    }
}

/// Runs each alias of a configuration once
pub struct SingleRunExecutor {
    registry: Arc<ProviderRegistry>,
    resolver: Arc<dyn SourceResolver>,
}

impl SingleRunExecutor {
    /// Create an executor
    pub fn new(registry: Arc<ProviderRegistry>, resolver: Arc<dyn SourceResolver>) -> Self {
        Self { registry, resolver }
    }

    /// Run every alias once and wait for all of them
    ///
    /// Alerts go to `caller` and, when the document has an `alerts`
    /// section, to that sink as well.
    ///
    /// # Errors
    ///
    /// Configuration problems, before any alias runs.
    pub async fn run(
        &self,
        config: &Value,
        secrets: &dyn SecretProvider,
        caller: Arc<dyn AlertSink>,
    ) -> Result<()> {
        let document = ConfigDocument::parse(config)?;

        let configured = ConfigurableAlertSink::new();
        configured.apply(AlertRouting::from_config(document.alerts.as_ref(), secrets)?);
        let sink = Arc::new(FanOutSink { caller, configured });

        let mut providers: BTreeMap<&str, Arc<dyn DnsProvider>> = BTreeMap::new();
        for (name, fragment) in &document.providers {
            providers.insert(name.as_str(), self.registry.create_provider(fragment, secrets)?);
        }

        let mut processors = Vec::with_capacity(document.aliases.len());
        for (name, fragment) in &document.aliases {
            let alias_config = AliasConfig::from_value(fragment)
                .map_err(|e| Error::config(format!("aliases.{}: {}", name, e)))?;
            let provider = providers
                .get(alias_config.provider.as_str())
                .cloned()
                .ok_or_else(|| {
                    Error::undefined_option(format!(
                        "DNS provider {} is not defined.",
                        alias_config.provider
                    ))
                })?;
            let alias = Alias::from_config(&alias_config)?;
            processors.push(AliasProcessor::new(alias, provider, self.resolver.clone()));
        }

        let mut jobs = JoinSet::new();
        for processor in processors {
            jobs.spawn(run_once(processor, sink.clone()));
        }

        while let Some(result) = jobs.join_next().await {
            if let Err(e) = result {
                error!("Single-shot alias check failed to complete: {}", e);
                let failure = Error::Other(format!("Alias check did not complete: {}", e));
                sink.send_alert(&Alert::with_error(
                    AlertCategory::ProcessingException,
                    "An exception occurred processing an alias",
                    &failure,
                ))
                .await;
            }
        }
        Ok(())
    }

    /// Run and build a report
    ///
    /// Each alert is logged as it is collected. With `logOutput` (the
    /// default), the whole report is logged as well.
    pub async fn run_report(&self, config: &Value, secrets: &dyn SecretProvider) -> SingleRunReport {
        let log_output = config
            .get("logOutput")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let collector = Arc::new(CollectingAlertSink::new());
        let report = match self.run(config, secrets, collector.clone()).await {
            Ok(()) => SingleRunReport {
                success: true,
                alerts: collector.take(),
                error: None,
            },
            Err(e) => {
                error!("Single-shot run failed: {}", e);
                SingleRunReport {
                    success: false,
                    alerts: collector.take(),
                    error: Some(ErrorDetail::from_error(&e)),
                }
            }
        };

        for alert in &report.alerts {
            info!("ALERT: [{}] {}", alert.category, alert.message);
        }

        if log_output {
            match serde_json::to_string(&report) {
                Ok(output) => info!("OUTPUT: {}", output),
                Err(e) => error!("Unable to serialize single-shot report: {}", e),
            }
        }
        report
    }
}

async fn run_once(mut processor: AliasProcessor, sink: Arc<FanOutSink>) {
    let outcome = processor.process_guarded(sink.as_ref()).await;

    let alert = match outcome {
        Ok(_) => return,
        Err(e @ Error::Lookup { .. }) => Alert::with_error(
            AlertCategory::LookupException,
            format!("An exception occurred reading source data for {}", processor),
            &e,
        ),
        Err(e @ Error::Update { .. }) => Alert::with_error(
            AlertCategory::UpdateException,
            format!("An exception occurred in the DNS provider for {}", processor),
            &e,
        ),
        Err(e) => Alert::with_error(
            AlertCategory::ProcessingException,
            "An exception occurred processing an alias",
            &e,
        ),
    };
    sink.send_alert(&alert).await;
}
