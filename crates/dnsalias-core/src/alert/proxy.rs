use super::{Alert, AlertCategory, AlertSink, create_sink};
use crate::error::{Error, Result};
use crate::secrets::SecretProvider;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Built alert configuration, ready to be applied to a proxy
#[derive(Clone)]
pub struct AlertRouting {
    sink: Option<Arc<dyn AlertSink>>,
    categories: BTreeSet<AlertCategory>,
}

impl AlertRouting {
    /// Routing that drops everything
    pub fn disabled() -> Self {
        Self {
            sink: None,
            categories: AlertCategory::ALL.into_iter().collect(),
        }
    }

    /// Routing that delivers every category to `sink`
    pub fn to_sink(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::disabled()
        }
    }

    /// Build routing from an optional `alerts` fragment
    ///
    /// `categories` restricts delivery; it defaults to every category.
    pub fn from_config(fragment: Option<&Value>, secrets: &dyn SecretProvider) -> Result<Self> {
        let Some(fragment) = fragment else {
            return Ok(Self::disabled());
        };

        let categories = match fragment.get("categories") {
            None | Some(Value::Null) => AlertCategory::ALL.into_iter().collect(),
            Some(list) => serde_json::from_value::<BTreeSet<AlertCategory>>(list.clone())
                .map_err(|e| Error::config(format!("Invalid alerts.categories: {}", e)))?,
        };

        Ok(Self {
            sink: Some(create_sink(fragment, secrets)?),
            categories,
        })
    }

    /// Whether alerts of `category` reach a sink
    pub fn delivers(&self, category: AlertCategory) -> bool {
        self.sink.is_some() && self.categories.contains(&category)
    }
}

/// Alert sink whose target can be replaced at runtime
///
/// Starts disabled. Alerts whose category is filtered out, or that
/// arrive while no sink is configured, are dropped.
pub struct ConfigurableAlertSink {
    routing: RwLock<AlertRouting>,
}

impl ConfigurableAlertSink {
    /// Create a disabled proxy
    pub fn new() -> Self {
        Self {
            routing: RwLock::new(AlertRouting::disabled()),
        }
    }

    /// Replace the current routing
    pub fn apply(&self, routing: AlertRouting) {
        *self.routing.write() = routing;
    }

    /// Build and apply routing from an optional `alerts` fragment
    ///
    /// On error the current routing is left in place.
    pub fn configure(&self, fragment: Option<&Value>, secrets: &dyn SecretProvider) -> Result<()> {
        let routing = AlertRouting::from_config(fragment, secrets)?;
        self.apply(routing);
        Ok(())
    }
}

impl Default for ConfigurableAlertSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertSink for ConfigurableAlertSink {
    async fn send_alert(&self, alert: &Alert) {
        let target = {
            let routing = self.routing.read();
            if routing.categories.contains(&alert.category) {
                routing.sink.clone()
            } else {
                None
            }
        };

        if let Some(target) = target {
            target.send_alert(alert).await;
        }
    }
}
