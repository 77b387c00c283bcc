//! Alert events and sinks
//!
//! Alerts are raised by processors (resolution changes) and by the
//! scheduler (failures). They flow through an [`AlertSink`]:
//!
//! - [`ConsoleAlertSink`]: writes to the tracing log
//! - [`WebhookAlertSink`]: POSTs each alert as JSON
//! - [`EmailAlertSink`]: mails each alert over SMTP
//! - [`ConfigurableAlertSink`]: swappable proxy with a category filter
//! - [`CollectingAlertSink`]: keeps alerts in memory

mod collecting;
mod console;
mod email;
mod proxy;
mod webhook;

pub use collecting::CollectingAlertSink;
pub use console::ConsoleAlertSink;
pub use email::EmailAlertSink;
pub use proxy::{AlertRouting, ConfigurableAlertSink};
pub use webhook::WebhookAlertSink;

use crate::error::{Error, Result};
use crate::secrets::SecretProvider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Alert category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertCategory {
    /// A configuration could not be applied
    ConfigurationException,
    /// Source names could not be resolved
    LookupException,
    /// The destination zone could not be read or written
    UpdateException,
    /// Unexpected failure while processing an alias
    ProcessingException,
    /// The destination record set was replaced
    ResolutionChange,
    /// The destination record set was removed
    ResolutionEmpty,
}

impl AlertCategory {
    /// Every category
    pub const ALL: [AlertCategory; 6] = [
        AlertCategory::ConfigurationException,
        AlertCategory::LookupException,
        AlertCategory::UpdateException,
        AlertCategory::ProcessingException,
        AlertCategory::ResolutionChange,
        AlertCategory::ResolutionEmpty,
    ];

    /// Wire name, e.g. `LOOKUP_EXCEPTION`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigurationException => "CONFIGURATION_EXCEPTION",
            Self::LookupException => "LOOKUP_EXCEPTION",
            Self::UpdateException => "UPDATE_EXCEPTION",
            Self::ProcessingException => "PROCESSING_EXCEPTION",
            Self::ResolutionChange => "RESOLUTION_CHANGE",
            Self::ResolutionEmpty => "RESOLUTION_EMPTY",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable description of an error and its causes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// Error class, e.g. `LookupError`
    pub error_class: String,

    /// Display text of the error
    pub message: String,

    /// Backtrace frames, empty unless backtraces are enabled
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,

    /// Underlying cause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorDetail>>,
}

impl ErrorDetail {
    /// Describe an error, walking its `source()` chain
    pub fn from_error(err: &Error) -> Self {
        let mut detail = Self::describe(err);

        let backtrace = std::backtrace::Backtrace::capture();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            detail.trace = backtrace
                .to_string()
                .lines()
                .map(|line| line.trim().to_string())
                .filter(|line| !line.is_empty())
                .collect();
        }

        detail
    }

    fn describe(err: &(dyn std::error::Error + 'static)) -> Self {
        let error_class = match err.downcast_ref::<Error>() {
            Some(known) => known.kind_name().to_string(),
            None => "Error".to_string(),
        };

        Self {
            error_class,
            message: err.to_string(),
            trace: Vec::new(),
            cause: err.source().map(|source| Box::new(Self::describe(source))),
        }
    }
}

/// One alert event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Category
    pub category: AlertCategory,

    /// Human readable message
    pub message: String,

    /// Attached error, if the alert was caused by one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,

    /// When the alert was raised
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    /// Create an alert without an attached error
    pub fn new(category: AlertCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            error: None,
            raised_at: Utc::now(),
        }
    }

    /// Create an alert caused by `err`
    pub fn with_error(category: AlertCategory, message: impl Into<String>, err: &Error) -> Self {
        Self {
            error: Some(ErrorDetail::from_error(err)),
            ..Self::new(category, message)
        }
    }
}

/// Destination for alerts
///
/// Delivery failures are handled by the sink itself (logged), never
/// returned to the caller.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one alert
    async fn send_alert(&self, alert: &Alert);
}

/// Build a sink from its configuration fragment
///
/// Supported types are `console`, `webhook` and `email` (alias `smtp`).
pub fn create_sink(fragment: &Value, secrets: &dyn SecretProvider) -> Result<Arc<dyn AlertSink>> {
    let sink_type = fragment
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::config("Missing required value: alerts.type"))?;

    match sink_type {
        "console" => Ok(Arc::new(ConsoleAlertSink::new())),
        "webhook" => Ok(Arc::new(WebhookAlertSink::from_config(fragment, secrets)?)),
        "email" | "smtp" => Ok(Arc::new(EmailAlertSink::from_config(fragment, secrets)?)),
        other => Err(Error::undefined_option(format!(
            "Alert type {} not known",
            other
        ))),
    }
}
