use super::{Alert, AlertSink};
use async_trait::async_trait;
use tracing::{info, warn};

/// Writes alerts to the tracing log
#[derive(Debug, Clone, Default)]
pub struct ConsoleAlertSink;

impl ConsoleAlertSink {
    /// Create a console sink
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AlertSink for ConsoleAlertSink {
    async fn send_alert(&self, alert: &Alert) {
        match &alert.error {
            Some(detail) => warn!(
                "ALERT: [{}] {} ({}: {})",
                alert.category, alert.message, detail.error_class, detail.message
            ),
            None => info!("ALERT: [{}] {}", alert.category, alert.message),
        }
    }
}
