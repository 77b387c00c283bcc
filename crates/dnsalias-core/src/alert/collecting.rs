use super::{Alert, AlertSink};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Keeps every alert in memory
///
/// Used by single-shot runs to build their report.
#[derive(Debug, Default)]
pub struct CollectingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl CollectingAlertSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the alerts received so far
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    /// Remove and return the alerts received so far
    pub fn take(&self) -> Vec<Alert> {
        std::mem::take(&mut *self.alerts.lock())
    }
}

#[async_trait]
impl AlertSink for CollectingAlertSink {
    async fn send_alert(&self, alert: &Alert) {
        self.alerts.lock().push(alert.clone());
    }
}
