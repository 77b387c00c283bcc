use super::{Alert, AlertSink};
use crate::error::{Error, Result};
use crate::secrets::{SecretProvider, required_secret_string, resolve_secret};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Default HTTP timeout for webhook delivery (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// POSTs each alert as JSON to a URL
///
/// Configuration:
///
/// ```json
/// { "type": "webhook", "url": "@ALERT_URL", "headers": { "Authorization": "@ALERT_AUTH" } }
/// ```
///
/// A failed delivery is logged together with the alert it carried.
pub struct WebhookAlertSink {
    url: String,
    headers: Vec<(String, String)>,
    client: reqwest::Client,
}

// Header values usually carry credentials
impl std::fmt::Debug for WebhookAlertSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAlertSink")
            .field("url", &self.url)
            .field(
                "headers",
                &self.headers.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl WebhookAlertSink {
    /// Create a sink posting to `url`
    pub fn new(url: impl Into<String>, headers: Vec<(String, String)>) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(Error::config("Webhook URL cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url,
            headers,
            client,
        })
    }

    /// Create a sink from its `alerts` fragment
    pub fn from_config(fragment: &Value, secrets: &dyn SecretProvider) -> Result<Self> {
        let url = required_secret_string(fragment, "url", secrets)?;

        let mut headers = Vec::new();
        match fragment.get("headers") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (name, value) in map {
                    let raw = value.as_str().ok_or_else(|| {
                        Error::config(format!("Webhook header {} must be a string", name))
                    })?;
                    headers.push((name.clone(), resolve_secret(raw, secrets)?));
                }
            }
            Some(_) => return Err(Error::config("Webhook headers must be an object")),
        }

        Self::new(url, headers)
    }

    async fn post(&self, alert: &Alert) -> Result<()> {
        let mut request = self.client.post(&self.url).json(alert);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("Webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http(format!("Webhook returned status {}", status)));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send_alert(&self, alert: &Alert) {
        if let Err(e) = self.post(alert).await {
            tracing::error!(
                "Unable to deliver alert [{}] {}: {}",
                alert.category,
                alert.message,
                e
            );
        }
    }
}
