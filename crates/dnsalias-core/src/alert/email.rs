use super::{Alert, AlertSink, ErrorDetail};
use crate::error::{Error, Result};
use crate::secrets::{SecretProvider, optional_secret_string, required_secret_string};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::Value;
use std::fmt::Write as _;
use std::time::Duration;

/// Submission port used when `port` is omitted
const DEFAULT_SMTP_PORT: u16 = 587;

/// Connect and command timeout for the SMTP session (20 seconds)
const SMTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Sends each alert as a plain-text mail over SMTP
///
/// Configuration:
///
/// ```json
/// {
///   "type": "email",
///   "host": "smtp.example.com",
///   "port": 587,
///   "tls": true,
///   "username": "alerts",
///   "password": "@SMTP_PASSWORD",
///   "from": "dnsalias@example.com",
///   "to": ["ops@example.com"]
/// }
/// ```
///
/// `tls` requests STARTTLS and defaults to on. Credentials are only used
/// when both `username` and `password` are present. Addresses are parsed
/// when the sink is built, so a bad address fails `configure`.
pub struct EmailAlertSink {
    host: String,
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for EmailAlertSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailAlertSink")
            .field("host", &self.host)
            .field("from", &self.from.to_string())
            .field("to", &self.to.iter().map(ToString::to_string).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl EmailAlertSink {
    /// Create a sink from its `alerts` fragment
    pub fn from_config(fragment: &Value, secrets: &dyn SecretProvider) -> Result<Self> {
        let host = required_secret_string(fragment, "host", secrets)?;
        if host.is_empty() {
            return Err(Error::config("SMTP host cannot be empty"));
        }

        let port = match fragment.get("port") {
            None | Some(Value::Null) => DEFAULT_SMTP_PORT,
            Some(value) => value
                .as_u64()
                .and_then(|port| u16::try_from(port).ok())
                .filter(|port| *port != 0)
                .ok_or_else(|| Error::config("Value port must be a TCP port number"))?,
        };

        let tls = match fragment.get("tls") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(tls)) => *tls,
            Some(_) => return Err(Error::config("Value tls must be a boolean")),
        };

        let username = optional_secret_string(fragment, "username", secrets)?;
        let password = optional_secret_string(fragment, "password", secrets)?;

        let from = parse_mailbox(&required_secret_string(fragment, "from", secrets)?)
            .map_err(|_| Error::config("Unable to parse from address"))?;

        let to_values = fragment
            .get("to")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::config("Missing required value: to"))?;
        let mut to = Vec::with_capacity(to_values.len());
        for value in to_values {
            let address = value
                .as_str()
                .ok_or_else(|| Error::config("Values in to must be strings"))?;
            to.push(
                parse_mailbox(address)
                    .map_err(|_| Error::config(format!("Unable to parse to address {}", address)))?,
            );
        }
        if to.is_empty() {
            return Err(Error::config("At least one TO address is required"));
        }

        let builder = if tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host).map_err(|e| {
                Error::config(format!("Unable to set up SMTP relay {}: {}", host, e))
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host.as_str())
        };
        let mut builder = builder.port(port).timeout(Some(SMTP_TIMEOUT));
        if let (Some(username), Some(password)) = (username, password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            host,
            from,
            to,
            transport: builder.build(),
        })
    }

    fn message(&self, alert: &Alert) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject(alert))
            .header(ContentType::TEXT_PLAIN);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .body(body(alert))
            .map_err(|e| Error::Other(format!("Unable to build alert mail: {}", e)))
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        let message = self.message(alert)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| Error::Other(format!("SMTP delivery via {} failed: {}", self.host, e)))?;
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> std::result::Result<Mailbox, lettre::address::AddressError> {
    address.trim().parse()
}

fn subject(alert: &Alert) -> String {
    format!("DNS Alias {}", alert.category)
}

/// Mail body: the message, then the attached error and its causes
fn body(alert: &Alert) -> String {
    let mut body = String::new();
    body.push_str(&alert.message);
    body.push('\n');
    if let Some(detail) = &alert.error {
        write_detail(detail, &mut body);
    }
    body
}

fn write_detail(detail: &ErrorDetail, body: &mut String) {
    let _ = write!(
        body,
        "\r\nMessage: {}\r\nException: {}\r\nTrace:\r\n",
        detail.message, detail.error_class
    );
    for (level, frame) in detail.trace.iter().enumerate() {
        let _ = write!(body, "  Frame {}:\r\n    {}\r\n", level, frame);
    }
    if let Some(cause) = &detail.cause {
        body.push_str("\r\nCaused By:\r\n");
        write_detail(cause, body);
    }
}

#[async_trait]
impl AlertSink for EmailAlertSink {
    async fn send_alert(&self, alert: &Alert) {
        if let Err(e) = self.deliver(alert).await {
            tracing::error!("Error sending alert: {}", e);
            tracing::error!("Original alert: [{}] {}", alert.category, alert.message);
        }
    }
}
