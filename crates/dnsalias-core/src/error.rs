//! Error types for the DNS alias system
//!
//! This module defines all error types used throughout the crate.
//! The scheduler distinguishes [`Error::Lookup`] and [`Error::Update`]
//! (transient, alert-gated) from everything else (always alerted).

use thiserror::Error;

/// Result type alias for DNS alias operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error used as the attached cause of lookup and update failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core error type for the DNS alias system
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A named option (provider, alert sink, provider type) is not defined
    #[error("Undefined option: {0}")]
    UndefinedOption(String),

    /// A `@NAME` secret reference could not be resolved
    #[error("Secret not found: {0}")]
    Secret(String),

    /// Source resolution failed
    #[error("{message}")]
    Lookup {
        /// Error message
        message: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// Reading or writing the destination zone failed
    #[error("{message}")]
    Update {
        /// Error message
        message: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// HTTP client errors (from provider APIs and webhooks)
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an undefined option error
    pub fn undefined_option(msg: impl Into<String>) -> Self {
        Self::UndefinedOption(msg.into())
    }

    /// Create a missing secret error
    pub fn secret(msg: impl Into<String>) -> Self {
        Self::Secret(msg.into())
    }

    /// Create a lookup error without a cause
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a lookup error wrapping its cause
    pub fn lookup_with(msg: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Lookup {
            message: msg.into(),
            source: Some(source.into()),
        }
    }

    /// Create an update error without a cause
    pub fn update(msg: impl Into<String>) -> Self {
        Self::Update {
            message: msg.into(),
            source: None,
        }
    }

    /// Create an update error wrapping its cause
    pub fn update_with(msg: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Update {
            message: msg.into(),
            source: Some(source.into()),
        }
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Whether this is a configuration-class failure that aborts `configure`
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::UndefinedOption(_) | Self::Secret(_) | Self::Json(_)
        )
    }

    /// Stable name of the error class, used in alert details
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigurationError",
            Self::UndefinedOption(_) => "UndefinedOptionError",
            Self::Secret(_) => "SecretError",
            Self::Lookup { .. } => "LookupError",
            Self::Update { .. } => "UpdateError",
            Self::Provider { .. } => "ProviderError",
            Self::Authentication(_) => "AuthenticationError",
            Self::RateLimited(_) => "RateLimitedError",
            Self::Http(_) => "HttpError",
            Self::Io(_) => "IoError",
            Self::Json(_) => "JsonError",
            Self::Other(_) => "Error",
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
