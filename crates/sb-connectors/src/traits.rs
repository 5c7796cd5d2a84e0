//! Shared connector types: error taxonomy, base configuration and the
//! [`Connector`] trait implemented by every backend adapter.

use crate::credential::SecretObserver;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur in connectors.
///
/// Messages may contain backend detail and are meant for internal logs only.
/// Use [`ConnectorError::public_message`] for anything that leaves the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// Caller input was rejected before any network call.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The backend rejected credentials or the login exchange failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The backend reported a failed job or a non-2xx status on a data call.
    #[error("Search failed: {0}")]
    Search(String),

    /// The job poll budget ran out before the job finished.
    #[error("Search job {sid} did not finish after {attempts} status checks")]
    SearchTimeout {
        /// Job identifier.
        sid: String,
        /// Number of status polls issued.
        attempts: u32,
    },

    /// A structured response body could not be decoded.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The request never produced a response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The per-call transport timeout elapsed.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Invalid connector configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConnectorError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectorError::Validation(_) => "validation",
            ConnectorError::Authentication(_) => "authentication",
            ConnectorError::Search(_) => "search",
            ConnectorError::SearchTimeout { .. } => "search_timeout",
            ConnectorError::Parse(_) => "parse",
            ConnectorError::Transport(_) => "transport",
            ConnectorError::Timeout(_) => "timeout",
            ConnectorError::Config(_) => "config",
        }
    }

    /// Generic message that is safe to hand back to a tool caller.
    ///
    /// Validation messages are built without echoing the rejected input, so
    /// they are passed through; every other kind maps to fixed text.
    pub fn public_message(&self) -> String {
        match self {
            ConnectorError::Validation(msg) => format!("Invalid parameters: {}", msg),
            ConnectorError::Authentication(_) => {
                "Authentication with the backend failed. Please check the configured credentials."
                    .to_string()
            }
            ConnectorError::Search(_) | ConnectorError::Parse(_) => {
                "Search operation failed. Please check your query and try again.".to_string()
            }
            ConnectorError::SearchTimeout { .. } => {
                "Search did not complete in time. Please narrow the query or time range."
                    .to_string()
            }
            ConnectorError::Transport(_) | ConnectorError::Timeout(_) => {
                "The backend could not be reached. Please try again later.".to_string()
            }
            ConnectorError::Config(_) => "The connector is not configured correctly.".to_string(),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Configuration shared by all connectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Connector name used in logs.
    #[serde(default)]
    pub name: String,
    /// Base URL for the backend API.
    #[serde(default)]
    pub base_url: String,
    /// Per-request transport timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether to verify TLS certificates.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    /// Optional HTTP(S) proxy URL.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Optional PEM file with an additional trusted CA certificate.
    #[serde(default)]
    pub ca_cert_path: Option<String>,
    /// Outbound requests allowed per minute (unlimited when unset).
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
    /// Additional headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_verify_tls() -> bool {
    true
}

impl ConnectorConfig {
    /// Creates a configuration with defaults for everything but name and URL.
    pub fn new(name: &str, base_url: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            timeout_secs: default_timeout_secs(),
            verify_tls: default_verify_tls(),
            proxy: None,
            ca_cert_path: None,
            requests_per_minute: None,
            headers: HashMap::new(),
        }
    }
}

/// Base trait for all backend adapters.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the connector name.
    fn name(&self) -> &str;

    /// Returns the backend kind ("edr", "threat_intel", "siem").
    fn connector_type(&self) -> &str;

    /// Hands every credential value obtained at runtime to `observer`, so it
    /// can be redacted from logs.
    fn observe_secrets(&self, observer: SecretObserver);

    /// Clears the cached credential. Called once on process shutdown.
    async fn shutdown(&self);
}
