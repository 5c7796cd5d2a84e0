//! HTTP transport for connectors.
//!
//! Connectors never talk to `reqwest` directly. They build an [`HttpRequest`]
//! and hand it to a [`Transport`], which lets tests swap in
//! [`crate::testing::MockTransport`] without a network.

use crate::secure_string::SecureString;
use crate::traits::{ConnectorConfig, ConnectorError, ConnectorResult};
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Certificate, Client, Proxy};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use reqwest::Method;

/// Type alias for the rate limiter.
type RateLimiterType = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Form fields whose values are never printed.
const SECRET_FORM_FIELDS: &[&str] = &["password", "client_secret"];

/// Request payload.
#[derive(Clone, PartialEq)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    /// JSON document.
    Json(Value),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Form(fields) => {
                let shown: Vec<(&str, &str)> = fields
                    .iter()
                    .map(|(k, v)| {
                        if SECRET_FORM_FIELDS.contains(&k.as_str()) {
                            (k.as_str(), crate::secure_string::REDACTED)
                        } else {
                            (k.as_str(), v.as_str())
                        }
                    })
                    .collect();
                f.debug_tuple("Form").field(&shown).finish()
            }
            RequestBody::Json(v) => f.debug_tuple("Json").field(v).finish(),
        }
    }
}

/// A backend request relative to the connector's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Path below the base URL, e.g. `/services/search/jobs`.
    pub path: String,
    /// Query-string parameters in order.
    pub query: Vec<(String, String)>,
    /// Full `Authorization` header value, if any.
    pub authorization: Option<SecureString>,
    /// Request payload.
    pub body: RequestBody,
}

impl HttpRequest {
    /// Creates a request with no query, body or authorization.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            authorization: None,
            body: RequestBody::Empty,
        }
    }

    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Creates a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Appends a query-string parameter.
    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// Sets a form body.
    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.body = RequestBody::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Sets a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Sets the `Authorization` header value.
    pub fn authorization(mut self, value: SecureString) -> Self {
        self.authorization = Some(value);
        self
    }

    /// Looks up a query-string parameter.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Looks up a form field.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Form(fields) => fields
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

/// A backend response. The body is kept as text so callers can choose
/// between JSON and XML decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: String,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for 401.
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> ConnectorResult<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            ConnectorError::Parse(format!(
                "invalid JSON body (status {}): {}",
                self.status, e
            ))
        })
    }
}

/// Sends requests to a backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request. Only failures that produce no response are errors;
    /// HTTP error statuses come back as an [`HttpResponse`].
    async fn send(&self, request: HttpRequest) -> ConnectorResult<HttpResponse>;
}

/// `reqwest`-backed transport with TLS options and optional rate limiting.
pub struct HttpClient {
    client: Client,
    base_url: String,
    rate_limiter: Option<Arc<RateLimiterType>>,
}

impl HttpClient {
    /// Creates a new HTTP client from connector configuration.
    pub fn new(config: &ConnectorConfig) -> ConnectorResult<Self> {
        if config.base_url.trim().is_empty() {
            return Err(ConnectorError::Config(format!(
                "{}: base URL is not set",
                config.name
            )));
        }

        // TLS verification can only be turned off in debug builds.
        let verify_tls = if !config.verify_tls {
            #[cfg(debug_assertions)]
            {
                warn!(
                    base_url = %config.base_url,
                    connector_name = %config.name,
                    "TLS certificate verification DISABLED in development mode"
                );
                false
            }
            #[cfg(not(debug_assertions))]
            {
                warn!(
                    base_url = %config.base_url,
                    connector_name = %config.name,
                    "Ignoring request to disable TLS verification in a release build; use ca_cert_path for self-signed certificates"
                );
                true
            }
        } else {
            true
        };

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for (key, value) in &config.headers {
            if let (Ok(name), Ok(val)) = (
                HeaderName::try_from(key.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(name, val);
            }
        }

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!verify_tls)
            .default_headers(headers)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90));

        if let Some(proxy) = &config.proxy {
            let proxy = Proxy::all(proxy)
                .map_err(|e| ConnectorError::Config(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        if let Some(path) = &config.ca_cert_path {
            let pem = std::fs::read(path).map_err(|e| {
                ConnectorError::Config(format!("cannot read CA certificate {}: {}", path, e))
            })?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| ConnectorError::Config(format!("invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| ConnectorError::Config(e.to_string()))?;

        let rate_limiter = match config.requests_per_minute {
            Some(rpm) => {
                let rpm = NonZeroU32::new(rpm).ok_or_else(|| {
                    ConnectorError::Config("requests_per_minute must be positive".to_string())
                })?;
                Some(Arc::new(GovernorRateLimiter::direct(Quota::per_minute(rpm))))
            }
            None => None,
        };

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            rate_limiter,
        })
    }

    /// Builds a URL from a path.
    pub fn build_url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    /// Gets the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: HttpRequest) -> ConnectorResult<HttpResponse> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let url = self.build_url(&request.path);
        debug!(method = %request.method, path = %request.path, "Sending request");

        let mut builder = self.client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(auth) = &request.authorization {
            let mut value = HeaderValue::from_str(auth.expose_secret()).map_err(|_| {
                ConnectorError::Authentication("credential is not a valid header value".into())
            })?;
            value.set_sensitive(true);
            builder = builder.header(AUTHORIZATION, value);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Json(body) => builder.json(body),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ConnectorError::Timeout(format!("{} {}", request.method, request.path))
            } else {
                ConnectorError::Transport(e.without_url().to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ConnectorError::Timeout(format!("{} {}", request.method, request.path))
            } else {
                ConnectorError::Transport(e.without_url().to_string())
            }
        })?;

        debug!(path = %request.path, status, "Received response");
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        let config = ConnectorConfig::new("splunk", "https://splunk.local:8089/");
        let client = HttpClient::new(&config).unwrap();
        assert_eq!(
            client.build_url("/services/search/jobs"),
            "https://splunk.local:8089/services/search/jobs"
        );
    }

    #[test]
    fn test_missing_base_url_is_config_error() {
        let config = ConnectorConfig::new("misp", "");
        assert!(matches!(
            HttpClient::new(&config),
            Err(ConnectorError::Config(_))
        ));
    }

    #[test]
    fn test_zero_rate_limit_is_config_error() {
        let mut config = ConnectorConfig::new("misp", "https://misp.local");
        config.requests_per_minute = Some(0);
        assert!(matches!(
            HttpClient::new(&config),
            Err(ConnectorError::Config(_))
        ));
    }

    #[test]
    fn test_request_debug_hides_secrets() {
        let request = HttpRequest::post("/services/auth/login")
            .form([("username", "admin"), ("password", "hunter2")])
            .authorization(SecureString::from("Splunk session-abc"));

        let printed = format!("{:?}", request);
        assert!(printed.contains("admin"));
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("session-abc"));
    }

    #[test]
    fn test_request_lookups() {
        let request = HttpRequest::get("/detects/queries/detects/v1")
            .query("limit", "10")
            .query("sort", "status.asc");
        assert_eq!(request.query_value("limit"), Some("10"));
        assert_eq!(request.query_value("filter"), None);
        assert_eq!(request.form_value("limit"), None);
    }

    #[test]
    fn test_response_json_error_is_parse() {
        let response = HttpResponse::new(200, "<html>");
        let parsed: ConnectorResult<Value> = response.json();
        assert!(matches!(parsed, Err(ConnectorError::Parse(_))));
        assert!(response.is_success());
        assert!(HttpResponse::new(401, "").is_unauthorized());
    }
}
