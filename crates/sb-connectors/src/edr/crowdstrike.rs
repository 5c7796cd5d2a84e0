//! CrowdStrike Falcon detection search.
//!
//! Detection search is two calls: an FQL query that returns detection ids,
//! then a bulk summaries fetch for those ids.

use crate::credential::{CredentialManager, OAuthClientCredentials, SecretObserver};
use crate::http::{HttpClient, HttpRequest, HttpResponse, Transport};
use crate::sanitize::RecordSanitizer;
use crate::secure_string::SecureString;
use crate::traits::{Connector, ConnectorConfig, ConnectorError, ConnectorResult};
use crate::validation::{
    clamp_limit, sanitize_text, validate_sort, DETECTION_SORT_KEYS, FQL_FILTER, MAX_LIMIT,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Detection id query endpoint.
pub const DETECTS_QUERY_PATH: &str = "/detects/queries/detects/v1";

/// Detection summaries endpoint.
pub const DETECTS_SUMMARIES_PATH: &str = "/detects/entities/summaries/GET/v1";

/// CrowdStrike-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrowdStrikeConfig {
    /// Base connector configuration.
    #[serde(flatten)]
    pub connector: ConnectorConfig,
    /// OAuth2 client id.
    #[serde(default)]
    pub client_id: String,
    /// OAuth2 client secret.
    #[serde(default)]
    pub client_secret: SecureString,
    /// API region: us-1, us-2, eu-1, us-gov-1.
    #[serde(default = "default_region")]
    pub region: String,
    /// Member CID for MSSP deployments.
    #[serde(default)]
    pub member_cid: Option<String>,
}

fn default_region() -> String {
    "us-1".to_string()
}

/// Get base URL for CrowdStrike region.
pub fn region_url(region: &str) -> &'static str {
    match region {
        "us-2" => "https://api.us-2.crowdstrike.com",
        "eu-1" => "https://api.eu-1.crowdstrike.com",
        "us-gov-1" => "https://api.laggar.gcw.crowdstrike.com",
        _ => "https://api.crowdstrike.com",
    }
}

impl CrowdStrikeConfig {
    /// Creates a configuration for the default region.
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        Self {
            connector: ConnectorConfig::new("crowdstrike", ""),
            client_id: client_id.to_string(),
            client_secret: SecureString::from(client_secret),
            region: default_region(),
            member_cid: None,
        }
    }

    /// Configured base URL, or the region's URL when none is set.
    pub fn effective_base_url(&self) -> String {
        if self.connector.base_url.trim().is_empty() {
            region_url(&self.region).to_string()
        } else {
            self.connector.base_url.clone()
        }
    }

    /// Returns the secret values held by this configuration.
    pub fn secrets(&self) -> Vec<String> {
        if self.client_secret.is_empty() {
            Vec::new()
        } else {
            vec![self.client_secret.expose_secret().to_string()]
        }
    }
}

/// A validated detection search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionSearch {
    /// FQL filter; empty for none.
    pub filter: String,
    /// Maximum number of detections.
    pub limit: u32,
    /// Sort key.
    pub sort: String,
}

#[derive(Debug, Deserialize)]
struct CSQueryResponse {
    #[serde(default)]
    resources: Vec<Value>,
}

fn detection_sanitizer() -> RecordSanitizer {
    let device = RecordSanitizer::keep(&[
        "device_id",
        "hostname",
        "platform_name",
        "os_version",
        "local_ip",
        "external_ip",
        "mac_address",
        "machine_domain",
        "site_name",
        "status",
    ]);
    let behavior = RecordSanitizer::keep(&[
        "behavior_id",
        "timestamp",
        "tactic",
        "tactic_id",
        "technique",
        "technique_id",
        "display_name",
        "description",
        "severity",
        "confidence",
        "objective",
        "scenario",
        "filename",
        "sha256",
        "md5",
        "user_name",
        "pattern_disposition",
    ]);

    RecordSanitizer::keep(&[
        "detection_id",
        "cid",
        "created_timestamp",
        "first_behavior",
        "last_behavior",
        "max_severity",
        "max_severity_displayname",
        "max_confidence",
        "status",
        "show_in_ui",
        "seconds_to_triaged",
        "seconds_to_resolved",
        "email_sent",
    ])
    .nested("device", device)
    .nested("behaviors", behavior)
}

/// CrowdStrike Falcon connector.
pub struct CrowdStrikeConnector {
    config: CrowdStrikeConfig,
    transport: Arc<dyn Transport>,
    credentials: CredentialManager,
    sanitizer: RecordSanitizer,
}

impl CrowdStrikeConnector {
    /// Creates a new CrowdStrike connector over HTTP.
    pub fn new(config: CrowdStrikeConfig) -> ConnectorResult<Self> {
        let mut connector_config = config.connector.clone();
        connector_config.base_url = config.effective_base_url();
        let transport = Arc::new(HttpClient::new(&connector_config)?);
        Self::with_transport(config, transport)
    }

    /// Creates a connector over the given transport.
    pub fn with_transport(
        config: CrowdStrikeConfig,
        transport: Arc<dyn Transport>,
    ) -> ConnectorResult<Self> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(ConnectorError::Config(
                "CrowdStrike requires a client id and client secret".to_string(),
            ));
        }

        let exchange = OAuthClientCredentials::new(
            transport.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
            config.member_cid.clone(),
        );

        info!(
            region = %config.region,
            base_url = %config.effective_base_url(),
            "CrowdStrike connector initialized"
        );

        Ok(Self {
            credentials: CredentialManager::new(Arc::new(exchange)),
            sanitizer: detection_sanitizer(),
            config,
            transport,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CrowdStrikeConfig {
        &self.config
    }

    /// Validates raw search parameters without any network call.
    pub fn validate_search(
        &self,
        filter_query: &str,
        limit: i64,
        sort: &str,
    ) -> ConnectorResult<DetectionSearch> {
        Ok(DetectionSearch {
            filter: sanitize_text(filter_query, &FQL_FILTER)?,
            limit: clamp_limit(limit, MAX_LIMIT),
            sort: validate_sort(sort, DETECTION_SORT_KEYS)?,
        })
    }

    /// Searches detections and returns sanitized summaries.
    #[instrument(skip(self))]
    pub async fn search_detections(
        &self,
        filter_query: &str,
        limit: i64,
        sort: &str,
    ) -> ConnectorResult<Vec<Value>> {
        let search = self.validate_search(filter_query, limit, sort)?;
        let auth = self.credentials.ensure_valid().await?.with_prefix("Bearer ");

        let ids = self.query_detection_ids(&search, &auth).await?;
        if ids.is_empty() {
            debug!("No detections matched");
            return Ok(Vec::new());
        }

        let summaries = self.detection_summaries(ids, &auth).await?;
        let results = self.sanitizer.sanitize(summaries);
        info!(results = results.len(), "Detection search completed");
        Ok(results)
    }

    async fn check_response(&self, response: &HttpResponse, what: &str) -> ConnectorResult<()> {
        if response.is_unauthorized() {
            self.credentials.invalidate().await;
            return Err(ConnectorError::Authentication(format!(
                "{} rejected the access token",
                what
            )));
        }
        if !response.is_success() {
            return Err(ConnectorError::Search(format!(
                "{} returned status {}",
                what, response.status
            )));
        }
        Ok(())
    }

    async fn query_detection_ids(
        &self,
        search: &DetectionSearch,
        auth: &SecureString,
    ) -> ConnectorResult<Vec<Value>> {
        let mut request = HttpRequest::get(DETECTS_QUERY_PATH)
            .authorization(auth.clone())
            .query("limit", search.limit.to_string())
            .query("sort", search.sort.clone());
        if !search.filter.is_empty() {
            request = request.query("filter", search.filter.clone());
        }

        let response = self.transport.send(request).await?;
        self.check_response(&response, "detection query").await?;

        let parsed: CSQueryResponse = response.json()?;
        Ok(parsed.resources)
    }

    async fn detection_summaries(
        &self,
        ids: Vec<Value>,
        auth: &SecureString,
    ) -> ConnectorResult<Vec<Value>> {
        let request = HttpRequest::post(DETECTS_SUMMARIES_PATH)
            .authorization(auth.clone())
            .json(json!({ "ids": ids }));

        let response = self.transport.send(request).await?;
        self.check_response(&response, "detection summaries").await?;

        let parsed: CSQueryResponse = response.json()?;
        Ok(parsed.resources)
    }
}

#[async_trait]
impl Connector for CrowdStrikeConnector {
    fn name(&self) -> &str {
        &self.config.connector.name
    }

    fn connector_type(&self) -> &str {
        "edr"
    }

    fn observe_secrets(&self, observer: SecretObserver) {
        self.credentials.observe_with(observer);
    }

    async fn shutdown(&self) {
        self.credentials.clear().await;
    }
}
