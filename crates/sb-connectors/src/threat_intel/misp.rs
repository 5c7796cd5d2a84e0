//! MISP (Malware Information Sharing Platform) threat intelligence connector.
//!
//! Event and attribute searches against the `restSearch` endpoints.

use crate::credential::{CredentialManager, SecretObserver, StaticKey};
use crate::http::{HttpClient, HttpRequest, HttpResponse, Transport};
use crate::sanitize::RecordSanitizer;
use crate::secure_string::SecureString;
use crate::traits::{Connector, ConnectorConfig, ConnectorError, ConnectorResult};
use crate::validation::{
    clamp_limit, sanitize_field, sanitize_text, MAX_LIMIT, MISP_KEYWORD, MISP_TEXT,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Event search endpoint.
pub const EVENTS_SEARCH_PATH: &str = "/events/restSearch";

/// Attribute search endpoint.
pub const ATTRIBUTES_SEARCH_PATH: &str = "/attributes/restSearch";

/// MISP connector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MispConfig {
    /// Base URL, transport and TLS settings.
    #[serde(flatten)]
    pub connector: ConnectorConfig,
    /// Automation key sent as the `Authorization` header.
    #[serde(default)]
    pub api_key: SecureString,
}

impl MispConfig {
    /// Creates a configuration with defaults.
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            connector: ConnectorConfig::new("misp", base_url),
            api_key: SecureString::from(api_key),
        }
    }

    /// Returns the secret values held by this configuration.
    pub fn secrets(&self) -> Vec<String> {
        if self.api_key.is_empty() {
            Vec::new()
        } else {
            vec![self.api_key.expose_secret().to_string()]
        }
    }
}

/// Validated event search parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSearch {
    /// Free-text match on the event info field; empty matches everything.
    pub query: String,
    /// Maximum events returned, already clamped.
    pub limit: u32,
    /// Attribute type filter; empty means any.
    pub event_type: String,
    /// Restricts to published or unpublished events when set.
    pub published: Option<bool>,
}

impl EventSearch {
    fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("limit".into(), json!(self.limit));
        body.insert("returnFormat".into(), json!("json"));
        if !self.query.is_empty() {
            body.insert("eventinfo".into(), json!(self.query));
        }
        if !self.event_type.is_empty() {
            body.insert("type".into(), json!(self.event_type));
        }
        if let Some(published) = self.published {
            body.insert("published".into(), json!(published));
        }
        Value::Object(body)
    }
}

/// Validated attribute search parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSearch {
    /// Indicator value to match; empty matches everything.
    pub value: String,
    /// Attribute type such as `ip-dst` or `md5`; empty means any.
    pub attr_type: String,
    /// Attribute category; empty means any.
    pub category: String,
    /// Maximum attributes returned, already clamped.
    pub limit: u32,
}

impl AttributeSearch {
    fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("limit".into(), json!(self.limit));
        body.insert("returnFormat".into(), json!("json"));
        if !self.value.is_empty() {
            body.insert("value".into(), json!(self.value));
        }
        if !self.attr_type.is_empty() {
            body.insert("type".into(), json!(self.attr_type));
        }
        if !self.category.is_empty() {
            body.insert("category".into(), json!(self.category));
        }
        Value::Object(body)
    }
}

#[derive(Debug, Deserialize)]
struct MispEventsResponse {
    #[serde(default)]
    response: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct MispAttributesResponse {
    #[serde(default)]
    response: MispAttributeList,
}

#[derive(Debug, Default, Deserialize)]
struct MispAttributeList {
    #[serde(rename = "Attribute", default)]
    attribute: Vec<Value>,
}

fn tag_sanitizer() -> RecordSanitizer {
    RecordSanitizer::keep(&["id", "name", "colour"])
}

fn attribute_sanitizer() -> RecordSanitizer {
    RecordSanitizer::keep(&[
        "id",
        "uuid",
        "event_id",
        "object_id",
        "type",
        "category",
        "value",
        "to_ids",
        "comment",
        "timestamp",
        "first_seen",
        "last_seen",
        "distribution",
        "deleted",
    ])
    .nested(
        "Event",
        RecordSanitizer::keep(&["id", "uuid", "info", "orgc_id", "org_id", "distribution"]),
    )
    .nested("Tag", tag_sanitizer())
}

fn event_sanitizer() -> RecordSanitizer {
    let event = RecordSanitizer::keep(&[
        "id",
        "uuid",
        "info",
        "date",
        "threat_level_id",
        "analysis",
        "published",
        "timestamp",
        "publish_timestamp",
        "org_id",
        "orgc_id",
        "distribution",
        "attribute_count",
    ])
    .nested("Orgc", RecordSanitizer::keep(&["id", "name", "uuid"]))
    .nested("Org", RecordSanitizer::keep(&["id", "name", "uuid"]))
    .nested("Tag", tag_sanitizer())
    .nested("Attribute", attribute_sanitizer());

    RecordSanitizer::new().nested("Event", event)
}

/// MISP connector.
pub struct MispConnector {
    config: MispConfig,
    transport: Arc<dyn Transport>,
    credentials: CredentialManager,
    event_sanitizer: RecordSanitizer,
    attribute_sanitizer: RecordSanitizer,
}

impl MispConnector {
    /// Creates a new MISP connector over HTTP.
    pub fn new(config: MispConfig) -> ConnectorResult<Self> {
        let transport = Arc::new(HttpClient::new(&config.connector)?);
        Self::with_transport(config, transport)
    }

    /// Creates a connector over the given transport.
    pub fn with_transport(
        config: MispConfig,
        transport: Arc<dyn Transport>,
    ) -> ConnectorResult<Self> {
        if config.api_key.is_empty() {
            return Err(ConnectorError::Config(
                "MISP requires an API key".to_string(),
            ));
        }

        info!(base_url = %config.connector.base_url, "MISP connector initialized");

        Ok(Self {
            credentials: CredentialManager::new(Arc::new(StaticKey::new(config.api_key.clone()))),
            event_sanitizer: event_sanitizer(),
            attribute_sanitizer: attribute_sanitizer(),
            config,
            transport,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &MispConfig {
        &self.config
    }

    /// Validates event search parameters. The limit is clamped here, before
    /// it is placed in the request body.
    pub fn validate_event_search(
        &self,
        query: &str,
        limit: i64,
        event_type: &str,
        published: Option<bool>,
    ) -> ConnectorResult<EventSearch> {
        Ok(EventSearch {
            query: sanitize_field(query, &MISP_TEXT, "query")?,
            limit: clamp_limit(limit, MAX_LIMIT),
            event_type: sanitize_field(event_type, &MISP_KEYWORD, "event_type")?,
            published,
        })
    }

    /// Validates attribute search parameters.
    pub fn validate_attribute_search(
        &self,
        value: &str,
        attr_type: &str,
        category: &str,
        limit: i64,
    ) -> ConnectorResult<AttributeSearch> {
        Ok(AttributeSearch {
            value: sanitize_text(value, &MISP_TEXT)?,
            attr_type: sanitize_field(attr_type, &MISP_KEYWORD, "type")?,
            category: sanitize_field(category, &MISP_KEYWORD, "category")?,
            limit: clamp_limit(limit, MAX_LIMIT),
        })
    }

    /// Searches events.
    #[instrument(skip(self))]
    pub async fn search_events(
        &self,
        query: &str,
        limit: i64,
        event_type: &str,
        published: Option<bool>,
    ) -> ConnectorResult<Vec<Value>> {
        let search = self.validate_event_search(query, limit, event_type, published)?;
        let response = self.post(EVENTS_SEARCH_PATH, search.body()).await?;

        let parsed: MispEventsResponse = response.json()?;
        let events = self.event_sanitizer.sanitize(parsed.response);
        debug!(results = events.len(), "Event search completed");
        Ok(events)
    }

    /// Searches attributes.
    #[instrument(skip(self))]
    pub async fn search_attributes(
        &self,
        value: &str,
        attr_type: &str,
        category: &str,
        limit: i64,
    ) -> ConnectorResult<Vec<Value>> {
        let search = self.validate_attribute_search(value, attr_type, category, limit)?;
        let response = self.post(ATTRIBUTES_SEARCH_PATH, search.body()).await?;

        let parsed: MispAttributesResponse = response.json()?;
        let attributes = self.attribute_sanitizer.sanitize(parsed.response.attribute);
        debug!(results = attributes.len(), "Attribute search completed");
        Ok(attributes)
    }

    async fn post(&self, path: &str, body: Value) -> ConnectorResult<HttpResponse> {
        let key = self.credentials.ensure_valid().await?;
        let request = HttpRequest::post(path).authorization(key).json(body);

        let response = self.transport.send(request).await?;
        if response.is_unauthorized() || response.status == 403 {
            return Err(ConnectorError::Authentication(format!(
                "MISP rejected the API key (status {})",
                response.status
            )));
        }
        if !response.is_success() {
            return Err(ConnectorError::Search(format!(
                "{} returned status {}",
                path, response.status
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl Connector for MispConnector {
    fn name(&self) -> &str {
        &self.config.connector.name
    }

    fn connector_type(&self) -> &str {
        "threat_intel"
    }

    fn observe_secrets(&self, observer: SecretObserver) {
        self.credentials.observe_with(observer);
    }

    async fn shutdown(&self) {
        self.credentials.clear().await;
    }
}
