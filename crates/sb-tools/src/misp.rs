//! MISP event and attribute search tools.

use crate::registry::{ParameterDef, ParameterType, Tool, ToolArguments};
use async_trait::async_trait;
use sb_connectors::{ConnectorResult, MispConnector};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;

/// Searches MISP events.
pub struct MispSearchEventsTool {
    connector: Arc<MispConnector>,
}

impl MispSearchEventsTool {
    pub fn new(connector: Arc<MispConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl Tool for MispSearchEventsTool {
    fn name(&self) -> &str {
        "search-events"
    }

    fn description(&self) -> &str {
        "Search MISP events by info text, type and publication state"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![
            ParameterDef::optional(
                "query",
                "Text matched against event info",
                ParameterType::String,
                json!(""),
            ),
            ParameterDef::optional(
                "limit",
                "Maximum number of events (1-1000)",
                ParameterType::Integer,
                json!(100),
            ),
            ParameterDef::optional(
                "event_type",
                "Event type filter",
                ParameterType::String,
                json!(""),
            ),
            ParameterDef::optional(
                "published",
                "Only published (true) or unpublished (false) events",
                ParameterType::Boolean,
                Value::Null,
            ),
        ]
    }

    #[instrument(skip(self, args))]
    async fn call(&self, args: &ToolArguments) -> ConnectorResult<Vec<Value>> {
        let query = args.string_or("query", "")?;
        let limit = args.integer_or("limit", 100)?;
        let event_type = args.string_or("event_type", "")?;
        let published = args.optional_bool("published")?;

        self.connector
            .search_events(&query, limit, &event_type, published)
            .await
    }
}

/// Searches MISP attributes.
pub struct MispSearchAttributesTool {
    connector: Arc<MispConnector>,
}

impl MispSearchAttributesTool {
    pub fn new(connector: Arc<MispConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl Tool for MispSearchAttributesTool {
    fn name(&self) -> &str {
        "search-attributes"
    }

    fn description(&self) -> &str {
        "Search MISP attributes (indicators) by value, type and category"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![
            ParameterDef::optional(
                "value",
                "Attribute value to match",
                ParameterType::String,
                json!(""),
            ),
            ParameterDef::optional("type", "Attribute type", ParameterType::String, json!("")),
            ParameterDef::optional(
                "category",
                "Attribute category",
                ParameterType::String,
                json!(""),
            ),
            ParameterDef::optional(
                "limit",
                "Maximum number of attributes (1-1000)",
                ParameterType::Integer,
                json!(100),
            ),
        ]
    }

    #[instrument(skip(self, args))]
    async fn call(&self, args: &ToolArguments) -> ConnectorResult<Vec<Value>> {
        let value = args.string_or("value", "")?;
        let attr_type = args.string_or("type", "")?;
        let category = args.string_or("category", "")?;
        let limit = args.integer_or("limit", 100)?;

        self.connector
            .search_attributes(&value, &attr_type, &category, limit)
            .await
    }
}
