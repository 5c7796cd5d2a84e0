//! CrowdStrike detection search tool.

use crate::registry::{ParameterDef, ParameterType, Tool, ToolArguments};
use async_trait::async_trait;
use sb_connectors::{ConnectorResult, CrowdStrikeConnector};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;

/// Searches Falcon detections with an FQL filter.
pub struct CrowdStrikeSearchDetectionsTool {
    connector: Arc<CrowdStrikeConnector>,
}

impl CrowdStrikeSearchDetectionsTool {
    pub fn new(connector: Arc<CrowdStrikeConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl Tool for CrowdStrikeSearchDetectionsTool {
    fn name(&self) -> &str {
        "search-detections"
    }

    fn description(&self) -> &str {
        "Search CrowdStrike detections with an optional FQL filter"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![
            ParameterDef::optional(
                "filter_query",
                "FQL filter expression",
                ParameterType::String,
                json!(""),
            ),
            ParameterDef::optional(
                "limit",
                "Maximum number of detections (1-1000)",
                ParameterType::Integer,
                json!(100),
            ),
            ParameterDef::optional(
                "sort",
                "Sort key with .asc or .desc suffix",
                ParameterType::String,
                json!("created_timestamp.desc"),
            ),
        ]
    }

    #[instrument(skip(self, args))]
    async fn call(&self, args: &ToolArguments) -> ConnectorResult<Vec<Value>> {
        let filter_query = args.string_or("filter_query", "")?;
        let limit = args.integer_or("limit", 100)?;
        let sort = args.string_or("sort", "created_timestamp.desc")?;

        self.connector
            .search_detections(&filter_query, limit, &sort)
            .await
    }
}
