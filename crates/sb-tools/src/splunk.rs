//! Splunk search tool.

use crate::registry::{ParameterDef, ParameterType, Tool, ToolArguments};
use async_trait::async_trait;
use sb_connectors::{ConnectorResult, SplunkConnector};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;

/// Runs an SPL search through the asynchronous job cycle.
pub struct SplunkSearchEventsTool {
    connector: Arc<SplunkConnector>,
}

impl SplunkSearchEventsTool {
    pub fn new(connector: Arc<SplunkConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl Tool for SplunkSearchEventsTool {
    fn name(&self) -> &str {
        "search-events"
    }

    fn description(&self) -> &str {
        "Search Splunk events with an SPL query and return the matching rows"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![
            ParameterDef::required("query", "SPL search query", ParameterType::String),
            ParameterDef::optional(
                "earliest_time",
                "Start of the time range (e.g. -24h)",
                ParameterType::String,
                json!("-24h"),
            ),
            ParameterDef::optional(
                "latest_time",
                "End of the time range (e.g. now)",
                ParameterType::String,
                json!("now"),
            ),
            ParameterDef::optional(
                "count",
                "Maximum number of results",
                ParameterType::Integer,
                json!(100),
            ),
        ]
    }

    #[instrument(skip(self, args))]
    async fn call(&self, args: &ToolArguments) -> ConnectorResult<Vec<Value>> {
        let query = args.require_string("query")?;
        let earliest_time = args.string_or("earliest_time", "-24h")?;
        let latest_time = args.string_or("latest_time", "now")?;
        let count = args.integer_or("count", 100)?;

        self.connector
            .search_events(&query, &earliest_time, &latest_time, count)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ToolOutput, ToolRegistry};
    use sb_connectors::http::Method;
    use sb_connectors::siem::splunk::JOBS_PATH;
    use sb_connectors::testing::MockTransport;
    use sb_connectors::{SecureString, SplunkConfig};

    const STATUS_PATH: &str = "/services/search/jobs/job-123";
    const RESULTS_PATH: &str = "/services/search/jobs/job-123/results";

    fn registry(mock: Arc<MockTransport>) -> ToolRegistry {
        let mut config = SplunkConfig::new("https://splunk.local:8089");
        config.token = SecureString::from("splunk-token");
        let connector = SplunkConnector::with_transport(config, mock).unwrap();

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SplunkSearchEventsTool::new(Arc::new(connector))));
        registry
    }

    fn status(state: &str) -> String {
        format!(
            r#"<entry xmlns="http://www.w3.org/2005/Atom" xmlns:s="http://dev.splunk.com/ns/rest">
  <content type="text/xml"><s:dict><s:key name="dispatchState">{}</s:key></s:dict></content>
</entry>"#,
            state
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_malware_search_through_tool() {
        let mock = Arc::new(MockTransport::new());
        mock.push(Method::POST, JOBS_PATH, 201, r#"{"sid": "job-123"}"#)
            .await;
        mock.push_n(Method::GET, STATUS_PATH, 2, 200, &status("RUNNING"))
            .await;
        mock.push(Method::GET, STATUS_PATH, 200, status("DONE")).await;
        mock.push(
            Method::GET,
            RESULTS_PATH,
            200,
            r#"{"results": [{"id": 1, "raw_data": "x"}]}"#,
        )
        .await;

        let output = registry(mock.clone())
            .invoke("search-events", json!({"query": "malware"}))
            .await;

        assert_eq!(output, ToolOutput::Records(vec![json!({"id": 1})]));
        assert_eq!(mock.count(Method::GET, STATUS_PATH).await, 3);

        let submit = &mock.requests_to(Method::POST, JOBS_PATH).await[0];
        assert_eq!(submit.form_value("earliest_time"), Some("-24h"));
        assert_eq!(submit.form_value("latest_time"), Some("now"));
        assert_eq!(submit.form_value("count"), Some("100"));
    }

    #[tokio::test]
    async fn test_missing_query_is_validation_error() {
        let mock = Arc::new(MockTransport::new());
        let output = registry(mock.clone()).invoke("search-events", json!({})).await;

        assert_eq!(
            output,
            ToolOutput::error("Invalid parameters: query is required")
        );
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_job_returns_generic_error() {
        let mock = Arc::new(MockTransport::new());
        mock.push(Method::POST, JOBS_PATH, 201, r#"{"sid": "job-123"}"#)
            .await;
        mock.push(Method::GET, STATUS_PATH, 200, status("FAILED")).await;

        let output = registry(mock.clone())
            .invoke("search-events", json!({"query": "index=main"}))
            .await;

        assert!(output.is_error());
        assert!(!output.to_value().to_string().contains("job-123"));
        assert_eq!(mock.count(Method::GET, RESULTS_PATH).await, 0);
    }
}
