//! Router tests through `tower::ServiceExt::oneshot`.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use sb_api::{build_router, AppState};
use sb_connectors::http::Method;
use sb_connectors::testing::MockTransport;
use sb_connectors::threat_intel::misp::EVENTS_SEARCH_PATH;
use sb_connectors::{ConnectorError, ConnectorResult, MispConfig, MispConnector};
use sb_tools::{
    MispSearchAttributesTool, MispSearchEventsTool, ParameterDef, Tool, ToolArguments,
    ToolRegistry,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "explode"
    }

    fn description(&self) -> &str {
        "Panics"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![]
    }

    async fn call(&self, _args: &ToolArguments) -> ConnectorResult<Vec<Value>> {
        panic!("tool blew up")
    }
}

struct LeakyTool;

#[async_trait]
impl Tool for LeakyTool {
    fn name(&self) -> &str {
        "leaky"
    }

    fn description(&self) -> &str {
        "Fails with backend detail"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![]
    }

    async fn call(&self, _args: &ToolArguments) -> ConnectorResult<Vec<Value>> {
        Err(ConnectorError::Search(
            "backend said: table users_v2 locked on db-primary".into(),
        ))
    }
}

fn misp_app(mock: Arc<MockTransport>) -> Router {
    let connector = Arc::new(
        MispConnector::with_transport(MispConfig::new("https://misp.local", "misp-key"), mock)
            .unwrap(),
    );
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(MispSearchEventsTool::new(connector.clone())));
    registry.register(Arc::new(MispSearchAttributesTool::new(connector)));
    registry.register(Arc::new(LeakyTool));
    registry.register(Arc::new(PanickingTool));
    build_router(AppState::new("misp", registry))
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_adapter() {
    let (status, body) = send(misp_app(Arc::new(MockTransport::new())), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["adapter"], "misp");
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn list_tools_returns_definitions() {
    let (status, body) = send(misp_app(Arc::new(MockTransport::new())), "GET", "/tools", None).await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["explode", "leaky", "search-attributes", "search-events"]
    );
}

#[tokio::test]
async fn invoke_tool_returns_records() {
    let mock = Arc::new(MockTransport::new());
    mock.push(
        Method::POST,
        EVENTS_SEARCH_PATH,
        200,
        r#"{"response": [{"Event": {"id": "7", "info": "phishing wave", "sharing_group_id": "3"}}]}"#,
    )
    .await;

    let (status, body) = send(
        misp_app(mock),
        "POST",
        "/tools/search-events",
        Some(json!({"query": "phishing"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{"Event": {"id": "7", "info": "phishing wave"}}])
    );
}

#[tokio::test]
async fn invoke_tool_with_empty_body_uses_defaults() {
    let mock = Arc::new(MockTransport::new());
    mock.push(Method::POST, EVENTS_SEARCH_PATH, 200, r#"{"response": []}"#)
        .await;

    let (status, body) = send(misp_app(mock.clone()), "POST", "/tools/search-events", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
    assert_eq!(mock.count(Method::POST, EVENTS_SEARCH_PATH).await, 1);
}

#[tokio::test]
async fn invoke_unknown_tool_is_404() {
    let (status, body) = send(
        misp_app(Arc::new(MockTransport::new())),
        "POST",
        "/tools/delete-everything",
        Some(json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Unknown tool: delete-everything");
}

#[tokio::test]
async fn tool_failure_is_200_with_generic_error() {
    let (status, body) = send(
        misp_app(Arc::new(MockTransport::new())),
        "POST",
        "/tools/leaky",
        Some(json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"error": "Search operation failed. Please check your query and try again."})
    );
}

#[tokio::test]
async fn panicking_tool_is_caught() {
    let (status, _) = send(
        misp_app(Arc::new(MockTransport::new())),
        "POST",
        "/tools/explode",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn rpc_tools_list_has_schemas() {
    let (status, body) = send(
        misp_app(Arc::new(MockTransport::new())),
        "POST",
        "/mcp",
        Some(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let tools = body["result"]["tools"].as_array().unwrap();
    let attributes = tools
        .iter()
        .find(|t| t["name"] == "search-attributes")
        .unwrap();
    assert_eq!(attributes["inputSchema"]["properties"]["limit"]["default"], 100);
    assert_eq!(attributes["inputSchema"]["properties"]["type"]["type"], "string");
}

#[tokio::test]
async fn rpc_failing_tool_is_error_result_without_backend_text() {
    let (status, body) = send(
        misp_app(Arc::new(MockTransport::new())),
        "POST",
        "/mcp",
        Some(json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "tools/call",
            "params": {"name": "leaky", "arguments": {}}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 9);
    assert_eq!(body["result"]["isError"], true);
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Search operation failed"));
    assert!(!text.contains("db-primary"));
}

#[tokio::test]
async fn rpc_successful_call_wraps_records() {
    let mock = Arc::new(MockTransport::new());
    mock.push(Method::POST, EVENTS_SEARCH_PATH, 200, r#"{"response": []}"#)
        .await;

    let (_, body) = send(
        misp_app(mock),
        "POST",
        "/mcp",
        Some(json!({
            "jsonrpc": "2.0",
            "id": "a",
            "method": "tools/call",
            "params": {"name": "search-events", "arguments": {"limit": 5}}
        })),
    )
    .await;

    assert_eq!(body["result"]["isError"], false);
    assert_eq!(body["result"]["content"][0]["text"], "[]");
}

#[tokio::test]
async fn rpc_notification_is_accepted() {
    let (status, body) = send(
        misp_app(Arc::new(MockTransport::new())),
        "POST",
        "/mcp",
        Some(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn rpc_null_id_gets_a_reply() {
    let (status, body) = send(
        misp_app(Arc::new(MockTransport::new())),
        "POST",
        "/mcp",
        Some(json!({"jsonrpc": "2.0", "id": null, "method": "ping"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"jsonrpc": "2.0", "id": null, "result": {}}));
}
