//! JSON-RPC 2.0 envelope and dispatch for the tool surface.

use sb_tools::{ToolOutput, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

/// MCP protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// Absent for notifications. An explicit `null` still expects a reply.
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error payload.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Handles one raw JSON-RPC body. Returns `None` for notifications.
pub async fn handle(registry: &ToolRegistry, server_name: &str, body: &[u8]) -> Option<JsonRpcResponse> {
    let raw: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => {
            return Some(JsonRpcResponse::failure(
                Value::Null,
                PARSE_ERROR,
                "Parse error",
            ))
        }
    };

    let is_notification = raw.get("id").is_none();
    let id = raw.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(_) => {
            return Some(JsonRpcResponse::failure(
                id,
                INVALID_REQUEST,
                "Invalid Request",
            ))
        }
    };
    if request.jsonrpc != "2.0" {
        return Some(JsonRpcResponse::failure(
            id,
            INVALID_REQUEST,
            "Invalid Request: jsonrpc must be \"2.0\"",
        ));
    }

    if is_notification {
        debug!(method = %request.method, "Ignoring notification");
        return None;
    }
    let id = request.id.unwrap_or(Value::Null);

    debug!(method = %request.method, "JSON-RPC request");
    let response = match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": server_name,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => JsonRpcResponse::success(id, list_tools(registry)),
        "tools/call" => call_tool(registry, id, request.params).await,
        other => JsonRpcResponse::failure(
            id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        ),
    };
    Some(response)
}

fn list_tools(registry: &ToolRegistry) -> Value {
    let tools: Vec<Value> = registry
        .definitions()
        .iter()
        .map(|definition| {
            json!({
                "name": definition.name,
                "description": definition.description,
                "inputSchema": definition.input_schema(),
            })
        })
        .collect();
    json!({ "tools": tools })
}

async fn call_tool(registry: &ToolRegistry, id: Value, params: Option<Value>) -> JsonRpcResponse {
    let params = match serde_json::from_value::<ToolCallParams>(params.unwrap_or(Value::Null)) {
        Ok(params) => params,
        Err(_) => {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "Invalid params: name is required")
        }
    };
    if !registry.contains(&params.name) {
        return JsonRpcResponse::failure(
            id,
            INVALID_PARAMS,
            format!("Unknown tool: {}", params.name),
        );
    }

    let output = registry.invoke(&params.name, params.arguments).await;
    let text = output.to_value().to_string();
    let is_error = matches!(output, ToolOutput::Error { .. });

    JsonRpcResponse::success(
        id,
        json!({
            "content": [{ "type": "text", "text": text }],
            "isError": is_error,
        }),
    )
}
