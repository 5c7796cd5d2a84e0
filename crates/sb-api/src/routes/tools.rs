//! REST tool endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use sb_tools::{ToolDefinition, ToolOutput};
use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Creates tool routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/tools/:name", post(invoke_tool))
}

async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolDefinition>> {
    Json(state.registry.definitions())
}

/// Invokes a tool. Tool failures are still 200; only an unknown tool or an
/// unreadable body is an HTTP error.
async fn invoke_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<ToolOutput>, ApiError> {
    if !state.registry.contains(&name) {
        return Err(ApiError::NotFound(format!("Unknown tool: {}", name)));
    }

    let arguments = parse_arguments(&body)?;
    debug!(tool = %name, "Invoking tool over REST");
    Ok(Json(state.registry.invoke(&name, arguments).await))
}

/// An empty body means no arguments.
pub(crate) fn parse_arguments(body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(body)?)
}
