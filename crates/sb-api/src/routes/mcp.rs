//! JSON-RPC tool endpoint.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use crate::jsonrpc;
use crate::state::AppState;

/// Creates the JSON-RPC route.
pub fn routes() -> Router<AppState> {
    Router::new().route("/mcp", post(handle_rpc))
}

/// Protocol errors are reported inside a 200 envelope; notifications get 202.
async fn handle_rpc(State(state): State<AppState>, body: Bytes) -> Response {
    let server_name = format!("secbridge-{}", state.adapter);
    match jsonrpc::handle(&state.registry, &server_name, &body).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
