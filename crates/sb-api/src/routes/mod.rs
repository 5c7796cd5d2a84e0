//! API routes.

pub mod health;
pub mod mcp;
pub mod tools;

use crate::state::AppState;
use axum::Router;

/// Creates the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(tools::routes())
        .merge(mcp::routes())
        .with_state(state)
}
