//! # sb-api
//!
//! Tool-serving harness for a single secbridge adapter: REST endpoints for
//! listing and invoking tools, a JSON-RPC endpoint speaking the MCP tool
//! methods, and a health probe.

pub mod error;
pub mod jsonrpc;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ErrorResponse};
pub use server::{build_router, ApiServer, ApiServerConfig};
pub use state::AppState;
