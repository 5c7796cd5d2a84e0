//! CLI commands.

pub mod serve;

pub use serve::{build_adapter, run_server, ServeConfig};
