//! Application state shared across handlers.

use sb_tools::ToolRegistry;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Tools served by this process.
    pub registry: Arc<ToolRegistry>,
    /// Adapter name reported by the health endpoint.
    pub adapter: String,
    /// Process start, for uptime.
    pub started_at: Instant,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(adapter: impl Into<String>, registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            adapter: adapter.into(),
            started_at: Instant::now(),
        }
    }

    /// Seconds since the state was created.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
