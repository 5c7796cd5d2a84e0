//! Serve command - starts the tool server for one adapter.

use anyhow::{Context, Result};
use colored::Colorize;
use sb_api::{ApiServer, ApiServerConfig, AppState};
use sb_connectors::{Connector, CrowdStrikeConnector, MispConnector, SplunkConnector};
use sb_observability::Redactor;
use sb_tools::{
    CrowdStrikeSearchDetectionsTool, MispSearchAttributesTool, MispSearchEventsTool,
    SplunkSearchEventsTool, ToolRegistry,
};
use std::sync::Arc;
use tracing::info;

use crate::config::{Adapter, AdapterConfig};

/// Server configuration from CLI arguments.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Adapter to serve.
    pub adapter: Adapter,
    /// Hostname to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

/// A connector and the registry of tools built on it.
pub struct BuiltAdapter {
    pub connector: Arc<dyn Connector>,
    pub registry: ToolRegistry,
    /// Shared with the registry; also receives tokens obtained at runtime.
    pub redactor: Redactor,
}

/// Builds the connector and registers its tools. No network calls are made.
pub fn build_adapter(config: &AdapterConfig) -> Result<BuiltAdapter> {
    config.validate()?;
    let redactor = Redactor::new(config.secrets());
    let mut registry = ToolRegistry::with_redactor(redactor.clone());

    let connector: Arc<dyn Connector> = match config {
        AdapterConfig::Splunk(c) => {
            let connector = Arc::new(
                SplunkConnector::new(c.clone()).context("Failed to create Splunk connector")?,
            );
            registry.register(Arc::new(SplunkSearchEventsTool::new(connector.clone())));
            connector
        }
        AdapterConfig::CrowdStrike(c) => {
            let connector = Arc::new(
                CrowdStrikeConnector::new(c.clone())
                    .context("Failed to create CrowdStrike connector")?,
            );
            registry.register(Arc::new(CrowdStrikeSearchDetectionsTool::new(
                connector.clone(),
            )));
            connector
        }
        AdapterConfig::Misp(c) => {
            let connector = Arc::new(
                MispConnector::new(c.clone()).context("Failed to create MISP connector")?,
            );
            registry.register(Arc::new(MispSearchEventsTool::new(connector.clone())));
            registry.register(Arc::new(MispSearchAttributesTool::new(connector.clone())));
            connector
        }
    };

    let sink = redactor.clone();
    connector.observe_secrets(Arc::new(move |secret: &str| sink.add(secret)));

    Ok(BuiltAdapter {
        connector,
        registry,
        redactor,
    })
}

/// Runs the tool server until shutdown, then clears the adapter's credential.
pub async fn run_server(config: ServeConfig, adapter_config: AdapterConfig) -> Result<()> {
    println!(
        "{} Starting secbridge {} adapter...",
        "[server]".cyan(),
        config.adapter
    );

    let BuiltAdapter {
        connector,
        registry,
        ..
    } = build_adapter(&adapter_config)?;
    let tool_names: Vec<String> = registry.list().iter().map(|s| s.to_string()).collect();
    let state = AppState::new(config.adapter.name(), registry);

    println!();
    println!("{}", format!("secbridge {}", config.adapter).bold());
    println!("{}", "═".repeat(40));
    println!(
        "  {} http://{}:{}",
        "Address:".cyan(),
        config.host,
        config.port
    );
    println!("  {} {}", "Tools:".cyan(), tool_names.join(", "));
    println!();
    println!("{}", "Endpoints:".bold());
    println!("  GET  /health         - Health check");
    println!("  GET  /tools          - List tools");
    println!("  POST /tools/:name    - Invoke a tool");
    println!("  POST /mcp            - JSON-RPC (tools/list, tools/call)");
    println!();
    println!("Press {} to stop", "Ctrl+C".yellow());
    println!();

    let server = ApiServer::new(
        state,
        ApiServerConfig {
            host: config.host.clone(),
            port: config.port,
        },
    );
    let result = server.run().await.context("Server error");

    connector.shutdown().await;
    info!(adapter = %config.adapter, "Credentials cleared");

    println!();
    println!("{} Server stopped", "[server]".cyan());

    result
}
