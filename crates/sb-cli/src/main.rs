//! secbridge CLI
//!
//! Serves the tools of one security backend (Splunk, CrowdStrike or MISP)
//! over HTTP and JSON-RPC.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use sb_observability::{init_logging_with_config, LoggingConfig};
use std::path::PathBuf;

mod commands;
mod config;

use commands::{build_adapter, run_server, ServeConfig};
use config::{log_json_from_env, Adapter, AdapterConfig, AppConfig};

#[derive(Parser)]
#[command(name = "secbridge")]
#[command(version)]
#[command(about = "Tool server for Splunk, CrowdStrike and MISP", long_about = None)]
struct Cli {
    /// Configuration file path (environment variables are used when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the tool server for one adapter
    Serve {
        /// Adapter to serve
        adapter: Adapter,

        /// Host to bind to
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Port to listen on (8080 splunk, 8081 crowdstrike, 8082 misp)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List the adapter's tools and their argument schemas
    Tools {
        /// Adapter to describe
        adapter: Adapter,
    },

    /// Show the effective configuration with secrets redacted
    Config {
        /// Adapter to show
        adapter: Adapter,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config = cli.config.as_deref().map(AppConfig::load).transpose()?;
    let json_logs = log_json_from_env()
        || file_config.as_ref().is_some_and(|c| c.logging.json);

    let logging = if cli.verbose {
        LoggingConfig::verbose(json_logs)
    } else {
        LoggingConfig {
            json_format: json_logs,
            ..Default::default()
        }
    };
    init_logging_with_config(logging).context("Failed to initialize logging")?;

    let adapter = match &cli.command {
        Commands::Serve { adapter, .. }
        | Commands::Tools { adapter }
        | Commands::Config { adapter } => *adapter,
    };
    let adapter_config = match &file_config {
        Some(file) => file.adapter(adapter)?,
        None => AdapterConfig::from_env(adapter)?,
    };

    match cli.command {
        Commands::Serve { host, port, .. } => {
            run_server(
                ServeConfig {
                    adapter,
                    host,
                    port: port.unwrap_or_else(|| adapter.default_port()),
                },
                adapter_config,
            )
            .await
        }
        Commands::Tools { .. } => cmd_tools(&adapter_config),
        Commands::Config { .. } => cmd_config(adapter, &adapter_config),
    }
}

fn cmd_tools(config: &AdapterConfig) -> Result<()> {
    let built = build_adapter(config)?;
    let tools: Vec<serde_json::Value> = built
        .registry
        .definitions()
        .iter()
        .map(|definition| {
            serde_json::json!({
                "name": definition.name,
                "description": definition.description,
                "inputSchema": definition.input_schema(),
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&tools)?);
    Ok(())
}

fn cmd_config(adapter: Adapter, config: &AdapterConfig) -> Result<()> {
    println!("{}", format!("# secbridge {} configuration", adapter).bold());
    print!("{}", config.to_redacted_yaml()?);

    match config.validate() {
        Ok(()) => println!("{} configuration is complete", "✓".green()),
        Err(e) => println!("{} {}", "✗".red(), e),
    }
    Ok(())
}
