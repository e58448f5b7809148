//! # hubitat-mcp
//!
//! MCP (Model Context Protocol) server that bridges tool calls to a Hubitat
//! hub's Maker API. Runs either as a stdio JSON-RPC server (launched by an AI
//! agent host) or as an HTTP listener speaking the MCP SSE transport.
//!
//! ## Tools
//!
//! `list_devices`, `get_device`, `turn_on`, `turn_off`, `set_level`,
//! `send_command`
//!
//! ## Usage
//!
//! ```text
//! HUBITAT_BASE_URL=http://hub/apps/api/4/devices HUBITAT_TOKEN=... hubitat-mcp
//! hubitat-mcp --transport sse --port 5006
//! ```

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use hubitat_mcp::config::{Cli, Config, TransportMode};
use hubitat_mcp::{mcp, sse, Dispatcher, HubClient};

#[tokio::main]
async fn main() {
    // A missing .env is fine; variables may come from the real environment.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // stdout carries JSON-RPC in stdio mode, so logs always go to stderr.
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    info!("hubitat-mcp v{} starting", mcp::SERVER_VERSION);
    info!("Hubitat API: {}", config.hub.base_url);
    info!("Transport: {}", config.transport);

    let transport = config.transport;
    let port = config.port;

    let hub = match HubClient::new(config.hub) {
        Ok(h) => h,
        Err(e) => {
            error!("failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };
    let dispatcher = Arc::new(Dispatcher::new(hub));

    match transport {
        TransportMode::Stdio => mcp::run_stdio(dispatcher).await,
        TransportMode::Sse => {
            if let Err(e) = sse::run_sse(dispatcher, port).await {
                error!("SSE server error: {e}");
                std::process::exit(1);
            }
        }
    }
}
