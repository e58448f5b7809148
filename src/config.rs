//! Configuration loading for hubitat-mcp.
//!
//! Everything comes from the command line and the environment (a `.env` file
//! in the working directory is loaded into the environment first by `main`):
//!
//! | Source             | Meaning                                   | Default |
//! |--------------------|-------------------------------------------|---------|
//! | `HUBITAT_BASE_URL` | Maker API base, e.g. `http://hub/apps/api/4/devices` | required |
//! | `HUBITAT_TOKEN`    | Maker API access token                    | required |
//! | `PORT`             | SSE listener port                         | `5006`  |
//! | `--transport`      | `stdio` or `sse`                          | `stdio` |
//! | `--port`           | overrides `PORT`                          |         |
//!
//! A missing or invalid hub URL/token is fatal: with nothing safe to talk to,
//! the server refuses to start.

use std::fmt;

use clap::{Parser, ValueEnum};
use reqwest::Url;
use secrecy::SecretString;

pub const DEFAULT_PORT: u16 = 5006;

/// CLI arguments parsed by `clap`.
#[derive(Parser, Debug)]
#[command(
    name = "hubitat-mcp",
    version,
    about = "MCP server for Hubitat home-automation hubs"
)]
pub struct Cli {
    /// Transport to serve MCP over.
    #[arg(long, value_enum, default_value_t = TransportMode::Stdio)]
    pub transport: TransportMode,
    /// Port for the SSE listener (overrides PORT).
    #[arg(long)]
    pub port: Option<u16>,
}

/// How MCP messages reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportMode {
    /// Newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
    /// HTTP listener with an SSE stream and a message endpoint.
    Sse,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => f.write_str("stdio"),
            Self::Sse => f.write_str("sse"),
        }
    }
}

/// Where the hub lives and how to authenticate to it.
#[derive(Debug)]
pub struct HubConfig {
    pub base_url: Url,
    /// Never logged; `Debug` prints a redacted placeholder.
    pub token: SecretString,
}

/// Validated configuration, built once at startup.
#[derive(Debug)]
pub struct Config {
    pub hub: HubConfig,
    pub port: u16,
    pub transport: TransportMode,
}

/// Startup configuration errors. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("HUBITAT_BASE_URL is not a valid http(s) URL: {0}")]
    InvalidBaseUrl(String),
    #[error("PORT must be a number between 1 and 65535, got '{0}'")]
    InvalidPort(String),
}

impl Config {
    /// Load configuration from CLI args and the process environment.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        Self::from_lookup(cli, |key| std::env::var(key).ok())
    }

    /// Load configuration with `lookup` standing in for the environment.
    pub fn from_lookup<F>(cli: &Cli, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let raw_url = non_empty("HUBITAT_BASE_URL")?;
        let token = non_empty("HUBITAT_TOKEN")?;

        let base_url = Url::parse(raw_url.trim())
            .map_err(|e| ConfigError::InvalidBaseUrl(e.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl(raw_url));
        }

        let port = match cli.port {
            Some(p) => p,
            None => match lookup("PORT").filter(|v| !v.is_empty()) {
                Some(v) => v
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or(ConfigError::InvalidPort(v))?,
                None => DEFAULT_PORT,
            },
        };

        Ok(Self {
            hub: HubConfig {
                base_url,
                token: SecretString::from(token),
            },
            port,
            transport: cli.transport,
        })
    }
}
