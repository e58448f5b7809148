#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

//! hubitat-mcp library — the tool dispatch layer and both MCP transports.
//!
//! ## Architecture
//!
//! ```text
//! config.rs    — CLI flags + env-var configuration
//! client.rs    — HTTP client for the Hubitat Maker API (HubApi trait)
//! device.rs    — device snapshot model
//! catalog.rs   — fixed tool catalog with declarative parameter schemas
//! dispatch.rs  — validation + routing; every outcome becomes a ToolResult
//! tools.rs     — per-tool handlers and the result envelope
//! mcp.rs       — JSON-RPC message handling, stdio transport
//! sse.rs       — HTTP + SSE transport
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod mcp;
pub mod sse;
pub mod tools;

pub use client::{ClientError, HubApi, HubClient};
pub use config::Config;
pub use dispatch::Dispatcher;
pub use tools::ToolResult;
