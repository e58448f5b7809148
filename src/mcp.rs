//! MCP (Model Context Protocol) JSON-RPC handler.
//!
//! [`handle_message`] turns one JSON-RPC message into at most one response
//! and is shared by both transports, so a given request gets the same answer
//! over stdio and over SSE. [`run_stdio`] is the stdio transport: it reads
//! requests from stdin (one per line) and writes responses to stdout.
//!
//! ## Supported methods
//!
//! | Method       | Description                      |
//! |--------------|----------------------------------|
//! | `initialize` | Handshake, returns capabilities  |
//! | `tools/list` | List available tool definitions  |
//! | `tools/call` | Execute a tool and return result |
//! | `ping`       | Liveness check                   |
//!
//! Notifications (messages without an `id`) get no response.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::catalog;
use crate::client::HubApi;
use crate::dispatch::Dispatcher;

pub const SERVER_NAME: &str = "hubitat-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// Handle one parsed JSON-RPC message. Returns `None` for notifications.
pub async fn handle_message<H: HubApi>(
    dispatcher: &Dispatcher<H>,
    request: &Value,
) -> Option<Value> {
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");

    let Some(id) = request.get("id").cloned() else {
        match method {
            "notifications/initialized" | "notifications/cancelled" => {}
            _ => debug!("ignoring notification: {method}"),
        }
        return None;
    };

    let response = match method {
        "initialize" => success(handle_initialize()),
        "tools/list" => success(json!({ "tools": catalog::tool_definitions() })),
        "tools/call" => handle_tools_call(request, dispatcher).await,
        "ping" => success(json!({})),
        _ => failure(METHOD_NOT_FOUND, format!("Method not found: {method}")),
    };

    Some(inject_id(response, id))
}

/// Handle one raw line of input: parse errors become a JSON-RPC error
/// response with a `null` id.
pub async fn handle_line<H: HubApi>(dispatcher: &Dispatcher<H>, line: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(line) {
        Ok(request) => handle_message(dispatcher, &request).await,
        Err(e) => Some(inject_id(
            failure(PARSE_ERROR, format!("Parse error: {e}")),
            Value::Null,
        )),
    }
}

/// `initialize` — protocol version, capabilities, and server info.
fn handle_initialize() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": false }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": SERVER_VERSION
        }
    })
}

/// `tools/call` — dispatch to the tool handler.
async fn handle_tools_call<H: HubApi>(request: &Value, dispatcher: &Dispatcher<H>) -> Value {
    let params = request.get("params").cloned().unwrap_or(json!({}));
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return failure(INVALID_PARAMS, "Invalid params: missing tool name".into());
    };
    let args = params.get("arguments").cloned().unwrap_or(Value::Null);

    let result = dispatcher.invoke(name, &args).await;
    success(result.to_call_result())
}

fn success(result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "result": result })
}

fn failure(code: i64, message: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": { "code": code, "message": message }
    })
}

/// Inject the request `id` into a response object.
fn inject_id(mut response: Value, id: Value) -> Value {
    response["id"] = id;
    response
}

/// Run the MCP server on stdio, processing JSON-RPC requests until EOF.
pub async fn run_stdio<H: HubApi + 'static>(dispatcher: Arc<Dispatcher<H>>) {
    serve(dispatcher, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await;
}

/// Serve newline-delimited JSON-RPC from `reader`, writing responses to `writer`.
///
/// Each request runs in its own task so a slow hub call doesn't hold up
/// the rest; responses are written in completion order by a single writer.
pub async fn serve<H, R, W>(dispatcher: Arc<Dispatcher<H>>, mut reader: R, writer: W)
where
    H: HubApi + 'static,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(response) = rx.recv().await {
            write_response(&mut writer, &response).await;
        }
    });

    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                error!("stdin read error: {e}");
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request = trimmed.to_string();
        let dispatcher = Arc::clone(&dispatcher);
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(response) = handle_line(&dispatcher, &request).await {
                let _ = tx.send(response);
            }
        });
    }

    // The writer finishes once every in-flight request has dropped its sender.
    drop(tx);
    if let Err(e) = writer_task.await {
        error!("stdout writer task failed: {e}");
    }
}

/// Write a JSON-RPC response (one line, flushed immediately).
async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Value) {
    let mut output = serde_json::to_string(response).unwrap_or_default();
    output.push('\n');
    if let Err(e) = writer.write_all(output.as_bytes()).await {
        warn!("stdout write error: {e}");
    }
    if let Err(e) = writer.flush().await {
        warn!("stdout flush error: {e}");
    }
}
