//! Tool handlers and the result envelope.
//!
//! Handlers receive arguments that the dispatcher has already validated and
//! typed as a [`ToolCall`]. Each one makes at most one kind of hub call and
//! formats its outcome as text.
//!
//! ## Tools
//!
//! - `list_devices` — one summary line per device
//! - `get_device` — full device rendered as pretty JSON (found by scanning `/all`)
//! - `turn_on`, `turn_off` — bare `on` / `off` commands
//! - `set_level` — `setLevel` with an integer 0–100
//! - `send_command` — any command, with an optional value

use serde_json::{json, Value};

use crate::client::{ClientError, HubApi};
use crate::device::Device;

/// A validated, typed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    ListDevices,
    GetDevice {
        device_id: String,
    },
    TurnOn {
        device_id: String,
    },
    TurnOff {
        device_id: String,
    },
    SetLevel {
        device_id: String,
        level: f64,
    },
    SendCommand {
        device_id: String,
        command: String,
        value: Option<String>,
    },
}

impl ToolCall {
    /// Run the handler for this call against `hub`.
    pub async fn run<H>(self, hub: &H) -> Result<String, ToolError>
    where
        H: HubApi + ?Sized,
    {
        match self {
            Self::ListDevices => handle_list_devices(hub).await,
            Self::GetDevice { device_id } => handle_get_device(hub, &device_id).await,
            Self::TurnOn { device_id } => handle_switch(hub, &device_id, true).await,
            Self::TurnOff { device_id } => handle_switch(hub, &device_id, false).await,
            Self::SetLevel { device_id, level } => handle_set_level(hub, &device_id, level).await,
            Self::SendCommand {
                device_id,
                command,
                value,
            } => handle_send_command(hub, &device_id, &command, value.as_deref()).await,
        }
    }
}

/// Outcome of a tool call: exactly one of a success payload or an error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResult {
    Success(String),
    Error(String),
}

impl ToolResult {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// The payload or error message.
    pub fn text(&self) -> &str {
        match self {
            Self::Success(text) | Self::Error(text) => text,
        }
    }

    /// MCP `tools/call` result: a single text content block, plus
    /// `isError: true` on failure.
    pub fn to_call_result(&self) -> Value {
        let mut result = json!({
            "content": [{ "type": "text", "text": self.text() }]
        });
        if self.is_error() {
            result["isError"] = json!(true);
        }
        result
    }
}

impl From<Result<String, ToolError>> for ToolResult {
    fn from(outcome: Result<String, ToolError>) -> Self {
        match outcome {
            Ok(text) => Self::Success(text),
            Err(e) => Self::Error(e.to_string()),
        }
    }
}

/// Everything that can make a tool call fail.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// Bad or missing argument; never reaches the hub.
    #[error("{0}")]
    Validation(String),
    #[error("Device with ID {0} not found")]
    DeviceNotFound(String),
    #[error("failed to marshal device data: {0}")]
    Render(#[source] serde_json::Error),
    #[error(transparent)]
    Client(#[from] ClientError),
}

async fn handle_list_devices<H: HubApi + ?Sized>(hub: &H) -> Result<String, ToolError> {
    let devices = hub.list_devices().await?;
    let lines: Vec<String> = devices.iter().map(Device::summary_line).collect();
    Ok(lines.join("\n"))
}

// TODO: switch to the Maker API's per-device endpoint once it's confirmed to
// return the same shape as the entries in `/all`.
async fn handle_get_device<H: HubApi + ?Sized>(
    hub: &H,
    device_id: &str,
) -> Result<String, ToolError> {
    let devices = hub.list_devices().await?;
    let device = devices
        .iter()
        .find(|d| d.id == device_id)
        .ok_or_else(|| ToolError::DeviceNotFound(device_id.to_string()))?;
    serde_json::to_string_pretty(device).map_err(ToolError::Render)
}

async fn handle_switch<H: HubApi + ?Sized>(
    hub: &H,
    device_id: &str,
    on: bool,
) -> Result<String, ToolError> {
    let command = if on { "on" } else { "off" };
    hub.send_command(device_id, command).await?;
    Ok(format!("Successfully turned {command} device {device_id}"))
}

async fn handle_set_level<H: HubApi + ?Sized>(
    hub: &H,
    device_id: &str,
    level: f64,
) -> Result<String, ToolError> {
    if !(0.0..=100.0).contains(&level) {
        return Err(ToolError::Validation("level must be between 0 and 100".into()));
    }

    // Range-checked above, so the cast cannot overflow.
    #[allow(clippy::cast_possible_truncation)]
    let level = level.trunc() as i64;
    hub.send_command_with_value(device_id, "setLevel", &level.to_string())
        .await?;
    Ok(format!("Successfully set device {device_id} to level {level}"))
}

async fn handle_send_command<H: HubApi + ?Sized>(
    hub: &H,
    device_id: &str,
    command: &str,
    value: Option<&str>,
) -> Result<String, ToolError> {
    match value.filter(|v| !v.is_empty()) {
        Some(value) => {
            hub.send_command_with_value(device_id, command, value).await?;
        }
        None => hub.send_command(device_id, command).await?,
    }
    Ok(format!("Successfully sent command '{command}' to device {device_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_has_no_error_flag() {
        let result = ToolResult::Success("done".into()).to_call_result();
        assert_eq!(
            result,
            json!({ "content": [{ "type": "text", "text": "done" }] })
        );
    }

    #[test]
    fn error_envelope_sets_is_error() {
        let result = ToolResult::Error("boom".into()).to_call_result();
        assert_eq!(result["isError"], json!(true));
        assert_eq!(result["content"][0]["text"], "boom");
    }

    #[test]
    fn client_errors_keep_their_message() {
        let err = ToolError::from(ClientError::Hub {
            status: 500,
            body: "offline".into(),
        });
        let result = ToolResult::from(Err::<String, _>(err));
        assert_eq!(
            result,
            ToolResult::Error("hubitat API returned status 500: offline".into())
        );
    }

    #[test]
    fn device_not_found_message() {
        assert_eq!(
            ToolError::DeviceNotFound("3".into()).to_string(),
            "Device with ID 3 not found"
        );
    }
}
