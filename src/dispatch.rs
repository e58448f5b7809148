//! Tool dispatch: catalog lookup, argument validation, handler invocation.
//!
//! [`Dispatcher::invoke`] is the one entry point both transports use. It
//! never fails: unknown tools, bad arguments, and hub failures all come back
//! as [`ToolResult::Error`], so a bad call can't take the serving loop down.
//!
//! Validation is driven by the [`ParamSpec`](crate::catalog::ParamSpec) list
//! of the matching descriptor and is fail-fast: the first missing or
//! mistyped required parameter is reported and nothing else is checked.
//! Optional parameters of the wrong type are treated as absent.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::{self, Tool, ToolDescriptor};
use crate::client::HubApi;
use crate::tools::{ToolCall, ToolError, ToolResult};

/// Routes tool invocations to their handlers.
///
/// Holds only the hub client; safe to share behind an `Arc` and call
/// concurrently.
pub struct Dispatcher<H> {
    hub: H,
}

impl<H: HubApi> Dispatcher<H> {
    pub fn new(hub: H) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &H {
        &self.hub
    }

    /// Validate and run one tool call.
    pub async fn invoke(&self, name: &str, args: &Value) -> ToolResult {
        let outcome = match parse_call(name, args) {
            Ok(call) => {
                debug!(tool = name, ?call, "tool call");
                call.run(&self.hub).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            warn!(tool = name, "tool call failed: {e}");
        }
        ToolResult::from(outcome)
    }
}

/// Validate `args` against the catalog entry for `name` and build a typed call.
pub fn parse_call(name: &str, args: &Value) -> Result<ToolCall, ToolError> {
    let descriptor =
        catalog::find(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
    let args = validate(descriptor, args)?;

    Ok(match descriptor.tool {
        Tool::ListDevices => ToolCall::ListDevices,
        Tool::GetDevice => ToolCall::GetDevice {
            device_id: args.string("device_id")?,
        },
        Tool::TurnOn => ToolCall::TurnOn {
            device_id: args.string("device_id")?,
        },
        Tool::TurnOff => ToolCall::TurnOff {
            device_id: args.string("device_id")?,
        },
        Tool::SetLevel => ToolCall::SetLevel {
            device_id: args.string("device_id")?,
            level: args.number("level")?,
        },
        Tool::SendCommand => ToolCall::SendCommand {
            device_id: args.string("device_id")?,
            command: args.string("command")?,
            value: args.optional_string("value"),
        },
    })
}

/// Arguments that passed schema validation, keyed by parameter name.
struct ValidatedArgs<'a> {
    values: HashMap<&'static str, &'a Value>,
}

impl ValidatedArgs<'_> {
    fn string(&self, name: &str) -> Result<String, ToolError> {
        self.optional_string(name)
            .ok_or_else(|| ToolError::Validation(format!("{name} must be a string")))
    }

    fn number(&self, name: &str) -> Result<f64, ToolError> {
        self.values
            .get(name)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ToolError::Validation(format!("{name} must be a number")))
    }

    fn optional_string(&self, name: &str) -> Option<String> {
        self.values
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::to_owned)
    }
}

fn validate<'a>(
    descriptor: &ToolDescriptor,
    args: &'a Value,
) -> Result<ValidatedArgs<'a>, ToolError> {
    let object = match args {
        Value::Null => None,
        Value::Object(map) => Some(map),
        _ => {
            return Err(ToolError::Validation(
                "arguments must be an object".into(),
            ))
        }
    };

    let mut values = HashMap::new();
    for param in descriptor.params {
        match object.and_then(|m| m.get(param.name)) {
            Some(value) if param.kind.matches(value) => {
                values.insert(param.name, value);
            }
            _ if param.required => {
                return Err(ToolError::Validation(format!(
                    "{} must be a {}",
                    param.name,
                    param.kind.as_str()
                )));
            }
            _ => {}
        }
    }

    Ok(ValidatedArgs { values })
}
