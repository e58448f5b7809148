//! The fixed tool catalog.
//!
//! Each [`ToolDescriptor`] carries a small declarative parameter schema. The
//! dispatcher interprets it to validate arguments before any handler runs,
//! and `tools/list` renders it as JSON Schema.

use serde_json::{json, Map, Value};

/// The closed set of tools this server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    ListDevices,
    GetDevice,
    TurnOn,
    TurnOff,
    SetLevel,
    SendCommand,
}

/// Runtime type a parameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
}

impl ParamKind {
    /// JSON Schema type name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
        }
    }

    /// Whether `value` has this kind.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
        }
    }
}

/// One declared tool parameter.
#[derive(Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

/// A tool's name, description, and parameter schema.
#[derive(Debug)]
pub struct ToolDescriptor {
    pub tool: Tool,
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: true,
        description,
    }
}

const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: false,
        description,
    }
}

static CATALOG: [ToolDescriptor; 6] = [
    ToolDescriptor {
        tool: Tool::ListDevices,
        name: "list_devices",
        description: "List all Hubitat devices with their capabilities and current states",
        params: &[],
    },
    ToolDescriptor {
        tool: Tool::GetDevice,
        name: "get_device",
        description: "Get detailed information about a specific Hubitat device",
        params: &[required(
            "device_id",
            ParamKind::String,
            "The ID of the device to query",
        )],
    },
    ToolDescriptor {
        tool: Tool::TurnOn,
        name: "turn_on",
        description: "Turn on a Hubitat device (switches, lights, etc.)",
        params: &[required(
            "device_id",
            ParamKind::String,
            "The ID of the device to turn on",
        )],
    },
    ToolDescriptor {
        tool: Tool::TurnOff,
        name: "turn_off",
        description: "Turn off a Hubitat device (switches, lights, etc.)",
        params: &[required(
            "device_id",
            ParamKind::String,
            "The ID of the device to turn off",
        )],
    },
    ToolDescriptor {
        tool: Tool::SetLevel,
        name: "set_level",
        description: "Set the level of a dimmable device (0-100)",
        params: &[
            required("device_id", ParamKind::String, "The ID of the device"),
            required("level", ParamKind::Number, "The level to set (0-100)"),
        ],
    },
    ToolDescriptor {
        tool: Tool::SendCommand,
        name: "send_command",
        description: "Send a custom command to a Hubitat device",
        params: &[
            required("device_id", ParamKind::String, "The ID of the device"),
            required(
                "command",
                ParamKind::String,
                "The command to send (e.g., 'refresh', 'configure')",
            ),
            optional(
                "value",
                ParamKind::String,
                "Optional value parameter for the command",
            ),
        ],
    },
];

/// All tool descriptors, in advertised order.
pub fn catalog() -> &'static [ToolDescriptor] {
    &CATALOG
}

/// Look up a descriptor by tool name.
pub fn find(name: &str) -> Option<&'static ToolDescriptor> {
    CATALOG.iter().find(|d| d.name == name)
}

impl ToolDescriptor {
    /// MCP tool definition: `{name, description, inputSchema}`.
    pub fn definition(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in self.params {
            properties.insert(
                param.name.to_string(),
                json!({
                    "type": param.kind.as_str(),
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(param.name);
            }
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }

        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": schema,
        })
    }
}

/// Tool definitions for `tools/list`.
pub fn tool_definitions() -> Vec<Value> {
    CATALOG.iter().map(ToolDescriptor::definition).collect()
}
