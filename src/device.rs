//! Device snapshots as returned by the Maker API `/all` endpoint.
//!
//! Devices are never cached or mutated here: every tool call that needs them
//! fetches a fresh list from the hub. Deserialization is lenient about the
//! shapes different hub firmware versions emit (numeric ids, `null` labels,
//! bare-string command lists).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A read-only device snapshot.
///
/// Field order here is the order `get_device` renders in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub device_type: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub commands: Vec<DeviceCommand>,
    /// Current attribute values (string, number, boolean, or null).
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Device {
    /// One-line summary used by `list_devices`.
    pub fn summary_line(&self) -> String {
        format!(
            "ID: {} | Label: {} | Type: {} | Capabilities: {}",
            self.id,
            self.label,
            self.device_type,
            self.capabilities.join(", ")
        )
    }
}

/// A command the device accepts, with the hub's optional argument-type hint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceCommand {
    pub command: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub arg_type: Option<Value>,
}

impl<'de> Deserialize<'de> for DeviceCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Entry {
                command: String,
                #[serde(rename = "type", default)]
                arg_type: Option<Value>,
            },
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Name(command) => Self {
                command,
                arg_type: None,
            },
            Raw::Entry { command, arg_type } => Self { command, arg_type },
        })
    }
}

/// Accept a string, a number (rendered as its decimal text), or `null`.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, found {other}"
        ))),
    }
}
