use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// State of a switch entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SwitchState {
    /// Display name of the entity.
    pub name: String,

    /// Whether the switch is on; `None` until the first command.
    pub on: Option<bool>,

    /// Battery percentage reported by the device, if polled.
    pub battery_level: Option<u8>,

    /// Firmware version reported by the device, if polled.
    pub firmware: Option<f64>,

    /// Platform-specific extra attributes.
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub switches: HashMap<String, SwitchState>,
}
