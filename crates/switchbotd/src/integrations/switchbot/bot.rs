//! The vendor device handle.
//!
//! A [`Bot`] is the only thing the platform talks to. It hides the radio
//! protocol entirely; the platform forwards `switch` and `get_settings` calls
//! and never looks behind them.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

/// Argument to [`Bot::switch`] that presses the bot into its "on" position
pub const SWITCH_ON: &str = "1";

/// Argument to [`Bot::switch`] that returns the bot to its "off" position
pub const SWITCH_OFF: &str = "0";

/// Everything needed to build a device handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotSpec {
    pub id: u32,
    pub mac: String,
    pub name: String,
    pub password: Option<String>,
}

/// Settings block as reported by the device
///
/// e.g. `{"battery": 96, "firmware": 6.4, "n_timers": 0, "dual_state_mode": true,
/// "inverse_direction": false, "hold_seconds": 0}`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BotSettings {
    pub battery: u8,
    pub firmware: f64,

    #[serde(default)]
    pub n_timers: u32,

    #[serde(default)]
    pub dual_state_mode: bool,

    #[serde(default)]
    pub inverse_direction: bool,

    #[serde(default)]
    pub hold_seconds: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Failed to start driver {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Driver I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Driver protocol error: {0}")]
    Protocol(String),

    #[error("Device {mac} reported an error: {message}")]
    Device { mac: String, message: String },

    #[error("Driver did not respond within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Driver closed the connection")]
    Closed,
}

/// Handle to a single SwitchBot device
#[async_trait]
pub trait Bot: Send + Sync {
    /// Display name the handle was created with
    fn name(&self) -> &str;

    fn mac(&self) -> &str;

    /// Move the bot arm; `value` is [`SWITCH_ON`] or [`SWITCH_OFF`]
    async fn switch(&mut self, value: &str) -> Result<(), BotError>;

    /// Read the device's settings block
    async fn get_settings(&mut self) -> Result<BotSettings, BotError>;
}

/// Builds device handles for a platform
///
/// Construction must not touch the device; handles connect on first use.
pub trait BotFactory: Send + Sync {
    fn create(&self, spec: BotSpec) -> Box<dyn Bot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_device_mapping() {
        let settings: BotSettings = serde_json::from_str(
            r#"{"battery": 96, "firmware": 6.4, "n_timers": 0, "dual_state_mode": true,
                "inverse_direction": false, "hold_seconds": 0}"#,
        )
        .unwrap();

        assert_eq!(settings.battery, 96);
        assert_eq!(settings.firmware, 6.4);
        assert!(settings.dual_state_mode);
    }

    #[test]
    fn test_settings_optional_fields_default() {
        let settings: BotSettings =
            serde_json::from_str(r#"{"battery": 40, "firmware": 4.9}"#).unwrap();
        assert_eq!(settings.n_timers, 0);
        assert!(!settings.inverse_direction);
        assert_eq!(settings.hold_seconds, 0);
    }

    #[test]
    fn test_settings_require_battery_and_firmware() {
        assert!(serde_json::from_str::<BotSettings>(r#"{"battery": 40}"#).is_err());
    }
}
