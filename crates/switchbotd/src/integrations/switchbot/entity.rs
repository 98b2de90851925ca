use async_trait::async_trait;

use super::bot::Bot;
use super::bot::BotSettings;
use super::bot::SWITCH_OFF;
use super::bot::SWITCH_ON;
use crate::engine::Entity;
use crate::engine::EntityError;
use crate::engine::SwitchEntity;

/// Switch entity backed by one SwitchBot bot
///
/// Each accessor returns what the last successful call observed; a failed
/// call leaves local state untouched.
pub struct BotSwitch {
    bot: Box<dyn Bot>,
    name: String,
    state: Option<bool>,
    battery_level: Option<u8>,
    firmware: Option<f64>,
    settings: Option<BotSettings>,
}

impl BotSwitch {
    pub fn new(bot: Box<dyn Bot>) -> Self {
        let name = bot.name().to_string();
        Self {
            bot,
            name,
            state: None,
            battery_level: None,
            firmware: None,
            settings: None,
        }
    }
}

impl std::fmt::Debug for BotSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotSwitch")
            .field("name", &self.name)
            .field("mac", &self.bot.mac())
            .field("state", &self.state)
            .field("battery_level", &self.battery_level)
            .field("firmware", &self.firmware)
            .finish()
    }
}

#[async_trait]
impl Entity for BotSwitch {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> &'static str {
        "switch"
    }

    async fn update(&mut self) -> Result<(), EntityError> {
        let settings = self.bot.get_settings().await?;
        self.battery_level = Some(settings.battery);
        self.firmware = Some(settings.firmware);
        self.settings = Some(settings);
        Ok(())
    }
}

#[async_trait]
impl SwitchEntity for BotSwitch {
    fn is_on(&self) -> Option<bool> {
        self.state
    }

    fn battery_level(&self) -> Option<u8> {
        self.battery_level
    }

    fn firmware(&self) -> Option<f64> {
        self.firmware
    }

    fn extra_attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut attrs = serde_json::Map::new();
        attrs.insert("mac".to_string(), self.bot.mac().into());
        if let Some(settings) = &self.settings {
            attrs.insert("n_timers".to_string(), settings.n_timers.into());
            attrs.insert("dual_state_mode".to_string(), settings.dual_state_mode.into());
            attrs.insert(
                "inverse_direction".to_string(),
                settings.inverse_direction.into(),
            );
            attrs.insert("hold_seconds".to_string(), settings.hold_seconds.into());
        }
        attrs
    }

    async fn turn_on(&mut self) -> Result<(), EntityError> {
        self.bot.switch(SWITCH_ON).await?;
        self.state = Some(true);
        Ok(())
    }

    async fn turn_off(&mut self) -> Result<(), EntityError> {
        self.bot.switch(SWITCH_OFF).await?;
        self.state = Some(false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::switchbot::bot::BotSpec;
    use crate::integrations::switchbot::simulated::SimulatedBot;
    use crate::integrations::switchbot::simulated::SimulatedBotHandle;

    fn switch() -> (BotSwitch, SimulatedBotHandle) {
        let (bot, handle) = SimulatedBot::new(BotSpec {
            id: 1,
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
            name: "kettle".to_string(),
            password: None,
        });
        (BotSwitch::new(Box::new(bot)), handle)
    }

    #[test]
    fn test_initial_state_is_unknown() {
        let (entity, _) = switch();
        assert_eq!(entity.name(), "kettle");
        assert_eq!(entity.platform(), "switch");
        assert_eq!(entity.is_on(), None);
        assert_eq!(entity.battery_level(), None);
        assert_eq!(entity.firmware(), None);
    }

    #[tokio::test]
    async fn test_turn_on_and_off_send_literal_values() {
        let (mut entity, handle) = switch();

        entity.turn_on().await.unwrap();
        assert_eq!(entity.is_on(), Some(true));

        entity.turn_off().await.unwrap();
        assert_eq!(entity.is_on(), Some(false));

        assert_eq!(handle.switch_calls(), vec!["1", "0"]);
    }

    #[tokio::test]
    async fn test_update_copies_battery_and_firmware() {
        let (mut entity, handle) = switch();
        handle.set_settings(BotSettings {
            battery: 96,
            firmware: 6.4,
            n_timers: 2,
            dual_state_mode: true,
            inverse_direction: false,
            hold_seconds: 3,
        });

        entity.update().await.unwrap();

        assert_eq!(entity.battery_level(), Some(96));
        assert_eq!(entity.firmware(), Some(6.4));
        // Polling never touches the on/off state
        assert_eq!(entity.is_on(), None);

        let attrs = entity.extra_attributes();
        assert_eq!(attrs["n_timers"], 2);
        assert_eq!(attrs["dual_state_mode"], true);
        assert_eq!(attrs["hold_seconds"], 3);
        assert_eq!(attrs["mac"], "AA:BB:CC:DD:EE:FF");
    }

    #[tokio::test]
    async fn test_failed_calls_keep_previous_state() {
        let (mut entity, handle) = switch();
        entity.turn_on().await.unwrap();
        entity.update().await.unwrap();

        handle.set_should_fail(true);
        assert!(entity.turn_off().await.is_err());
        assert!(entity.update().await.is_err());

        assert_eq!(entity.is_on(), Some(true));
        assert_eq!(entity.battery_level(), Some(100));
        assert_eq!(handle.switch_calls(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_switch_state_snapshot() {
        let (mut entity, _) = switch();
        entity.turn_on().await.unwrap();
        entity.update().await.unwrap();

        let state = entity.switch_state();
        assert_eq!(state.name, "kettle");
        assert_eq!(state.on, Some(true));
        assert_eq!(state.battery_level, Some(100));
        assert_eq!(state.firmware, Some(6.4));
    }
}
