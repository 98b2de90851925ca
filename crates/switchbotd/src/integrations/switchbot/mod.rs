//! SwitchBot "Bot" switch platform.
//!
//! Each `[[switch]]` entry with `platform = "switchbot"` becomes one switch
//! entity driving one physical bot.

mod bot;
mod config;
mod driver;
mod entity;
mod platform;
pub mod simulated;
#[allow(clippy::module_inception)]
mod switchbot;

use std::sync::Arc;

use linkme::distributed_slice;
use tracing::warn;

pub use bot::Bot;
pub use bot::BotError;
pub use bot::BotFactory;
pub use bot::BotSettings;
pub use bot::BotSpec;
pub use bot::SWITCH_OFF;
pub use bot::SWITCH_ON;
pub use config::PLATFORM;
pub use config::SwitchBotConfig;
pub use driver::DriverBot;
pub use driver::DriverFactory;
pub use entity::BotSwitch;
pub use platform::setup_platform;
pub use switchbot::INTEGRATION_NAME;
pub use switchbot::SwitchBotIntegration;

use crate::config::Config;
use crate::engine;

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_switchbot(config: &Config) -> engine::IntegrationFactoryResult {
    if config.switchbot.is_empty() {
        return Ok(None);
    }

    let factory: Arc<dyn BotFactory> = match &config.driver {
        Some(driver) => Arc::new(DriverFactory::new(driver.clone())),
        None => {
            warn!("No [driver] configured; SwitchBot entities will be simulated");
            Arc::new(simulated::SimulatedFactory::new())
        }
    };

    Ok(Some(Box::new(SwitchBotIntegration::new(
        factory,
        config.switchbot.clone(),
    ))))
}
