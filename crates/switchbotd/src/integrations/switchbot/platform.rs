use tracing::info;

use super::bot::BotFactory;
use super::bot::BotSpec;
use super::config::SwitchBotConfig;
use super::entity::BotSwitch;
use crate::engine::AddEntities;
use crate::engine::SwitchEntity;

/// Set up the SwitchBot platform for one validated config entry
///
/// Builds a single device handle and hands exactly one entity to the host.
pub fn setup_platform(
    config: &SwitchBotConfig,
    factory: &dyn BotFactory,
    add_entities: AddEntities<'_>,
) {
    let spec = BotSpec {
        id: config.id,
        mac: config.mac.clone(),
        name: config.name.clone(),
        password: config.password.clone(),
    };

    info!(
        "Setting up SwitchBot '{}' (mac: {}, id: {})",
        spec.name, spec.mac, spec.id
    );

    let bot = factory.create(spec);
    let entity: Box<dyn SwitchEntity> = Box::new(BotSwitch::new(bot));
    add_entities(vec![entity]);
}
