//! Type-safe message system for switchbotd
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use super::state::SwitchState;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug, Clone)]
pub enum FromIntegrationMessage {
    /// An entity was registered by a platform
    EntityDiscovered {
        entity_id: String,
        integration_name: String,
    },

    /// An entity was removed
    EntityRemoved { entity_id: String },

    /// A switch's state or attributes changed
    SwitchStateChanged {
        entity_id: String,
        state: SwitchState,
    },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToIntegrationMessage {
    /// Command to turn a switch on or off
    SwitchCommand { entity_id: String, on: bool },

    /// Request an immediate poll of an entity
    UpdateEntity { entity_id: String },
}

impl ToIntegrationMessage {
    /// The entity this command targets, used for routing
    pub fn entity_id(&self) -> &str {
        match self {
            ToIntegrationMessage::SwitchCommand { entity_id, .. } => entity_id,
            ToIntegrationMessage::UpdateEntity { entity_id } => entity_id,
        }
    }
}
