use super::state::SwitchState;

/// Engine-level events, broadcast to subscribers.
///
/// Distinct from `FromIntegrationMessage` (transport-level). The engine converts
/// `FromIntegrationMessage` into `Event` at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SwitchStateChanged {
        entity_id: String,
        state: SwitchState,
    },
    EntityRemoved {
        entity_id: String,
    },
}
