//! Entity abstraction for switchbotd
//!
//! Platforms hand entities to the host through an [`AddEntities`] callback.
//! The host owns them afterwards: it polls `update` and forwards user
//! commands to the mutators.

use std::error::Error;

use async_trait::async_trait;

use super::state::SwitchState;

/// Error type returned by entity operations
pub type EntityError = Box<dyn Error + Send + Sync>;

/// Base trait that all entities must implement
#[async_trait]
pub trait Entity: Send + Sync {
    /// Display name of the entity
    fn name(&self) -> &str;

    /// Return the platform type of this entity (e.g. "switch")
    fn platform(&self) -> &'static str;

    /// Whether the host should call `update` on a timer
    fn should_poll(&self) -> bool {
        true
    }

    /// Fetch fresh data from the device
    async fn update(&mut self) -> Result<(), EntityError>;
}

/// A two-state entity that can be commanded on and off
#[async_trait]
pub trait SwitchEntity: Entity {
    /// `None` while the state is unknown
    fn is_on(&self) -> Option<bool>;

    fn battery_level(&self) -> Option<u8> {
        None
    }

    fn firmware(&self) -> Option<f64> {
        None
    }

    /// Extra attributes exposed alongside the state
    fn extra_attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::new()
    }

    async fn turn_on(&mut self) -> Result<(), EntityError>;

    async fn turn_off(&mut self) -> Result<(), EntityError>;

    /// Snapshot of this entity for the engine's state store
    fn switch_state(&self) -> SwitchState {
        SwitchState {
            name: self.name().to_string(),
            on: self.is_on(),
            battery_level: self.battery_level(),
            firmware: self.firmware(),
            attributes: self.extra_attributes(),
        }
    }
}

/// Callback a platform uses to hand its entities to the host
pub type AddEntities<'a> = &'a mut dyn FnMut(Vec<Box<dyn SwitchEntity>>);

/// Turn a display name into an entity id object part: `"Coffee Machine"` → `coffee_machine`
///
/// Non-ASCII letters are transliterated, so `"Küche"` becomes `kuche`.
pub fn slugify(name: &str) -> String {
    slug::slugify(name).replace('-', "_")
}

/// Generate a unique `domain.object_id` entity id
///
/// Collisions with `taken` get `_2`, `_3`, ... suffixes.
pub fn generate_entity_id(
    domain: &str,
    namespace: Option<&str>,
    name: &str,
    taken: impl Fn(&str) -> bool,
) -> String {
    let mut object_id = match namespace {
        Some(ns) => slugify(&format!("{} {}", ns, name)),
        None => slugify(name),
    };
    if object_id.is_empty() {
        object_id = "unnamed".to_string();
    }

    let base = format!("{}.{}", domain, object_id);
    if !taken(&base) {
        return base;
    }

    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Coffee Machine"), "coffee_machine");
        assert_eq!(slugify("  bot #1 "), "bot_1");
        assert_eq!(slugify("Küche--Licht"), "kuche_licht");
        assert_eq!(slugify("Café Lamp"), "cafe_lamp");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_generate_entity_id() {
        let mut taken = HashSet::new();

        let first = generate_entity_id("switch", None, "bot", |id| taken.contains(id));
        assert_eq!(first, "switch.bot");
        taken.insert(first);

        let second = generate_entity_id("switch", None, "Bot", |id| taken.contains(id));
        assert_eq!(second, "switch.bot_2");
        taken.insert(second);

        let third = generate_entity_id("switch", None, "bot", |id| taken.contains(id));
        assert_eq!(third, "switch.bot_3");
    }

    #[test]
    fn test_generate_entity_id_with_namespace() {
        let id = generate_entity_id("switch", Some("Kitchen"), "Kettle", |_| false);
        assert_eq!(id, "switch.kitchen_kettle");

        let id = generate_entity_id("switch", None, "Wohnzimmer Rollo", |_| false);
        assert_eq!(id, "switch.wohnzimmer_rollo");

        let id = generate_entity_id("switch", None, "!!!", |_| false);
        assert_eq!(id, "switch.unnamed");
    }
}
