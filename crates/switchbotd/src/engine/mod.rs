mod engine;
pub mod entity;
mod event;
mod integration;
mod message;
pub mod state;

pub use engine::CommandError;
pub use engine::Engine;
pub use entity::AddEntities;
pub use entity::Entity;
pub use entity::EntityError;
pub use entity::SwitchEntity;
pub use entity::generate_entity_id;
pub use event::Event;
pub use integration::FromIntegrationSender;
pub use integration::Integration;
pub use integration::IntegrationFactory;
pub use integration::IntegrationFactoryResult;
pub use integration::REGISTRY as INTEGRATION_REGISTRY;
pub use message::FromIntegrationMessage;
pub use message::ToIntegrationMessage;
pub use state::State;
pub use state::SwitchState;
