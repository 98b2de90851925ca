pub mod api;
pub mod config;
pub mod engine;
pub mod integrations;

pub use config::Config;
pub use config::ConfigError;
pub use config::ConfigWarning;
pub use config::LogLevel;
pub use engine::CommandError;
pub use engine::Engine;
pub use engine::Event;
pub use engine::State;
pub use engine::SwitchState;
