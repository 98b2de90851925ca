//! Contract between the engine and the integrations that own devices.
//!
//! An integration owns a set of switch entities. It reports discovery and
//! state through [`FromIntegrationMessage`] and receives switch and update
//! requests as [`ToIntegrationMessage`]. Factories are collected at link time
//! in [`REGISTRY`]; each one looks at the loaded [`Config`] and returns an
//! integration only if it has entries to run.

use std::error::Error;

use async_trait::async_trait;
use linkme::distributed_slice;
use tokio::sync::mpsc;

use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use crate::config::Config;

/// Integration → engine. Bounded so a chatty poller waits on the engine.
pub type FromIntegrationSender = mpsc::Sender<FromIntegrationMessage>;
pub type FromIntegrationReceiver = mpsc::Receiver<FromIntegrationMessage>;

/// Engine → integration. Unbounded; the engine never waits on a device.
pub type ToIntegrationSender = mpsc::UnboundedSender<ToIntegrationMessage>;

/// `Ok(None)` means the factory found nothing to run in the config
pub type IntegrationFactoryResult = anyhow::Result<Option<Box<dyn Integration>>>;

/// Factory signature for [`REGISTRY`] entries
pub type IntegrationFactory = fn(&Config) -> IntegrationFactoryResult;

#[distributed_slice]
pub static REGISTRY: [IntegrationFactory];

#[async_trait]
pub trait Integration: Send + Sync {
    /// Name the engine routes entities by, e.g. `switchbot`
    fn name(&self) -> &str;

    /// Create entities and start polling
    ///
    /// Every entity must be announced with `EntityDiscovered` before its
    /// first `SwitchStateChanged`, otherwise the engine cannot route
    /// commands back to it.
    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>>;

    /// Turn a switch on or off, or refresh it out of schedule
    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>>;

    /// Stop background work. Entities are dropped with the integration.
    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>>;
}
