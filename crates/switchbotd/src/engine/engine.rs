use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::event::Event;
use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::ToIntegrationSender;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::State;

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

/// Capacity for the engine→subscriber event channel
const EVENT_CHANNEL_SIZE: usize = 256;

/// How long an integration gets to finish after its command channel closes
const INTEGRATION_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure to route a command to an integration
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("No integration found for entity: {0}")]
    UnknownEntity(String),

    #[error("Integration '{0}' is not running")]
    IntegrationGone(String),
}

/// switchbotd engine
///
/// This structure handles the flow of events, sending commands to the correct
/// integration, and maintaining a view of the world with State.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Map of entity_id -> integration name for routing messages
    entity_integration_map: std::sync::Mutex<HashMap<String, String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: std::sync::Mutex<HashMap<String, ToIntegrationSender>>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Fan-out of processed events
    events: broadcast::Sender<Event>,

    /// Handles for integration tasks
    integration_handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            entity_integration_map: std::sync::Mutex::new(HashMap::new()),
            integration_channels: std::sync::Mutex::new(HashMap::new()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            events,
            integration_handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Register integrations from configuration
    ///
    /// Every factory in the integration registry inspects the config and
    /// decides whether it has anything to run.
    pub fn register_integrations_from_config(&self, cfg: &crate::config::Config) -> usize {
        let mut registered = 0;
        for constr in super::integration::REGISTRY {
            let integration = match constr(cfg) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration);
            registered += 1;
        }

        registered
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        if let Ok(mut channels) = self.integration_channels.lock() {
            channels.insert(name.clone(), to_integration_tx);
        }

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        if let Ok(mut handles) = self.integration_handles.lock() {
            handles.push(handle);
        }
    }

    /// Send a command to an integration
    ///
    /// Routes the command to the appropriate integration based on entity_id.
    pub fn send_command(&self, msg: ToIntegrationMessage) -> Result<(), CommandError> {
        let entity_id = msg.entity_id().to_string();

        // Route to the integration that owns this entity
        let integration_name = self
            .entity_integration_map
            .lock()
            .ok()
            .and_then(|map| map.get(&entity_id).cloned())
            .ok_or_else(|| CommandError::UnknownEntity(entity_id.clone()))?;

        let channels = self
            .integration_channels
            .lock()
            .map_err(|_| CommandError::IntegrationGone(integration_name.clone()))?;

        let tx = channels
            .get(&integration_name)
            .ok_or_else(|| CommandError::IntegrationGone(integration_name.clone()))?;

        tx.send(msg)
            .map_err(|_| CommandError::IntegrationGone(integration_name))
    }

    /// Send a switch command to turn an entity on or off
    pub fn send_switch_command(&self, entity_id: String, on: bool) -> Result<(), CommandError> {
        self.send_command(ToIntegrationMessage::SwitchCommand { entity_id, on })
    }

    /// Ask the owning integration to poll an entity now
    pub fn request_update(&self, entity_id: String) -> Result<(), CommandError> {
        self.send_command(ToIntegrationMessage::UpdateEntity { entity_id })
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send>> {
        info!("Engine starting");

        // Main event loop - only receives FromIntegration messages
        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
        Ok(())
    }

    /// Stop all integrations and wait for them to finish
    ///
    /// Closing the command channels ends each integration's command loop,
    /// which then runs its `shutdown` hook.
    pub async fn shutdown(&self) {
        if let Ok(mut channels) = self.integration_channels.lock() {
            channels.clear();
        }

        let handles = self
            .integration_handles
            .lock()
            .map(|mut h| std::mem::take(&mut *h))
            .unwrap_or_default();

        for handle in handles {
            match tokio::time::timeout(INTEGRATION_SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Integration task failed: {}", e),
                Err(_) => warn!("Integration did not shut down in time"),
            }
        }
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Subscribe to processed events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name,
            } => {
                info!(
                    "Entity discovered: {} (from {})",
                    entity_id, integration_name
                );

                // Record which integration owns this entity for command routing.
                // State is not populated until the first state-change message arrives.
                if let Ok(mut map) = self.entity_integration_map.lock() {
                    map.insert(entity_id, integration_name);
                }
            }
            FromIntegrationMessage::EntityRemoved { entity_id } => {
                info!("Entity removed: {}", entity_id);

                {
                    let mut state = State::clone(&self.state.load());
                    state.switches.remove(&entity_id);
                    self.state.store(Arc::new(state));
                }

                // Remove from routing map
                if let Ok(mut map) = self.entity_integration_map.lock() {
                    map.remove(&entity_id);
                }

                self.publish(Event::EntityRemoved { entity_id });
            }
            FromIntegrationMessage::SwitchStateChanged { entity_id, state } => {
                info!(
                    "Switch state changed: {} -> on={:?}, battery={:?}, firmware={:?}",
                    entity_id, state.on, state.battery_level, state.firmware
                );

                {
                    let mut snapshot = State::clone(&self.state.load());
                    snapshot.switches.insert(entity_id.clone(), state.clone());
                    self.state.store(Arc::new(snapshot));
                }

                self.publish(Event::SwitchStateChanged { entity_id, state });
            }
        }
    }

    /// Route `entity_id` to a hand-made integration channel
    #[cfg(test)]
    pub(crate) fn route_for_test(
        &self,
        entity_id: &str,
        integration_name: &str,
        tx: ToIntegrationSender,
    ) {
        if let Ok(mut channels) = self.integration_channels.lock() {
            channels.insert(integration_name.to_string(), tx);
        }
        self.handle_event(FromIntegrationMessage::EntityDiscovered {
            entity_id: entity_id.to_string(),
            integration_name: integration_name.to_string(),
        });
    }

    fn publish(&self, event: Event) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::engine::state::SwitchState;

    /// Integration that announces one entity and echoes commands back as state
    struct EchoIntegration {
        tx: Option<FromIntegrationSender>,
        seen: Arc<std::sync::Mutex<Vec<ToIntegrationMessage>>>,
    }

    #[async_trait]
    impl Integration for EchoIntegration {
        fn name(&self) -> &str {
            "echo"
        }

        async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
            tx.send(FromIntegrationMessage::EntityDiscovered {
                entity_id: "switch.echo".to_string(),
                integration_name: "echo".to_string(),
            })
            .await
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;
            self.tx = Some(tx);
            Ok(())
        }

        async fn handle_message(
            &mut self,
            msg: ToIntegrationMessage,
        ) -> Result<(), Box<dyn Error + Send>> {
            self.seen.lock().unwrap().push(msg.clone());
            if let ToIntegrationMessage::SwitchCommand { entity_id, on } = msg {
                let state = SwitchState {
                    name: "echo".to_string(),
                    on: Some(on),
                    ..Default::default()
                };
                if let Some(tx) = &self.tx {
                    tx.send(FromIntegrationMessage::SwitchStateChanged { entity_id, state })
                        .await
                        .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;
                }
            }
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }
    }

    async fn wait_for_route(engine: &Engine, entity_id: &str) {
        for _ in 0..100 {
            if engine
                .entity_integration_map
                .lock()
                .unwrap()
                .contains_key(entity_id)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("entity {} was never routed", entity_id);
    }

    #[tokio::test]
    async fn test_unknown_entity_is_rejected() {
        let engine = Engine::new();
        let err = engine
            .send_switch_command("switch.missing".to_string(), true)
            .unwrap_err();
        assert!(matches!(err, CommandError::UnknownEntity(id) if id == "switch.missing"));
    }

    #[tokio::test]
    async fn test_command_round_trip_updates_state() {
        let engine = Arc::new(Engine::new());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        engine.register_integration(
            "echo".to_string(),
            Box::new(EchoIntegration {
                tx: None,
                seen: seen.clone(),
            }),
        );

        let mut events = engine.subscribe();
        let runner = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run().await })
        };

        wait_for_route(&engine, "switch.echo").await;
        engine
            .send_switch_command("switch.echo".to_string(), true)
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            Event::SwitchStateChanged { entity_id, state } => {
                assert_eq!(entity_id, "switch.echo");
                assert_eq!(state.on, Some(true));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let snapshot = engine.state_snapshot();
        assert_eq!(snapshot.switches["switch.echo"].on, Some(true));
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[ToIntegrationMessage::SwitchCommand {
                entity_id: "switch.echo".to_string(),
                on: true,
            }]
        );

        engine.shutdown().await;
        runner.abort();
    }

    #[tokio::test]
    async fn test_entity_removed_clears_state_and_route() {
        let engine = Engine::new();
        engine.handle_event(FromIntegrationMessage::EntityDiscovered {
            entity_id: "switch.a".to_string(),
            integration_name: "echo".to_string(),
        });
        engine.handle_event(FromIntegrationMessage::SwitchStateChanged {
            entity_id: "switch.a".to_string(),
            state: SwitchState::default(),
        });
        assert!(engine.state_snapshot().switches.contains_key("switch.a"));

        let mut events = engine.subscribe();
        engine.handle_event(FromIntegrationMessage::EntityRemoved {
            entity_id: "switch.a".to_string(),
        });

        assert!(engine.state_snapshot().switches.is_empty());
        assert!(matches!(
            engine.request_update("switch.a".to_string()),
            Err(CommandError::UnknownEntity(_))
        ));
        assert_eq!(
            events.try_recv().unwrap(),
            Event::EntityRemoved {
                entity_id: "switch.a".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_command_to_stopped_integration() {
        let engine = Engine::new();
        engine.handle_event(FromIntegrationMessage::EntityDiscovered {
            entity_id: "switch.a".to_string(),
            integration_name: "gone".to_string(),
        });

        let err = engine
            .send_switch_command("switch.a".to_string(), false)
            .unwrap_err();
        assert!(matches!(err, CommandError::IntegrationGone(name) if name == "gone"));
    }
}
