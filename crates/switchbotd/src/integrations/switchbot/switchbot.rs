use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::bot::BotFactory;
use super::config::SwitchBotConfig;
use super::platform::setup_platform;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::SwitchEntity;
use crate::engine::ToIntegrationMessage;
use crate::engine::generate_entity_id;

/// Name this integration registers under
pub const INTEGRATION_NAME: &str = "switchbot";

/// Type alias for a shared entity
type SharedEntity = Arc<Mutex<Box<dyn SwitchEntity>>>;

/// Type alias for the shared entities map
type EntitiesMap = Arc<Mutex<HashMap<String, SharedEntity>>>;

/// SwitchBot integration for switchbotd
///
/// Runs the `switchbot` switch platform once per configured entry, owns the
/// resulting entities, polls them on each entry's scan interval, and executes
/// switch commands routed from the engine.
pub struct SwitchBotIntegration {
    factory: Arc<dyn BotFactory>,
    configs: Vec<SwitchBotConfig>,
    entities: EntitiesMap,
    to_engine: Option<FromIntegrationSender>,
    /// Handles to the background polling tasks
    poll_tasks: Vec<JoinHandle<()>>,
}

impl SwitchBotIntegration {
    pub fn new(factory: Arc<dyn BotFactory>, configs: Vec<SwitchBotConfig>) -> Self {
        Self {
            factory,
            configs,
            entities: Arc::new(Mutex::new(HashMap::new())),
            to_engine: None,
            poll_tasks: Vec::new(),
        }
    }

    /// Poll a group of entities forever, one round per scan interval
    ///
    /// The first round runs immediately so attributes are populated on startup.
    async fn poll_task(
        entity_ids: Vec<String>,
        interval: std::time::Duration,
        entities: EntitiesMap,
        to_engine: FromIntegrationSender,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            for entity_id in &entity_ids {
                if let Err(e) = Self::update_entity(entity_id, &entities, &to_engine).await {
                    warn!("Failed to update {}: {}", entity_id, e);
                }
            }
        }
    }

    async fn lookup(
        entity_id: &str,
        entities: &EntitiesMap,
    ) -> Result<SharedEntity, Box<dyn Error + Send>> {
        let guard = entities.lock().await;
        guard
            .get(entity_id)
            .cloned()
            .ok_or_else(|| -> Box<dyn Error + Send> {
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Switch not found: {}", entity_id),
                ))
            })
    }

    /// Poll one entity and report its new state
    async fn update_entity(
        entity_id: &str,
        entities: &EntitiesMap,
        to_engine: &FromIntegrationSender,
    ) -> Result<(), Box<dyn Error + Send>> {
        let entity = Self::lookup(entity_id, entities).await?;
        let state = {
            let mut entity = entity.lock().await;
            debug!("Polling {}", entity_id);
            entity.update().await.map_err(|e| e as Box<dyn Error + Send>)?;
            entity.switch_state()
        };

        Self::report_state(entity_id, state, to_engine).await;
        Ok(())
    }

    /// Turn one entity on or off and report its new state
    async fn command_entity(
        &self,
        entity_id: &str,
        on: bool,
    ) -> Result<(), Box<dyn Error + Send>> {
        let entity = Self::lookup(entity_id, &self.entities).await?;
        let state = {
            let mut entity = entity.lock().await;
            let result = if on {
                entity.turn_on().await
            } else {
                entity.turn_off().await
            };
            result.map_err(|e| e as Box<dyn Error + Send>)?;
            entity.switch_state()
        };

        info!("Switched {} {}", entity_id, if on { "on" } else { "off" });

        if let Some(tx) = &self.to_engine {
            Self::report_state(entity_id, state, tx).await;
        }
        Ok(())
    }

    async fn report_state(
        entity_id: &str,
        state: crate::engine::SwitchState,
        to_engine: &FromIntegrationSender,
    ) {
        let msg = FromIntegrationMessage::SwitchStateChanged {
            entity_id: entity_id.to_string(),
            state,
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send SwitchStateChanged message: {}", e);
        }
    }

    async fn register_entity(entity_id: &str, to_engine: &FromIntegrationSender) {
        let msg = FromIntegrationMessage::EntityDiscovered {
            entity_id: entity_id.to_string(),
            integration_name: INTEGRATION_NAME.to_string(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send EntityDiscovered message: {}", e);
        } else {
            info!("Registered entity: {}", entity_id);
        }
    }
}

#[async_trait]
impl Integration for SwitchBotIntegration {
    fn name(&self) -> &str {
        INTEGRATION_NAME
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        self.to_engine = Some(tx.clone());

        for config in &self.configs {
            let mut added: Vec<Box<dyn SwitchEntity>> = Vec::new();
            setup_platform(config, self.factory.as_ref(), &mut |entities| {
                added.extend(entities)
            });

            let mut entity_ids = Vec::with_capacity(added.len());
            {
                let mut entities = self.entities.lock().await;
                for entity in added {
                    let entity_id = generate_entity_id(
                        entity.platform(),
                        config.entity_namespace.as_deref(),
                        entity.name(),
                        |id| entities.contains_key(id),
                    );
                    let state = entity.switch_state();
                    entities.insert(entity_id.clone(), Arc::new(Mutex::new(entity)));
                    entity_ids.push((entity_id, state));
                }
            }

            for (entity_id, state) in &entity_ids {
                Self::register_entity(entity_id, &tx).await;
                Self::report_state(entity_id, state.clone(), &tx).await;
            }

            let polled: Vec<String> = {
                let entities = self.entities.lock().await;
                let mut polled = Vec::new();
                for (entity_id, _) in &entity_ids {
                    if let Some(entity) = entities.get(entity_id) {
                        if entity.lock().await.should_poll() {
                            polled.push(entity_id.clone());
                        }
                    }
                }
                polled
            };

            if polled.is_empty() {
                continue;
            }

            info!(
                "Polling {:?} every {}s",
                polled,
                config.scan_interval.as_secs()
            );
            let task = tokio::spawn(Self::poll_task(
                polled,
                config.scan_interval,
                self.entities.clone(),
                tx.clone(),
            ));
            self.poll_tasks.push(task);
        }

        info!("SwitchBot integration ready to handle commands");
        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::SwitchCommand { entity_id, on } => {
                info!("Handling switch command for {}: on={}", entity_id, on);
                self.command_entity(&entity_id, on).await?;
            }
            ToIntegrationMessage::UpdateEntity { entity_id } => {
                let tx = self.to_engine.clone().ok_or_else(|| -> Box<dyn Error + Send> {
                    Box::new(std::io::Error::new(
                        std::io::ErrorKind::NotConnected,
                        "integration not set up",
                    ))
                })?;
                Self::update_entity(&entity_id, &self.entities, &tx).await?;
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("SwitchBot integration shutting down");
        for task in self.poll_tasks.drain(..) {
            task.abort();
        }
        Ok(())
    }
}
