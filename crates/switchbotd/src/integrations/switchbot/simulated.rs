//! In-process stand-in for a real bot.
//!
//! Used when no driver is configured, and by tests. Every handle created by a
//! [`SimulatedFactory`] shares its state with a [`SimulatedBotHandle`] so
//! callers can inspect `switch` calls and change what `get_settings` returns.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;

use super::bot::Bot;
use super::bot::BotError;
use super::bot::BotFactory;
use super::bot::BotSettings;
use super::bot::BotSpec;

#[derive(Debug)]
struct Shared {
    switch_calls: Mutex<Vec<String>>,
    settings: Mutex<BotSettings>,
    should_fail: AtomicBool,
}

/// Test-side view of a simulated bot
#[derive(Debug, Clone)]
pub struct SimulatedBotHandle {
    spec: BotSpec,
    shared: Arc<Shared>,
}

impl SimulatedBotHandle {
    pub fn spec(&self) -> &BotSpec {
        &self.spec
    }

    /// Arguments of every `switch` call so far, oldest first
    pub fn switch_calls(&self) -> Vec<String> {
        self.shared
            .switch_calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn set_settings(&self, settings: BotSettings) {
        if let Ok(mut s) = self.shared.settings.lock() {
            *s = settings;
        }
    }

    /// Make every following call fail until cleared
    pub fn set_should_fail(&self, fail: bool) {
        self.shared.should_fail.store(fail, Ordering::SeqCst);
    }
}

/// A bot that lives entirely in memory
#[derive(Debug)]
pub struct SimulatedBot {
    spec: BotSpec,
    shared: Arc<Shared>,
}

impl SimulatedBot {
    pub fn new(spec: BotSpec) -> (Self, SimulatedBotHandle) {
        let shared = Arc::new(Shared {
            switch_calls: Mutex::new(Vec::new()),
            settings: Mutex::new(BotSettings {
                battery: 100,
                firmware: 6.4,
                ..Default::default()
            }),
            should_fail: AtomicBool::new(false),
        });
        let handle = SimulatedBotHandle {
            spec: spec.clone(),
            shared: shared.clone(),
        };
        (Self { spec, shared }, handle)
    }

    fn check_failure(&self) -> Result<(), BotError> {
        if self.shared.should_fail.load(Ordering::SeqCst) {
            return Err(BotError::Device {
                mac: self.spec.mac.clone(),
                message: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Bot for SimulatedBot {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn mac(&self) -> &str {
        &self.spec.mac
    }

    async fn switch(&mut self, value: &str) -> Result<(), BotError> {
        self.check_failure()?;
        if let Ok(mut calls) = self.shared.switch_calls.lock() {
            calls.push(value.to_string());
        }
        Ok(())
    }

    async fn get_settings(&mut self) -> Result<BotSettings, BotError> {
        self.check_failure()?;
        self.shared
            .settings
            .lock()
            .map(|s| s.clone())
            .map_err(|_| BotError::Protocol("settings lock poisoned".to_string()))
    }
}

/// Factory that hands out [`SimulatedBot`]s and remembers their handles
#[derive(Debug, Default)]
pub struct SimulatedFactory {
    handles: Mutex<Vec<SimulatedBotHandle>>,
}

impl SimulatedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles of every bot created so far, in creation order
    pub fn handles(&self) -> Vec<SimulatedBotHandle> {
        self.handles
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

impl BotFactory for SimulatedFactory {
    fn create(&self, spec: BotSpec) -> Box<dyn Bot> {
        let (bot, handle) = SimulatedBot::new(spec);
        if let Ok(mut handles) = self.handles.lock() {
            handles.push(handle);
        }
        Box::new(bot)
    }
}
