//! Configuration file parsing and structures.
//!
//! switchbotd uses TOML for declarative configuration. Platform entries live
//! in `[[switch]]` tables and are only loosely typed at parse time: each entry
//! is routed by its `platform` key to the integration that owns its schema.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

use crate::integrations::switchbot::PLATFORM;
use crate::integrations::switchbot::SwitchBotConfig;

/// Top-level configuration structure
#[derive(Debug, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub api: Option<ApiConfig>,
    pub driver: Option<DriverConfig>,

    /// Validated `switchbot` platform entries, in file order
    pub switchbot: Vec<SwitchBotConfig>,

    /// Problems that don't prevent loading, reported by the caller once
    /// logging is up
    pub warnings: Vec<ConfigWarning>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target log levels, e.g. `"switchbotd::api" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8565
}

/// External vendor driver process
///
/// The driver owns the radio side of the device; switchbotd only speaks
/// newline-delimited JSON to it over stdin/stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    pub command: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,
}

/// On-disk shape before platform entries are validated
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    logging: LoggingConfig,

    #[serde(default)]
    api: Option<ApiConfig>,

    #[serde(default)]
    driver: Option<DriverConfig>,

    #[serde(default)]
    switch: Vec<toml::Table>,
}

/// A single problem found while validating the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field_path, self.message)
    }
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    UnknownKey { field_path: String, platform: String },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::UnknownKey {
                field_path,
                platform,
            } => write!(f, "{}: unknown key for platform {}", field_path, platform),
        }
    }
}

/// Render validation errors one per line
pub fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::parse(&contents)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// All validation problems are collected and reported together.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents)?;

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut switchbot = Vec::new();

        for (index, entry) in raw.switch.iter().enumerate() {
            let path = format!("switch[{}]", index);
            match entry.get("platform") {
                Some(toml::Value::String(platform)) if platform == PLATFORM => {
                    match SwitchBotConfig::from_table(&path, entry, &mut warnings) {
                        Ok(cfg) => switchbot.push(cfg),
                        Err(mut e) => errors.append(&mut e),
                    }
                }
                Some(toml::Value::String(platform)) => {
                    tracing::debug!("{}: ignoring entry for platform '{}'", path, platform);
                }
                Some(_) => errors.push(ValidationError::new(
                    format!("{}.platform", path),
                    "expected a string",
                )),
                None => errors.push(ValidationError::new(
                    format!("{}.platform", path),
                    "required key not provided",
                )),
            }
        }

        if let Some(api) = &raw.api {
            if api.port == 0 {
                errors.push(ValidationError::new("api.port", "must be non-zero"));
            }
        }

        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        Ok(Config {
            logging: raw.logging,
            api: raw.api,
            driver: raw.driver,
            switchbot,
            warnings,
        })
    }
}
