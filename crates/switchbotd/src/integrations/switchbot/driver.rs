//! Bridge to an external vendor driver process.
//!
//! The driver owns the radio. switchbotd starts one driver process per bot
//! and exchanges newline-delimited JSON with it:
//!
//! - every request gets exactly one response line
//! - the first request on a fresh process is always `connect`
//! - a process that dies or stops answering is dropped and restarted on the
//!   next call

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::io::Lines;
use tokio::process::Child;
use tokio::process::ChildStdin;
use tokio::process::ChildStdout;
use tokio::process::Command;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::bot::Bot;
use super::bot::BotError;
use super::bot::BotFactory;
use super::bot::BotSettings;
use super::bot::BotSpec;
use crate::config::DriverConfig;

/// How long a single request may wait for its response line
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Requests written to the driver's stdin
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DriverRequest<'a> {
    Connect {
        id: u32,
        mac: &'a str,
        name: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        password: Option<&'a str>,
    },
    Switch {
        value: &'a str,
    },
    GetSettings,
}

/// Responses read from the driver's stdout
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DriverResponse {
    Ok,
    Settings(BotSettings),
    Error { message: String },
}

/// A running driver process
struct DriverProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Device handle backed by a driver process
pub struct DriverBot {
    driver: Arc<DriverConfig>,
    spec: BotSpec,
    process: Option<DriverProcess>,
}

impl DriverBot {
    pub fn new(driver: Arc<DriverConfig>, spec: BotSpec) -> Self {
        Self {
            driver,
            spec,
            process: None,
        }
    }

    fn spawn(&self) -> Result<DriverProcess, BotError> {
        let mut child = Command::new(&self.driver.command)
            .args(&self.driver.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BotError::Spawn {
                command: self.driver.command.display().to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BotError::Protocol("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BotError::Protocol("driver stdout unavailable".to_string()))?;

        Ok(DriverProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    /// Start the driver and send `connect` if no process is running
    async fn ensure_started(&mut self) -> Result<(), BotError> {
        if self.process.is_some() {
            return Ok(());
        }

        let mut process = self.spawn()?;
        info!(
            "[{}] Started driver {} (pid {:?})",
            self.spec.mac,
            self.driver.command.display(),
            process.child.id()
        );

        let connect = DriverRequest::Connect {
            id: self.spec.id,
            mac: &self.spec.mac,
            name: &self.spec.name,
            password: self.spec.password.as_deref(),
        };
        match exchange(&mut process, &connect).await? {
            DriverResponse::Ok => {}
            DriverResponse::Error { message } => {
                return Err(BotError::Device {
                    mac: self.spec.mac.clone(),
                    message,
                })
            }
            other => {
                return Err(BotError::Protocol(format!(
                    "unexpected response to connect: {:?}",
                    other
                )))
            }
        }

        self.process = Some(process);
        Ok(())
    }

    /// Send one request, restarting the driver on the next call if the
    /// transport fails
    async fn request(&mut self, request: &DriverRequest<'_>) -> Result<DriverResponse, BotError> {
        self.ensure_started().await?;

        let Some(process) = self.process.as_mut() else {
            return Err(BotError::Closed);
        };

        match exchange(process, request).await {
            Ok(DriverResponse::Error { message }) => Err(BotError::Device {
                mac: self.spec.mac.clone(),
                message,
            }),
            Ok(response) => Ok(response),
            Err(e) => {
                warn!("[{}] Dropping driver after error: {}", self.spec.mac, e);
                self.process = None;
                Err(e)
            }
        }
    }
}

/// Write one request line and read one response line
async fn exchange(
    process: &mut DriverProcess,
    request: &DriverRequest<'_>,
) -> Result<DriverResponse, BotError> {
    let mut line = serde_json::to_string(request)
        .map_err(|e| BotError::Protocol(format!("failed to encode request: {}", e)))?;
    debug!("driver <- {}", line);
    line.push('\n');

    process.stdin.write_all(line.as_bytes()).await?;
    process.stdin.flush().await?;

    let reply = tokio::time::timeout(RESPONSE_TIMEOUT, process.stdout.next_line())
        .await
        .map_err(|_| BotError::Timeout(RESPONSE_TIMEOUT))??
        .ok_or(BotError::Closed)?;
    debug!("driver -> {}", reply);

    serde_json::from_str(&reply)
        .map_err(|e| BotError::Protocol(format!("invalid response '{}': {}", reply, e)))
}

#[async_trait]
impl Bot for DriverBot {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn mac(&self) -> &str {
        &self.spec.mac
    }

    async fn switch(&mut self, value: &str) -> Result<(), BotError> {
        match self.request(&DriverRequest::Switch { value }).await? {
            DriverResponse::Ok => Ok(()),
            other => Err(BotError::Protocol(format!(
                "unexpected response to switch: {:?}",
                other
            ))),
        }
    }

    async fn get_settings(&mut self) -> Result<BotSettings, BotError> {
        match self.request(&DriverRequest::GetSettings).await? {
            DriverResponse::Settings(settings) => Ok(settings),
            other => Err(BotError::Protocol(format!(
                "unexpected response to get_settings: {:?}",
                other
            ))),
        }
    }
}

/// Creates one [`DriverBot`] per configured bot
pub struct DriverFactory {
    driver: Arc<DriverConfig>,
}

impl DriverFactory {
    pub fn new(driver: DriverConfig) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }
}

impl BotFactory for DriverFactory {
    fn create(&self, spec: BotSpec) -> Box<dyn Bot> {
        Box::new(DriverBot::new(self.driver.clone(), spec))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn spec() -> BotSpec {
        BotSpec {
            id: 2,
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
            name: "kettle".to_string(),
            password: None,
        }
    }

    fn shell_driver(script: &str) -> Arc<DriverConfig> {
        Arc::new(DriverConfig {
            command: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
        })
    }

    /// Answers `ok` to connect and "1", an error to "0", and a fixed settings block
    const SCRIPTED_DRIVER: &str = r#"
        while IFS= read -r line; do
            case "$line" in
                *get_settings*)
                    echo '{"type":"settings","battery":96,"firmware":6.4,"n_timers":0,"dual_state_mode":true,"inverse_direction":false,"hold_seconds":0}' ;;
                *'"value":"0"'*)
                    echo '{"type":"error","message":"arm jammed"}' ;;
                *)
                    echo '{"type":"ok"}' ;;
            esac
        done
    "#;

    #[test]
    fn test_request_encoding() {
        let connect = DriverRequest::Connect {
            id: 2,
            mac: "AA:BB:CC:DD:EE:FF",
            name: "kettle",
            password: None,
        };
        assert_eq!(
            serde_json::to_value(&connect).unwrap(),
            serde_json::json!({"type": "connect", "id": 2, "mac": "AA:BB:CC:DD:EE:FF", "name": "kettle"})
        );

        assert_eq!(
            serde_json::to_string(&DriverRequest::Switch { value: "1" }).unwrap(),
            r#"{"type":"switch","value":"1"}"#
        );
        assert_eq!(
            serde_json::to_string(&DriverRequest::GetSettings).unwrap(),
            r#"{"type":"get_settings"}"#
        );
    }

    #[test]
    fn test_response_decoding() {
        assert!(matches!(
            serde_json::from_str::<DriverResponse>(r#"{"type":"ok"}"#).unwrap(),
            DriverResponse::Ok
        ));
        match serde_json::from_str::<DriverResponse>(
            r#"{"type":"settings","battery":50,"firmware":4.9}"#,
        )
        .unwrap()
        {
            DriverResponse::Settings(s) => assert_eq!(s.battery, 50),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(serde_json::from_str::<DriverResponse>(r#"{"type":"bogus"}"#).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scripted_driver() {
        let mut bot = DriverBot::new(shell_driver(SCRIPTED_DRIVER), spec());

        bot.switch("1").await.unwrap();

        let settings = bot.get_settings().await.unwrap();
        assert_eq!(settings.battery, 96);
        assert_eq!(settings.firmware, 6.4);

        let err = bot.switch("0").await.unwrap_err();
        assert!(
            matches!(&err, BotError::Device { message, .. } if message == "arm jammed"),
            "unexpected error: {err:?}"
        );

        // A device-level error keeps the driver running
        assert!(bot.process.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_driver_that_exits_is_dropped() {
        let mut bot = DriverBot::new(shell_driver("exit 0"), spec());

        assert!(bot.switch("1").await.is_err());
        assert!(bot.process.is_none());
    }

    #[tokio::test]
    async fn test_missing_driver_binary() {
        let driver = Arc::new(DriverConfig {
            command: PathBuf::from("/nonexistent/switchbot-driver"),
            args: Vec::new(),
        });
        let mut bot = DriverBot::new(driver, spec());

        let err = bot.get_settings().await.unwrap_err();
        assert!(matches!(err, BotError::Spawn { .. }));
    }
}
