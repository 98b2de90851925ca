use std::time::Duration;

use crate::config::ConfigWarning;
use crate::config::ValidationError;

/// Platform name used in `[[switch]]` entries
pub const PLATFORM: &str = "switchbot";

const DEFAULT_NAME: &str = "bot";
const DEFAULT_ID: u32 = 0;
const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Keys understood by this platform; anything else draws a warning
const KNOWN_KEYS: &[&str] = &[
    "platform",
    "mac",
    "name",
    "id",
    "password",
    "scan_interval",
    "entity_namespace",
];

/// Configuration for one SwitchBot bot
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchBotConfig {
    /// Bluetooth address, normalized to upper-case colon-separated form
    pub mac: String,

    /// Display name (default: "bot")
    pub name: String,

    /// Numeric device id handed to the driver (default: 0)
    pub id: u32,

    /// Optional device password
    pub password: Option<String>,

    /// How often the host polls the device for settings (default: 30s)
    pub scan_interval: Duration,

    /// Optional prefix for generated entity ids
    pub entity_namespace: Option<String>,
}

impl SwitchBotConfig {
    /// Validate one `[[switch]]` table whose platform is `switchbot`
    ///
    /// `path` is the entry's location in the file, e.g. `switch[2]`, and
    /// prefixes every reported field. Non-fatal findings go to `warnings`.
    pub fn from_table(
        path: &str,
        table: &toml::Table,
        warnings: &mut Vec<ConfigWarning>,
    ) -> Result<Self, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let field = |key: &str| format!("{}.{}", path, key);

        for key in table.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                warnings.push(ConfigWarning::UnknownKey {
                    field_path: field(key),
                    platform: PLATFORM.to_string(),
                });
            }
        }

        let mac = match table.get("mac") {
            Some(toml::Value::String(s)) => match normalize_mac(s) {
                Some(mac) => Some(mac),
                None => {
                    errors.push(ValidationError::new(
                        field("mac"),
                        format!("invalid MAC address '{}'", s),
                    ));
                    None
                }
            },
            Some(_) => {
                errors.push(ValidationError::new(field("mac"), "expected a string"));
                None
            }
            None => {
                errors.push(ValidationError::new(
                    field("mac"),
                    "required key not provided",
                ));
                None
            }
        };

        let name = match table.get("name") {
            Some(toml::Value::String(s)) if s.trim().is_empty() => {
                errors.push(ValidationError::new(field("name"), "must not be empty"));
                None
            }
            Some(toml::Value::String(s)) => Some(s.clone()),
            // Numbers are coerced to their string form
            Some(toml::Value::Integer(n)) => Some(n.to_string()),
            Some(toml::Value::Float(n)) => Some(n.to_string()),
            Some(_) => {
                errors.push(ValidationError::new(field("name"), "expected a string"));
                None
            }
            None => Some(DEFAULT_NAME.to_string()),
        };

        let id = match table.get("id") {
            Some(value) => match non_negative_int(value) {
                Ok(id) => Some(id),
                Err(message) => {
                    errors.push(ValidationError::new(field("id"), message));
                    None
                }
            },
            None => Some(DEFAULT_ID),
        };

        let password = match table.get("password") {
            Some(toml::Value::String(s)) => Some(s.clone()),
            Some(_) => {
                errors.push(ValidationError::new(field("password"), "expected a string"));
                None
            }
            None => None,
        };

        let scan_interval = match table.get("scan_interval") {
            Some(value) => match non_negative_int(value) {
                Ok(0) => {
                    errors.push(ValidationError::new(
                        field("scan_interval"),
                        "must be greater than zero",
                    ));
                    None
                }
                Ok(secs) => Some(Duration::from_secs(u64::from(secs))),
                Err(message) => {
                    errors.push(ValidationError::new(field("scan_interval"), message));
                    None
                }
            },
            None => Some(DEFAULT_SCAN_INTERVAL),
        };

        let entity_namespace = match table.get("entity_namespace") {
            Some(toml::Value::String(s)) => Some(s.clone()),
            Some(_) => {
                errors.push(ValidationError::new(
                    field("entity_namespace"),
                    "expected a string",
                ));
                None
            }
            None => None,
        };

        match (mac, name, id, scan_interval) {
            (Some(mac), Some(name), Some(id), Some(scan_interval)) if errors.is_empty() => {
                Ok(Self {
                    mac,
                    name,
                    id,
                    password,
                    scan_interval,
                    entity_namespace,
                })
            }
            _ => Err(errors),
        }
    }
}

/// Accepts integers and integer strings, like the host's positive-int coercion
fn non_negative_int(value: &toml::Value) -> Result<u32, String> {
    let n = match value {
        toml::Value::Integer(n) => *n,
        toml::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("expected an integer, got '{}'", s))?,
        other => return Err(format!("expected an integer, got {}", other.type_str())),
    };

    if n < 0 {
        return Err(format!("must be at least 0, got {}", n));
    }
    u32::try_from(n).map_err(|_| format!("value {} is too large", n))
}

/// Parse `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff` into `AA:BB:CC:DD:EE:FF`
fn normalize_mac(raw: &str) -> Option<String> {
    let octets: Vec<&str> = raw.trim().split([':', '-']).collect();
    if octets.len() != 6 {
        return None;
    }

    let valid = octets
        .iter()
        .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return None;
    }

    Some(octets.join(":").to_ascii_uppercase())
}
