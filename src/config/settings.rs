//! Settings file loading.
//!
//! Connection parameters are mandatory: a missing or malformed port or baud
//! rate fails the load, nothing is defaulted. Everything else is optional.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigError, Result};
use crate::catalog::WavelengthCatalog;
use crate::device::{DriverTiming, Position};

pub const DEFAULT_SETTINGS_PATH: &str = "config/settings.toml";

/// Where and how fast to talk to the wheel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub port: String,
    pub baud_rate: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSettings {
    pub default_save_directory: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub catalog: WavelengthCatalog,
    pub paths: PathSettings,
    pub timing: DriverTiming,
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    filter_changer: Option<RawConnection>,
    #[serde(default)]
    filter_wavelengths: toml::Table,
    #[serde(default)]
    led_wavelengths: toml::Table,
    #[serde(default)]
    paths: PathSettings,
    #[serde(default)]
    timing: RawTiming,
}

#[derive(Debug, Deserialize)]
struct RawConnection {
    port: Option<toml::Value>,
    baudrate: Option<toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTiming {
    move_timeout_ms: Option<u64>,
    query_timeout_ms: Option<u64>,
    settle_delay_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded settings from {}", path.display());
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawSettings = toml::from_str(text)?;

        let connection = connection_settings(raw.filter_changer)?;
        let catalog = WavelengthCatalog::new(
            filter_labels(&raw.filter_wavelengths)?,
            led_labels(&raw.led_wavelengths)?,
        );
        let timing = timing(&raw.timing)?;

        Ok(Self { connection, catalog, paths: raw.paths, timing })
    }
}

fn connection_settings(raw: Option<RawConnection>) -> Result<ConnectionSettings> {
    let raw = raw.ok_or(ConfigError::Missing("filter_changer"))?;

    let port = match raw.port.ok_or(ConfigError::Missing("filter_changer.port"))? {
        toml::Value::String(port) if !port.trim().is_empty() => port.trim().to_string(),
        toml::Value::String(_) => {
            return Err(ConfigError::invalid("filter_changer.port", "must not be empty"))
        }
        other => {
            return Err(ConfigError::invalid(
                "filter_changer.port",
                format!("expected a string, found {}", other.type_str()),
            ))
        }
    };

    let baud_rate = match raw.baudrate.ok_or(ConfigError::Missing("filter_changer.baudrate"))? {
        toml::Value::Integer(rate) => u32::try_from(rate)
            .ok()
            .filter(|&rate| rate > 0)
            .ok_or_else(|| {
                ConfigError::invalid(
                    "filter_changer.baudrate",
                    format!("{} is not a positive 32-bit rate", rate),
                )
            })?,
        other => {
            return Err(ConfigError::invalid(
                "filter_changer.baudrate",
                format!("expected an integer, found {}", other.type_str()),
            ))
        }
    };

    Ok(ConnectionSettings { port, baud_rate })
}

fn label(section: &str, key: &str, value: &toml::Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            ConfigError::invalid(format!("{}.{}", section, key), "expected a string label")
        })
}

fn filter_labels(table: &toml::Table) -> Result<BTreeMap<Position, String>> {
    let mut filters = BTreeMap::new();
    for (key, value) in table {
        let slot = key
            .trim()
            .parse::<i32>()
            .ok()
            .and_then(Position::new)
            .ok_or_else(|| {
                ConfigError::invalid(
                    format!("filter_wavelengths.{}", key),
                    format!("slot must be {}..={}", Position::MIN, Position::MAX),
                )
            })?;
        filters.insert(slot, label("filter_wavelengths", key, value)?);
    }
    Ok(filters)
}

fn led_labels(table: &toml::Table) -> Result<Vec<String>> {
    table
        .iter()
        .map(|(key, value)| label("led_wavelengths", key, value))
        .collect()
}

fn timing(raw: &RawTiming) -> Result<DriverTiming> {
    let defaults = DriverTiming::default();
    let ms = |value: Option<u64>, fallback: Duration| {
        value.map(Duration::from_millis).unwrap_or(fallback)
    };

    let timing = DriverTiming {
        move_timeout: ms(raw.move_timeout_ms, defaults.move_timeout),
        query_timeout: ms(raw.query_timeout_ms, defaults.query_timeout),
        settle_delay: ms(raw.settle_delay_ms, defaults.settle_delay),
        poll_interval: ms(raw.poll_interval_ms, defaults.poll_interval),
    };

    if timing.move_timeout.is_zero() {
        return Err(ConfigError::invalid("timing.move_timeout_ms", "must be greater than zero"));
    }
    if timing.query_timeout.is_zero() {
        return Err(ConfigError::invalid("timing.query_timeout_ms", "must be greater than zero"));
    }
    if timing.poll_interval.is_zero() {
        return Err(ConfigError::invalid("timing.poll_interval_ms", "must be greater than zero"));
    }
    Ok(timing)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[filter_changer]
port = "/dev/ttyUSB0"
baudrate = 9600

[filter_wavelengths]
1 = "450nm"
2 = "520nm"
8 = "Empty"

[led_wavelengths]
led2 = "470nm"
led1 = "365nm"

[paths]
default_save_directory = "captures"
"#;

    #[test]
    fn parses_full_file() {
        let settings = Settings::from_toml_str(FULL).unwrap();
        assert_eq!(
            settings.connection,
            ConnectionSettings { port: "/dev/ttyUSB0".to_string(), baud_rate: 9600 }
        );
        assert_eq!(settings.catalog.slots().count(), 3);
        // file order is kept for LEDs
        assert_eq!(settings.catalog.led_labels(), ["470nm".to_string(), "365nm".to_string()]);
        assert_eq!(settings.paths.default_save_directory, Some(PathBuf::from("captures")));
        assert_eq!(settings.timing, DriverTiming::default());
    }

    #[test]
    fn timing_overrides() {
        let text = format!("{}\n[timing]\nmove_timeout_ms = 8000\nsettle_delay_ms = 0\n", FULL);
        let settings = Settings::from_toml_str(&text).unwrap();
        assert_eq!(settings.timing.move_timeout, Duration::from_secs(8));
        assert!(settings.timing.settle_delay.is_zero());
        assert_eq!(settings.timing.query_timeout, Duration::from_secs(2));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let text = format!("{}\n[timing]\nquery_timeout_ms = 0\n", FULL);
        assert!(matches!(Settings::from_toml_str(&text), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn missing_connection_section() {
        let err = Settings::from_toml_str("[filter_wavelengths]\n1 = \"450nm\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Missing("filter_changer")));
    }

    #[test]
    fn missing_port_and_baud() {
        let err = Settings::from_toml_str("[filter_changer]\nbaudrate = 9600\n").unwrap_err();
        assert!(matches!(err, ConfigError::Missing("filter_changer.port")));

        let err = Settings::from_toml_str("[filter_changer]\nport = \"COM3\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Missing("filter_changer.baudrate")));
    }

    #[test]
    fn malformed_connection_values() {
        for text in [
            "[filter_changer]\nport = \"\"\nbaudrate = 9600\n",
            "[filter_changer]\nport = 3\nbaudrate = 9600\n",
            "[filter_changer]\nport = \"COM3\"\nbaudrate = \"fast\"\n",
            "[filter_changer]\nport = \"COM3\"\nbaudrate = 0\n",
            "[filter_changer]\nport = \"COM3\"\nbaudrate = -9600\n",
        ] {
            let err = Settings::from_toml_str(text).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }), "{text}: {err}");
        }
    }

    #[test]
    fn filter_slot_outside_wheel() {
        let text = "[filter_changer]\nport = \"COM3\"\nbaudrate = 9600\n\
                    [filter_wavelengths]\n9 = \"700nm\"\n";
        let err = Settings::from_toml_str(text).unwrap_err();
        assert!(err.to_string().contains("filter_wavelengths.9"));
    }

    #[test]
    fn broken_toml() {
        assert!(matches!(Settings::from_toml_str("[filter_changer"), Err(ConfigError::Parse(_))));
    }
}
