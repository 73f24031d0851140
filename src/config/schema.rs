//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use crate::port::{Parity, PortConfig, StopBits, DEFAULT_DATA_BITS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port defaults and aliases
    pub serial: SerialConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Loopback hardware test configuration
    pub testing: TestingConfig,
}

/// Serial port configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate used when a port is named without one
    pub default_baud: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Read timeout in milliseconds, 0 blocks until data arrives
    pub read_timeout_ms: u64,
    /// Raise DTR on open
    pub assert_dtr: bool,
    /// Port aliases for convenience
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            default_baud: 115200,
            data_bits: DEFAULT_DATA_BITS,
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout_ms: 0,
            assert_dtr: true,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// A port configuration for `name` built from the section defaults.
    pub fn port_config(&self, name: &str) -> PortConfig {
        PortConfig::new(self.resolve_port(name), self.default_baud)
            .data_bits(self.data_bits)
            .parity(self.parity)
            .stop_bits(self.stop_bits)
            .read_timeout(self.read_timeout())
            .assert_dtr(self.assert_dtr)
    }
}

/// Loopback test configuration section.
///
/// `port0` and `port1` name two devices wired to each other (TX to RX).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestingConfig {
    pub port0: Option<String>,
    pub port1: Option<String>,
    /// Test baud rate
    pub baud: u32,
}

impl Default for TestingConfig {
    fn default() -> Self {
        Self {
            port0: None,
            port1: None,
            baud: 115200,
        }
    }
}

impl TestingConfig {
    /// Both ends of the loopback pair, if configured.
    pub fn loopback_pair(&self) -> Option<(&str, &str)> {
        Some((self.port0.as_deref()?, self.port1.as_deref()?))
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    Pretty,
    /// Compact format
    #[default]
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.default_baud, 115200);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.testing.loopback_pair().is_none());
    }

    #[test]
    fn test_port_alias_resolution() {
        let mut config = SerialConfig::default();
        config
            .port_aliases
            .insert("arduino".to_string(), "/dev/ttyACM0".to_string());

        assert_eq!(config.resolve_port("arduino"), "/dev/ttyACM0");
        assert_eq!(config.resolve_port("COM5"), "COM5");
    }

    #[test]
    fn test_port_config_from_defaults() {
        let mut config = SerialConfig {
            default_baud: 9600,
            parity: Parity::Even,
            read_timeout_ms: 250,
            ..Default::default()
        };
        config
            .port_aliases
            .insert("gps".to_string(), "/dev/ttyUSB1".to_string());

        let port = config.port_config("gps");
        assert_eq!(port.name, "/dev/ttyUSB1");
        assert_eq!(port.baud, 9600);
        assert_eq!(port.parity, Parity::Even);
        assert_eq!(port.read_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[serial]"));
        assert!(toml_str.contains("[logging]"));
        assert!(toml_str.contains("stop_bits = \"1\""));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [serial]
            default_baud = 9600
            parity = "odd"
            stop_bits = "2"

            [testing]
            port0 = "/dev/ttyUSB0"
            port1 = "/dev/ttyUSB1"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.serial.default_baud, 9600);
        assert_eq!(config.serial.parity, Parity::Odd);
        assert_eq!(config.serial.stop_bits, StopBits::Two);
        assert_eq!(
            config.testing.loopback_pair(),
            Some(("/dev/ttyUSB0", "/dev/ttyUSB1"))
        );
        // Defaults should still work
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.logging.level, "warn");
    }
}
