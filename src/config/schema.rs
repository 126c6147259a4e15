//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use super::error::{ConfigError, ConfigResult};
use crate::comms::{HandlerSettings, DEFAULT_READ_TIMEOUT, DEFAULT_RX_BUFFER_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial connection configuration
    pub serial: SerialConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check values that would make the handler unusable.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::validation("serial.baud_rate", "must be non-zero"));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "serial.read_timeout_ms",
                "must be non-zero",
            ));
        }
        if self.serial.rx_buffer_size == 0 {
            return Err(ConfigError::validation(
                "serial.rx_buffer_size",
                "must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Serial connection configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device to connect to (e.g. `/dev/ttyUSB0` or `COM3`)
    pub device: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Receive loop read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Receive buffer capacity in bytes
    pub rx_buffer_size: usize,
    /// Device aliases for convenience
    #[serde(default)]
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: None,
            baud_rate: 57600,
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            rx_buffer_size: DEFAULT_RX_BUFFER_SIZE,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    /// Get the read timeout as Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Resolve a device name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Handler tunables derived from this section.
    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            rx_buffer_size: self.rx_buffer_size,
            read_timeout: self.read_timeout(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter: "trace", "debug", "info", "warn", "error", or a
    /// full `EnvFilter` directive. `RUST_LOG` takes precedence.
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
