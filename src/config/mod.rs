//! Configuration module for serial-comms.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_COMMS_CONFIG` environment variable (explicit path)
//! 2. `./serial-comms.toml` (current directory)
//! 3. `~/.config/serial-comms/serial-comms.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\serial-comms\serial-comms.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Any configuration value can be overridden via environment variables.
//! The pattern is: `SERIAL_COMMS_<SECTION>_<KEY>`
//!
//! Examples:
//! - `SERIAL_COMMS_SERIAL_DEVICE=/dev/ttyUSB0`
//! - `SERIAL_COMMS_SERIAL_BAUD_RATE=115200`
//! - `SERIAL_COMMS_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_comms_handler::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Device: {:?}", config.serial.device);
//! println!("Baud rate: {}", config.serial.baud_rate);
//! # Ok::<(), serial_comms_handler::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{resolve_config_path, ConfigLoader};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig};
