//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_COMMS";

/// Config file name
const CONFIG_FILE_NAME: &str = "serial-comms.toml";

/// Application directory under the platform config directory
const APP_DIR_NAME: &str = "serial-comms";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_COMMS_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIAL_COMMS_CONFIG` environment variable (explicit path)
    /// 2. `./serial-comms.toml` (current directory)
    /// 3. `~/.config/serial-comms/serial-comms.toml` (XDG on Linux/macOS)
    /// 4. `%APPDATA%\serial-comms\serial-comms.toml` (Windows)
    /// 5. Built-in defaults (no file required)
    ///
    /// Environment variables override any config file values, and the result
    /// is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        if apply_env_overrides(&mut config).is_err() || config.validate().is_err() {
            config = Config::default();
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. XDG config directory (Linux/macOS) or APPDATA (Windows)
    if let Some(config_dir) = get_config_dir() {
        let app_config = config_dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME);
        if app_config.exists() {
            return Some(app_config);
        }
    }

    // 4. No config file found - will use defaults
    None
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

fn env_var(key: &str) -> Option<(String, String)> {
    let var = format!("{}_{}", ENV_PREFIX, key);
    std::env::var(&var).ok().map(|val| (var, val))
}

fn parse_env<T: FromStr>(var: &str, val: &str, what: &str) -> ConfigResult<T> {
    val.trim()
        .parse()
        .map_err(|_| ConfigError::env_parse(var, format!("Invalid {}", what)))
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `SERIAL_COMMS_<SECTION>_<KEY>`
/// For example:
/// - `SERIAL_COMMS_SERIAL_DEVICE=/dev/ttyUSB0`
/// - `SERIAL_COMMS_SERIAL_BAUD_RATE=115200`
/// - `SERIAL_COMMS_LOGGING_FORMAT=json`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Serial overrides
    if let Some((_, val)) = env_var("SERIAL_DEVICE") {
        config.serial.device = Some(val);
    }
    if let Some((var, val)) = env_var("SERIAL_BAUD_RATE") {
        config.serial.baud_rate = parse_env(&var, &val, "baud rate")?;
    }
    if let Some((var, val)) = env_var("SERIAL_READ_TIMEOUT_MS") {
        config.serial.read_timeout_ms = parse_env(&var, &val, "timeout")?;
    }
    if let Some((var, val)) = env_var("SERIAL_RX_BUFFER_SIZE") {
        config.serial.rx_buffer_size = parse_env(&var, &val, "buffer size")?;
    }

    // Logging overrides
    if let Some((_, val)) = env_var("LOGGING_LEVEL") {
        config.logging.level = val;
    }
    if let Some((var, val)) = env_var("LOGGING_FORMAT") {
        config.logging.format = match val.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => {
                return Err(ConfigError::env_parse(
                    var,
                    "Expected one of: json, pretty, compact",
                ))
            }
        };
    }

    Ok(())
}
