//! # Configuration Management
//!
//! Configuration for the game server and its logging, plus the protocol
//! constants fixed by the client.
//!
//! ## Configuration Sources
//! - TOML files via [`NetworkConfig::from_file`]
//! - TOML strings via [`NetworkConfig::from_toml`]
//! - Environment variables via [`NetworkConfig::from_env`] (`GAME_PROTOCOL_*`)
//! - Direct instantiation with defaults
//!
//! Every section and field may be omitted from a TOML file; missing values take
//! their defaults. Durations are written in milliseconds.
//!
//! ```toml
//! [server]
//! address = "0.0.0.0:43594"
//! max_players = 2000
//! cycle_interval = 600
//! opcode_cipher = "isaac"
//!
//! [logging]
//! log_level = "debug"
//! ```

use crate::core::isaac::CipherKind;
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Values fixed by the client build this server speaks to.
pub mod constants {
    /// Client revision accepted in the login block.
    pub const PROTOCOL_VERSION: u16 = 317;
    /// First byte of the login block.
    pub const LOGIN_MAGIC: u8 = 255;
    /// Request byte opening a new session.
    pub const REQUEST_NEW_SESSION: u8 = 14;
    /// Request byte of a fresh login.
    pub const REQUEST_LOGIN: u8 = 16;
    /// Request byte of a reconnecting login.
    pub const REQUEST_RECONNECT: u8 = 18;
    /// Opcode heading the (unencrypted) RSA part of the login block.
    pub const RSA_BLOCK_OPCODE: u8 = 10;
    /// Default game port.
    pub const PORT: u16 = 43594;
}

/// Length of one game cycle.
pub const CYCLE_INTERVAL: Duration = Duration::from_millis(600);

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Game server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override fields from `GAME_PROTOCOL_*` environment variables.
    ///
    /// Unparseable numbers are an error rather than silently ignored.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("GAME_PROTOCOL_SERVER_ADDRESS") {
            self.server.address = addr;
        }

        if let Some(val) = env_parse::<usize>("GAME_PROTOCOL_MAX_PLAYERS")? {
            self.server.max_players = val;
        }

        if let Some(val) = env_parse::<u64>("GAME_PROTOCOL_CYCLE_MS")? {
            self.server.cycle_interval = Duration::from_millis(val);
        }

        if let Some(val) = env_parse::<u64>("GAME_PROTOCOL_IDLE_TIMEOUT_MS")? {
            self.server.idle_timeout = Duration::from_millis(val);
        }

        if let Ok(cipher) = std::env::var("GAME_PROTOCOL_OPCODE_CIPHER") {
            self.server.opcode_cipher = match cipher.to_ascii_lowercase().as_str() {
                "isaac" => CipherKind::Isaac,
                "none" => CipherKind::None,
                other => {
                    return Err(ProtocolError::ConfigError(format!(
                        "Invalid GAME_PROTOCOL_OPCODE_CIPHER: '{other}' (expected 'isaac' or 'none')"
                    )))
                }
            };
        }

        if let Ok(level) = std::env::var("GAME_PROTOCOL_LOG_LEVEL") {
            self.logging.log_level = level
                .parse::<Level>()
                .map_err(|_| ProtocolError::ConfigError(format!("Invalid log level: {level}")))?;
        }

        Ok(())
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ProtocolError::ConfigError(format!("Invalid value for {key}: '{raw}'"))),
        Err(_) => Ok(None),
    }
}

/// Game server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:43594")
    pub address: String,

    /// Number of player slots
    pub max_players: usize,

    /// Length of one game cycle
    #[serde(with = "duration_serde")]
    pub cycle_interval: Duration,

    /// A slot that has not received a byte for this long is evicted
    #[serde(with = "duration_serde")]
    pub idle_timeout: Duration,

    /// Maximum bytes taken from the socket per read
    pub read_budget: usize,

    /// Initial capacity of each connection's inbound buffer
    pub inbound_capacity: usize,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Cipher applied to packet opcodes
    pub opcode_cipher: CipherKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: format!("0.0.0.0:{}", constants::PORT),
            max_players: 2000,
            cycle_interval: CYCLE_INTERVAL,
            idle_timeout: Duration::from_secs(60),
            read_budget: 8192,
            inbound_capacity: 512,
            shutdown_timeout: Duration::from_secs(5),
            opcode_cipher: CipherKind::Isaac,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:43594')",
                self.address
            ));
        }

        if self.max_players == 0 {
            errors.push("Max players must be greater than 0".to_string());
        } else if self.max_players > 32_767 {
            errors.push(format!(
                "Max players too large: {} (player indices must fit the client's 15-bit range)",
                self.max_players
            ));
        }

        if self.cycle_interval.as_millis() < 50 {
            errors.push("Cycle interval too short (minimum: 50ms)".to_string());
        } else if self.cycle_interval.as_secs() > 10 {
            errors.push("Cycle interval too long (maximum: 10s)".to_string());
        }

        if self.idle_timeout <= self.cycle_interval {
            errors.push("Idle timeout must be longer than the cycle interval".to_string());
        }

        if self.read_budget == 0 {
            errors.push("Read budget must be greater than 0".to_string());
        }

        if self.inbound_capacity < 64 {
            errors.push("Inbound capacity too small (minimum: 64 bytes)".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("game-server"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NetworkConfig::default();
        assert!(config.validate().is_empty(), "{:?}", config.validate());
        assert_eq!(config.server.address, "0.0.0.0:43594");
        assert_eq!(config.server.cycle_interval, Duration::from_millis(600));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NetworkConfig::from_toml(
            "[server]\nmax_players = 10\nopcode_cipher = \"none\"\n[logging]\nlog_level = \"debug\"\n",
        )
        .unwrap();
        assert_eq!(config.server.max_players, 10);
        assert_eq!(config.server.opcode_cipher, CipherKind::None);
        assert_eq!(config.server.read_budget, 8192);
        assert_eq!(config.logging.log_level, Level::DEBUG);
    }

    #[test]
    fn test_example_config_parses_back() {
        let text = NetworkConfig::example_config();
        let config = NetworkConfig::from_toml(&text).unwrap();
        assert_eq!(config.server.max_players, 2000);
    }
}
