//! Configuration loading and validation.
//!
//! Config is JSON5. Default location: `~/.switchboard/switchboard.json`,
//! overridable with `SWITCHBOARD_STATE_DIR`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::validation::{limits, telegram_bot_id};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Channel configurations.
    #[serde(default)]
    pub channels: ChannelsConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let size = std::fs::metadata(path)?.len();
        if size > limits::MAX_CONFIG_FILE_SIZE as u64 {
            return Err(ConfigError::Validation(format!(
                "Config file is {size} bytes, limit is {}",
                limits::MAX_CONFIG_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a JSON5 string.
    ///
    /// # Errors
    ///
    /// Returns error if the content cannot be parsed or fails validation.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("switchboard.json")
    }

    /// Get the Switchboard state directory.
    ///
    /// Uses `SWITCHBOARD_STATE_DIR` env var if set, otherwise `~/.switchboard`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("SWITCHBOARD_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".switchboard")
        } else {
            PathBuf::from(".switchboard")
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` or `ConfigError::MissingField`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.validate()?;

        if let Some(memory) = &self.channels.memory {
            if memory.name.is_empty() || memory.name.contains(':') {
                return Err(ConfigError::Validation(format!(
                    "Memory channel name '{}' must be non-empty and contain no ':'",
                    memory.name
                )));
            }
            if memory.name == TELEGRAM_CHANNEL_NAME {
                return Err(ConfigError::Validation(format!(
                    "Memory channel name '{TELEGRAM_CHANNEL_NAME}' is taken by the Telegram channel"
                )));
            }
            if memory.account.contains(':') {
                return Err(ConfigError::Validation(format!(
                    "Memory channel account '{}' must not contain ':'",
                    memory.account
                )));
            }
        }

        if let Some(telegram) = &self.channels.telegram {
            if telegram.enabled {
                let token = telegram
                    .bot_token
                    .as_deref()
                    .ok_or_else(|| ConfigError::MissingField("channels.telegram.botToken".into()))?;
                if telegram_bot_id(token).is_none() {
                    return Err(ConfigError::Validation(
                        "Telegram bot token must have the form <bot_id>:<secret>".to_string(),
                    ));
                }
            }
            if telegram.poll_timeout_secs > MAX_TELEGRAM_POLL_TIMEOUT {
                return Err(ConfigError::Validation(format!(
                    "Telegram poll timeout cannot exceed {MAX_TELEGRAM_POLL_TIMEOUT}s"
                )));
            }
        }

        Ok(())
    }
}

/// Name the Telegram channel registers under.
const TELEGRAM_CHANNEL_NAME: &str = "telegram";

/// Longest long-poll timeout Telegram honours.
const MAX_TELEGRAM_POLL_TIMEOUT: u64 = 50;

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Default level: trace, debug, info, warn, error or off.
    #[serde(default = "default_level")]
    pub level: String,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,

    /// Per-component level overrides, keyed by component name.
    #[serde(default)]
    pub components: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            components: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !is_level(&self.level) {
            return Err(ConfigError::Validation(format!(
                "Unknown log level '{}'",
                self.level
            )));
        }

        for (component, level) in &self.components {
            if !is_level(level) {
                return Err(ConfigError::Validation(format!(
                    "Unknown log level '{level}' for component '{component}'"
                )));
            }
        }

        Ok(())
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn is_level(level: &str) -> bool {
    matches!(
        level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    )
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}

/// Channel configurations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    /// In-process memory channel config.
    #[serde(default)]
    pub memory: Option<MemoryConfig>,

    /// Telegram channel config.
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

/// In-process memory channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryConfig {
    /// Channel name.
    #[serde(default = "default_memory_name")]
    pub name: String,

    /// Account ID used in session keys.
    #[serde(default = "default_memory_account")]
    pub account: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            name: default_memory_name(),
            account: default_memory_account(),
        }
    }
}

fn default_memory_name() -> String {
    "memory".to_string()
}

fn default_memory_account() -> String {
    "local".to_string()
}

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    /// Whether the channel is started by the host.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bot token.
    pub bot_token: Option<String>,

    /// Bot API base URL override.
    #[serde(default)]
    pub api_base: Option<String>,

    /// Long-poll timeout for `getUpdates`, in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: None,
            api_base: None,
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_poll_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.channels.memory.is_none());
        assert!(config.channels.telegram.is_none());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("switchboard.json");

        let mut config = Config::default();
        config.channels.memory = Some(MemoryConfig {
            name: "test".to_string(),
            ..Default::default()
        });
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.channels.memory.unwrap().name, "test");
    }

    #[test]
    fn test_json5_parsing() {
        let config = Config::parse(
            r#"{
            // comments are fine
            logging: {
                level: "debug",
                format: "json",
                components: { telegram: "trace" },
            },
            channels: {
                memory: {},
                telegram: {
                    botToken: "123:abc",
                    pollTimeoutSecs: 10,
                },
            },
        }"#,
        )
        .unwrap();

        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.components["telegram"], "trace");
        assert_eq!(config.channels.memory.unwrap().account, "local");
        let telegram = config.channels.telegram.unwrap();
        assert!(telegram.enabled);
        assert_eq!(telegram.poll_timeout_secs, 10);
    }

    #[test]
    fn test_telegram_requires_token() {
        let result = Config::parse("{ channels: { telegram: {} } }");
        assert!(matches!(result, Err(ConfigError::MissingField(_))));

        // Disabled channels may omit the token
        assert!(Config::parse("{ channels: { telegram: { enabled: false } } }").is_ok());
    }

    #[test]
    fn test_telegram_token_shape() {
        for token in ["nocolon", "abc:secret", ":secret"] {
            let result = Config::parse(&format!(
                r#"{{ channels: {{ telegram: {{ botToken: "{token}" }} }} }}"#
            ));
            assert!(matches!(result, Err(ConfigError::Validation(_))), "{token}");
        }

        assert!(Config::parse(r#"{ channels: { telegram: { botToken: "42:secret" } } }"#).is_ok());
    }

    #[test]
    fn test_unknown_log_level() {
        let result = Config::parse(r#"{ logging: { level: "loud" } }"#);
        assert!(matches!(result, Err(ConfigError::Validation(_))));

        let result = Config::parse(r#"{ logging: { components: { memory: "chatty" } } }"#);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_memory_name_validation() {
        let result = Config::parse(r#"{ channels: { memory: { name: "a:b" } } }"#);
        assert!(result.is_err());

        let result = Config::parse(r#"{ channels: { memory: { name: "telegram" } } }"#);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_state_dir() {
        let dir = Config::state_dir();
        assert!(dir.to_str().unwrap().contains("switchboard"));
    }
}
