//! CLI command implementations.

pub mod channels;
pub mod config;
pub mod run;

pub use channels::run_channels;
pub use config::run_config;
pub use run::run_host;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use switchboard_channels::{ChannelRegistry, MemoryChannel, TelegramChannel};
use switchboard_core::config::{Config, ConfigError};
use switchboard_core::logging::Logger;

/// Load the config at `path`, falling back to defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        Config::load(path)
    } else {
        Ok(Config::default())
    }
}

/// Channels built from configuration.
pub struct Host {
    /// Every configured channel.
    pub registry: ChannelRegistry,
    /// The memory channel, kept typed so stdin lines can be injected into it.
    pub memory: Option<Arc<MemoryChannel>>,
}

/// Build every enabled channel, each with its own component logger.
pub fn build_host(config: &Config) -> Result<Host> {
    let mut registry = ChannelRegistry::new();
    let mut memory = None;

    if let Some(memory_config) = &config.channels.memory {
        let channel = Arc::new(
            MemoryChannel::from_config(memory_config)
                .with_logger(Logger::new(memory_config.name.as_str())),
        );
        if registry.register(channel.clone()).is_some() {
            bail!("Duplicate channel name '{}'", memory_config.name);
        }
        memory = Some(channel);
    }

    if let Some(telegram_config) = config.channels.telegram.as_ref().filter(|t| t.enabled) {
        let channel = TelegramChannel::from_config(telegram_config)
            .context("Failed to set up Telegram channel")?
            .with_logger(Logger::new("telegram"));
        if registry.register(Arc::new(channel)).is_some() {
            bail!("Duplicate channel name 'telegram'");
        }
    }

    Ok(Host { registry, memory })
}
