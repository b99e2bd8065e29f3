//! Config command - show or validate configuration.

use std::path::{Path, PathBuf};

use anyhow::Result;
use switchboard_core::config::Config;

use super::load_config;
use crate::ui;

/// Config command arguments.
#[derive(Debug, Clone)]
pub struct ConfigArgs {
    /// Config file path.
    pub path: PathBuf,
    /// Validate instead of show.
    pub validate: bool,
}

/// Run the config command.
pub fn run_config(args: &ConfigArgs) -> Result<()> {
    if args.validate {
        validate_config(&args.path);
        return Ok(());
    }

    // Default: show full config
    let config = load_config(&args.path)?;
    println!("{}", render_config(&config)?);
    Ok(())
}

/// Pretty JSON with the bot token masked.
fn render_config(config: &Config) -> Result<String> {
    let mut value = serde_json::to_value(config)?;
    if let Some(token) = value.pointer_mut("/channels/telegram/botToken") {
        if !token.is_null() {
            *token = serde_json::Value::String("[REDACTED]".to_string());
        }
    }
    Ok(serde_json::to_string_pretty(&value)?)
}

fn validate_config(path: &Path) {
    ui::header("Validating Configuration");

    if !path.exists() {
        ui::warning(&format!("Config file not found: {}", path.display()));
        ui::info("Defaults will be used");
        return;
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            ui::error(&format!("Cannot read {}: {e}", path.display()));
            return;
        }
    };

    // Check JSON5 syntax
    if let Err(e) = json5::from_str::<serde_json::Value>(&content) {
        ui::error(&format!("Syntax error: {e}"));
        return;
    }
    ui::success("Syntax: Valid JSON5");

    match Config::load(path) {
        Ok(config) => {
            ui::success("Schema: Configuration is valid");
            let count = usize::from(config.channels.memory.is_some())
                + usize::from(config.channels.telegram.as_ref().is_some_and(|t| t.enabled));
            ui::kv("Channels", &count.to_string());
        }
        Err(e) => ui::error(&format!("Schema error: {e}")),
    }
}
