//! Channels command - list configured channels and probe them.

use anyhow::Result;
use switchboard_core::config::Config;

use super::build_host;
use crate::ui::{self, HealthStatus};

/// Channels command arguments.
#[derive(Debug, Clone, Default)]
pub struct ChannelsArgs {
    /// Probe channels for connectivity.
    pub probe: bool,
}

/// Run the channels command.
pub async fn run_channels(config: &Config, args: ChannelsArgs) -> Result<()> {
    let host = build_host(config)?;
    ui::header("Channels");

    if host.registry.is_empty() {
        ui::warning("No channels configured");
        ui::info("Add a 'channels' section to switchboard.json");
        return Ok(());
    }

    if !args.probe {
        for channel in host.registry.iter() {
            let caps = channel.capabilities();
            let limit = caps
                .text_chunk_limit
                .map_or_else(|| "none".to_string(), |l| l.to_string());
            ui::table_row(&[(channel.name(), 12), (channel.label(), 12), (limit.as_str(), 8)]);
        }
        return Ok(());
    }

    for (name, probe) in host.registry.probe_all().await {
        match probe {
            Ok(p) if p.error.is_none() => {
                let detail = p.display_name.or(p.account_id).unwrap_or_default();
                ui::health_check(&name, HealthStatus::Ok, Some(&detail));
            }
            Ok(p) => {
                let detail = p.error.unwrap_or_default();
                ui::health_check(&name, HealthStatus::Error, Some(&detail));
            }
            Err(e) => ui::health_check(&name, HealthStatus::Error, Some(&e.to_string())),
        }
    }

    Ok(())
}
