//! Run command - host configured channels until Ctrl-C.
//!
//! Every inbound message is logged. With `--echo` the host replies on the
//! same session with the same text. When a memory channel is configured,
//! lines typed on stdin are injected into it as messages from peer `stdin`.

use std::sync::Arc;

use anyhow::{Result, bail};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use switchboard_channels::{Channel, ChannelRegistry, MemoryChannel};
use switchboard_core::config::Config;
use switchboard_core::types::{InboundMessage, OutboundMessage};

use super::build_host;
use crate::ui;

/// Run command arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunArgs {
    /// Reply to each inbound message with its own text.
    pub echo: bool,
}

/// Run the host.
pub async fn run_host(config: &Config, args: RunArgs) -> Result<()> {
    let host = build_host(config)?;
    if host.registry.is_empty() {
        bail!("No channels configured");
    }

    for channel in host.registry.iter() {
        channel.on_message(inbound_handler(Arc::clone(channel), args.echo));
    }

    if !connect(&host.registry).await {
        bail!("No channel could connect");
    }

    if let Some(memory) = host.memory {
        ui::info(&format!("Type a line to send it through '{}'", memory.name()));
        tokio::spawn(feed_stdin(memory));
    }

    ui::info("Press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    println!();

    for (name, result) in host.registry.disconnect_all().await {
        if let Err(e) = result {
            ui::warning(&format!("{name}: {e}"));
        }
    }
    ui::success("Stopped");

    Ok(())
}

/// Connect everything; true when at least one channel came up.
async fn connect(registry: &ChannelRegistry) -> bool {
    let mut any = false;
    for (name, result) in registry.connect_all().await {
        match result {
            Ok(()) => {
                ui::success(&format!("{name} connected"));
                any = true;
            }
            Err(e) => ui::error(&format!("{name}: {e}")),
        }
    }
    any
}

fn inbound_handler(
    channel: Arc<dyn Channel>,
    echo: bool,
) -> Arc<dyn switchboard_channels::MessageHandler> {
    Arc::new(move |message: InboundMessage| {
        let channel = Arc::clone(&channel);
        async move {
            tracing::info!(
                channel = %message.channel,
                session = %message.session_key,
                peer = %message.peer_id,
                attachments = message.attachments.len(),
                "{}",
                message.content
            );

            if echo && !message.content.is_empty() {
                let reply = OutboundMessage::text(message.content.clone()).with_reply_to(message.id);
                if let Err(e) = channel.send(&message.session_key, reply).await {
                    tracing::warn!(channel = %message.channel, error = %e, "echo failed");
                }
            }
        }
    })
}

async fn feed_stdin(memory: Arc<MemoryChannel>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let raw = json!({ "peer_id": "stdin", "text": line });
        if let Err(e) = memory.inject(raw).await {
            tracing::warn!(error = %e, "stdin message rejected");
        }
    }
}
