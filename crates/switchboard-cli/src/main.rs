//! Switchboard CLI - run and inspect messaging channels.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Switchboard - messaging channels behind one contract")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.switchboard/switchboard.json)
    #[arg(short, long, global = true, env = "SWITCHBOARD_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured channels
    Channels {
        /// Probe channels for connectivity
        #[arg(long)]
        probe: bool,
    },

    /// Connect all configured channels and log inbound messages
    Run {
        /// Reply to every inbound message with its own text
        #[arg(long)]
        echo: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show full configuration
    Show,

    /// Validate configuration
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(switchboard_core::Config::default_path);

    // Logging comes from the config when it loads; `config validate` reports
    // the failure itself.
    let loaded = commands::load_config(&config_path);
    let mut logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    switchboard_core::logging::init(&logging)?;

    match cli.command {
        Commands::Channels { probe } => {
            let args = commands::channels::ChannelsArgs { probe };
            commands::run_channels(&loaded?, args).await?;
        }

        Commands::Run { echo } => {
            let args = commands::run::RunArgs { echo };
            commands::run_host(&loaded?, args).await?;
        }

        Commands::Config { action } => {
            let args = commands::config::ConfigArgs {
                path: config_path,
                validate: matches!(action, Some(ConfigCommands::Validate)),
            };
            commands::run_config(&args)?;
        }
    }

    Ok(())
}
