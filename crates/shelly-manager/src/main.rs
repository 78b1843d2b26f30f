//! Shelly Manager - Main entry point
//!
//! Discovers Shelly devices on the local network and records them in a
//! YAML device registry.

mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use shelly_discovery::DiscoverySession;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "shelly-manager")]
#[command(about = "Discover Shelly devices and keep a registry of them")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "shelly-manager.toml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Browse for devices and register them until interrupted (Ctrl-C)
    Discover {
        /// Device registry file (overrides the configuration file)
        #[arg(long)]
        devices: Option<PathBuf>,
    },
}

fn log_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(&cli.log_level))
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Shelly Manager v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&cli.config)?;

    match cli.command {
        Command::Discover { devices } => {
            if let Some(devices) = devices {
                config.registry.path = devices;
            }

            info!(
                registry = %config.registry.path.display(),
                service_type = %config.discovery.service_type,
                "Starting discovery"
            );

            let mut session = DiscoverySession::new(config.to_session_config());
            session.run().await?;
        }
    }

    Ok(())
}
