//! Tavola notification daemon - delivers order invoices over the messaging channel.

mod app;
mod control;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use notifyd_core::{init_logging, Config, Paths};

/// Tavola notification daemon command-line interface.
#[derive(Parser)]
#[command(name = "tavola-notifyd")]
#[command(about = "Tavola daemon for order invoice notifications")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log filter directive, e.g. info or debug
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (socket, config, invoice archive). Defaults to ~/.tavola
    #[arg(long, global = true, env = "TAVOLA_BASE_DIR")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon in the foreground
    Start {
        /// Channel address that receives every order notification
        #[arg(long)]
        admin_address: Option<String>,

        /// WebSocket URL of the channel gateway sidecar
        #[arg(long)]
        gateway_url: Option<String>,

        /// Base URL of the main application's internal API
        #[arg(long)]
        app_url: Option<String>,
    },
    /// Ask a running daemon to shut down
    Stop,
    /// Report whether the daemon is up, and what it is doing
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    init_logging(&config.log_level);

    match cli.command {
        Some(Commands::Start {
            admin_address,
            gateway_url,
            app_url,
        }) => {
            if let Some(address) = admin_address {
                config.admin_address = address;
            }
            if let Some(url) = gateway_url {
                config.gateway_url = url;
            }
            if let Some(url) = app_url {
                config.app_base_url = url;
            }
            app::run_daemon(config, paths).await?;
        }
        None => {
            // Default to starting in the foreground when no command is given.
            app::run_daemon(config, paths).await?;
        }
        Some(Commands::Stop) => {
            app::stop_daemon(&paths).await?;
        }
        Some(Commands::Status) => {
            app::show_status(&paths).await?;
        }
    }

    Ok(())
}
