//! appgridd — the AppGrid host daemon.
//!
//! # Usage
//!
//! ```text
//! appgridd run --config /etc/appgrid/appgridd.toml
//! appgridd check-config --config /etc/appgrid/appgridd.toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

const DEFAULT_CONFIG: &str = "/etc/appgrid/appgridd.toml";

#[derive(Parser)]
#[command(name = "appgridd", about = "AppGrid host daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon in the foreground.
    Run {
        /// Config file; defaults apply when it does not exist.
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Control socket path (overrides the config file).
        #[arg(long)]
        socket: Option<PathBuf>,

        /// Data directory (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Validate the config and print the effective settings.
    CheckConfig {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,appgridd=debug,appgrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            socket,
            data_dir,
        } => {
            let config = appgridd::load_config(&config, socket, data_dir)?;
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                shutdown_signal().await;
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            });
            appgridd::run(config, shutdown_rx).await
        }
        Command::CheckConfig { config } => {
            let config = appgridd::load_config(&config, None, None)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.expect("failed to install CTRL+C handler"),
        _ = terminate.recv() => {}
    }
}
