//! SOCKS5 over WebSocket bridge server

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use socks_bridge::{BridgeConfig, BridgeServer};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "socks-bridge",
    about = "SOCKS5 over WebSocket bridge",
    version = env!("CARGO_PKG_VERSION"),
    long_about = "Terminates SOCKS5 carried over WebSocket (or raw TCP) and relays it to TCP destinations."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// HTTP/WebSocket listener port
    #[arg(short, long)]
    port: Option<u16>,

    /// Also accept raw SOCKS5 clients on this address
    #[arg(long, value_name = "ADDR")]
    tcp_bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Run the bridge (default)
    Serve,

    /// Print the effective configuration as TOML
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::PrintConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Serve => {
            setup_logging(&config.log_level);
            info!("Starting socks-bridge {}", env!("CARGO_PKG_VERSION"));

            let server = BridgeServer::new(config).context("Failed to create bridge server")?;
            server.start().await.context("Bridge server failed")?;
            Ok(())
        }
    }
}

async fn load_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load_from_file(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => BridgeConfig::default(),
    };

    config.apply_env()?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(tcp_bind) = &cli.tcp_bind {
        config.tcp_bind = Some(tcp_bind.clone());
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn setup_logging(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("socks_bridge={},tower_http=info", level)));

    fmt().with_env_filter(filter).with_target(false).init();
}
