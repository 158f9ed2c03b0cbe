//! murmur relay server

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, warn};

use murmur_server::{RelayServer, ServerConfig};
use murmur_utils::{config, init_logging_with_config, server_config_file, LogConfig, Result};

#[derive(Parser, Debug)]
#[command(name = "murmur-server")]
#[command(about = "Broadcast chat relay")]
#[command(version)]
struct Cli {
    /// Address to listen on (overrides the config file)
    #[arg(long, env = "MURMUR_LISTEN")]
    listen: Option<String>,

    /// Path to server.toml
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging_with_config(LogConfig::server())?;

    let config_path = cli.config.unwrap_or_else(server_config_file);
    let mut server_config: ServerConfig = config::load_or_default(&config_path);
    if let Some(listen) = cli.listen {
        server_config.listen_addr = listen;
    }

    let server = RelayServer::bind(&server_config).await?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for interrupt: {}", e);
            // keep the sender alive so the relay is not told to stop
            std::future::pending::<()>().await;
        }
        info!("Interrupt received");
        let _ = shutdown_tx.send(());
    });

    server.run(shutdown_rx).await
}
