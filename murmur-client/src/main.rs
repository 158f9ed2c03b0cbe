//! murmur chat client

use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use murmur_client::{
    replay, spawn_line_reader, ChatSession, ClientConfig, ConnectionState, HistoryWriter,
    StdoutHandler, TcpDialer,
};
use murmur_utils::{
    client_config_file, config, init_logging_with_config, LogConfig, MurmurError, Result,
};

#[derive(Parser, Debug)]
#[command(name = "murmur")]
#[command(about = "Chat with everyone on a murmur relay")]
#[command(version)]
struct Cli {
    /// Relay address as host:port (overrides the config file)
    #[arg(long, env = "MURMUR_ADDR")]
    addr: Option<String>,

    /// Path to client.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// History file (overrides the config file)
    #[arg(long)]
    history: Option<PathBuf>,

    /// Do not print the saved history on start
    #[arg(long)]
    no_replay: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging_with_config(LogConfig::client())?;

    let config_path = cli.config.unwrap_or_else(client_config_file);
    let mut client_config: ClientConfig = config::load_or_default(&config_path);
    if let Some(addr) = cli.addr {
        client_config.server_addr = addr;
    }
    if let Some(history) = cli.history {
        client_config.history.path = Some(history);
    }
    if cli.no_replay {
        client_config.history.replay = false;
    }

    if client_config.history.replay {
        replay(&client_config.history.path(), &mut StdoutHandler::new());
    }

    let history = Arc::new(HistoryWriter::open(&client_config.history)?);
    let input = spawn_line_reader(BufReader::new(std::io::stdin()))?;
    let dialer = Arc::new(TcpDialer::new(client_config.server_addr.clone()));

    info!("Connecting to {}", client_config.server_addr);
    let session = ChatSession::start(
        &client_config,
        dialer,
        input,
        Box::new(StdoutHandler::new()),
        Arc::clone(&history),
    )?;
    let handle = session.handle();

    let mut join = tokio::task::spawn_blocking(move || session.join());
    let joined = tokio::select! {
        joined = &mut join => joined,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    info!("Interrupt received");
                    handle.request_exit();
                }
                Err(e) => warn!("Failed to listen for interrupt: {}", e),
            }
            join.await
        }
    };

    let state = joined.map_err(|e| MurmurError::internal(format!("Session task failed: {}", e)))??;
    if state != ConnectionState::Terminated {
        warn!("Session stopped in state {:?}", state);
    }

    history.shutdown()
}
