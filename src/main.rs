//! Chat Relay Server - Entry Point
//!
//! Starts the TCP listener, the ChatServer actor and the operator
//! console, then accepts connections until shutdown.

use clap::Parser;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::{admin, Acceptor, ChatServer, ServerConfig};

/// Channel buffer size for server commands
const CHANNEL_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let config = ServerConfig::parse();

    // Start TCP listener
    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!("Chat Relay listening on {}", listener.local_addr()?);
    info!("Type 'shutdown' to stop the server");

    // Create ChatServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let (server, running) = ChatServer::new(cmd_rx);
    let server_task = tokio::spawn(server.run());

    // Operator console on stdin
    let admin_tx = cmd_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = admin::run(BufReader::new(tokio::io::stdin()), admin_tx).await {
            error!("Admin console error: {}", e);
        }
    });

    Acceptor::new(listener, cmd_tx, running).run().await;

    server_task.await?;
    info!("Server shut down successfully");

    Ok(())
}
