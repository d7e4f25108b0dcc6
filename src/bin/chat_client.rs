//! Chat Relay Client - Entry Point
//!
//! Connects to a chat_relay server, prints incoming events and sends
//! typed lines.

use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

use chat_relay::client::{receive_events, LOCAL_HELP};
use chat_relay::message::timestamp;
use chat_relay::{AppError, ClientConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=warn")),
        )
        .init();

    let config = ClientConfig::parse();

    println!("[{}] Connecting to {}...", timestamp(), config.server_addr());
    let stream = match TcpStream::connect(config.server_addr()).await {
        Ok(stream) => stream,
        Err(e) => {
            println!("[{}] Failed to connect to server: {}", timestamp(), e);
            return Ok(());
        }
    };

    let (read_half, mut write_half) = stream.into_split();

    let mut receiver = tokio::spawn(async move {
        match receive_events(BufReader::new(read_half), |line| println!("{}", line)).await {
            Err(AppError::ConnectionLost) => println!("[{}] Connection lost", timestamp()),
            Err(e) => println!("[{}] Receive error: {}", timestamp(), e),
            Ok(()) => {}
        }
    });

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    // Username; the server may hang up while we wait for input
    let connected = loop {
        println!("Enter your username:");
        let line = tokio::select! {
            line = input.next_line() => line?,
            _ = &mut receiver => break false,
        };
        let Some(line) = line else {
            return Ok(());
        };
        let username = line.trim();
        if username.is_empty() {
            println!("Username cannot be empty");
            continue;
        }
        send_line(&mut write_half, username).await?;
        println!("[{}] Connected as '{}'", timestamp(), username);
        println!("Type /help for commands\n");
        break true;
    };

    if connected {
        loop {
            tokio::select! {
                line = input.next_line() => {
                    let Some(line) = line? else {
                        println!("\nDisconnecting...");
                        break;
                    };
                    let message = line.trim();
                    if message.is_empty() {
                        continue;
                    }

                    if message.eq_ignore_ascii_case("/help") {
                        println!("{}", LOCAL_HELP);
                        continue;
                    }

                    if let Err(e) = send_line(&mut write_half, message).await {
                        println!("[{}] Send error: {}", timestamp(), e);
                        break;
                    }

                    if message.eq_ignore_ascii_case("/quit") {
                        // Give the server time to answer
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    println!("\nDisconnecting...");
                    let _ = send_line(&mut write_half, "/quit").await;
                    break;
                }
                _ = &mut receiver => break,
            }
        }
    }

    let _ = write_half.shutdown().await;
    println!("[{}] Disconnected from server", timestamp());

    // Stdin reads cannot be cancelled; leave without waiting on them
    std::process::exit(0);
}

async fn send_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
