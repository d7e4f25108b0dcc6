//! TCP connection handler
//!
//! Runs one connection through its lifecycle: welcome prompt, username
//! handshake, receive loop, and cleanup. Outbound events for an active
//! session are written by a dedicated writer task that owns the socket's
//! write half, so the server actor never waits on network I/O.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::{write_event, ChatEvent, EventKind, FrameReader};
use crate::router::Command;
use crate::server::{stopped, ServerCommand};
use crate::session::{connection_channel, ConnectionEnds};
use crate::types::ClientId;

/// Prompt sent as soon as a connection is accepted
pub const WELCOME_PROMPT: &str = "Welcome to the chat server! Enter your username:";

/// How long to wait for queued events to reach the peer on close
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long one event may take to reach a peer that stopped reading
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How an active connection ends
enum Teardown {
    /// Let the writer flush what is already queued
    Flush,
    /// The writer is already gone
    WriterEnded,
    /// The server evicted the session; drop the socket now
    Evicted,
}

/// Handle a new TCP connection
///
/// Returns once the connection is closed. Errors are confined to this
/// connection; the caller only logs them.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    mut running: watch::Receiver<bool>,
) -> Result<(), AppError> {
    let remote_addr = stream.peer_addr()?;
    let client_id = ClientId::new();
    debug!("Client {} connected from {}", client_id, remote_addr);

    let (read_half, mut write_half) = stream.into_split();
    let mut frames = FrameReader::new(BufReader::new(read_half));

    write_event(
        &mut write_half,
        &ChatEvent::server(WELCOME_PROMPT, EventKind::System),
    )
    .await?;

    // Handshaking: exactly one line, the candidate username
    let candidate = tokio::select! {
        frame = frames.next_frame() => frame?,
        _ = stopped(&mut running) => None,
    };
    let Some(candidate) = candidate else {
        debug!("Client {} left before choosing a username", client_id);
        return Ok(());
    };
    let username = candidate.trim().to_string();

    let (connection, ends) = connection_channel();
    let ConnectionEnds { events, mut closed } = ends;
    let (reply_tx, reply_rx) = oneshot::channel();

    cmd_tx
        .send(ServerCommand::Register {
            client_id,
            remote_addr,
            username: username.clone(),
            connection,
            reply: reply_tx,
        })
        .await
        .map_err(|_| AppError::ChannelSend)?;

    if let Err(e) = reply_rx.await.map_err(|_| AppError::ChannelSend)? {
        debug!("Client {} rejected: {}", client_id, e);
        write_event(&mut write_half, &e.into()).await?;
        let _ = write_half.shutdown().await;
        return Ok(());
    }

    // Active
    let mut writer = tokio::spawn(write_loop(write_half, events, WRITE_TIMEOUT));

    let teardown = tokio::select! {
        result = read_loop(&mut frames, client_id, &cmd_tx) => {
            match result {
                Ok(()) => debug!("{} quit", username),
                Err(AppError::ConnectionLost) => debug!("{} closed the connection", username),
                Err(e) => warn!("Connection error for {}: {}", username, e),
            }
            Teardown::Flush
        }
        _ = &mut writer => {
            debug!("Writer for {} ended", username);
            Teardown::WriterEnded
        }
        signal = &mut closed => match signal {
            Ok(()) => {
                debug!("{} was evicted", username);
                Teardown::Evicted
            }
            // Session dropped without eviction, e.g. on shutdown
            Err(_) => Teardown::Flush,
        },
        _ = stopped(&mut running) => {
            debug!("Shutdown observed by {}", username);
            Teardown::Flush
        }
    };

    // Closing
    let _ = cmd_tx
        .send(ServerCommand::Disconnect {
            client_id,
            username: username.clone(),
        })
        .await;

    match teardown {
        Teardown::Flush => {
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut writer).await.is_err() {
                warn!("Timed out flushing events to {}", username);
                writer.abort();
            }
        }
        Teardown::WriterEnded => {}
        Teardown::Evicted => writer.abort(),
    }

    info!("Connection for {} closed", username);
    Ok(())
}

/// Forward inbound lines to the server until the peer leaves
///
/// Returns `Ok` after `/quit`, `ConnectionLost` when the peer closes.
async fn read_loop<R>(
    frames: &mut FrameReader<R>,
    client_id: ClientId,
    cmd_tx: &mpsc::Sender<ServerCommand>,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(frame) = frames.next_frame().await? {
        let text = frame.trim();
        if text.is_empty() {
            continue;
        }

        let quit = Command::is_quit(text);

        cmd_tx
            .send(ServerCommand::Input {
                client_id,
                text: text.to_string(),
            })
            .await
            .map_err(|_| AppError::ChannelSend)?;

        if quit {
            return Ok(());
        }
    }

    Err(AppError::ConnectionLost)
}

/// Write queued events until the session is dropped or the socket fails
///
/// A peer that accepts nothing for `write_timeout` is cut off; the queue
/// closes with the writer, so the session becomes unreachable.
async fn write_loop<W>(
    mut writer: W,
    mut events: mpsc::UnboundedReceiver<ChatEvent>,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = events.recv().await {
        match tokio::time::timeout(write_timeout, write_event(&mut writer, &event)).await {
            Ok(Ok(())) => {}
            Ok(Err(AppError::Json(e))) => {
                error!("Failed to serialize event: {}", e);
                // Continue - don't break on serialization errors
                continue;
            }
            Ok(Err(e)) => {
                debug!("Socket write failed, ending writer: {}", e);
                break;
            }
            Err(_) => {
                warn!("Peer stopped reading for {:?}, ending writer", write_timeout);
                return;
            }
        }
    }

    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_loop_forwards_until_quit() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let client_id = ClientId::new();
        let mut input = FrameReader::new(&b"hello\n\n   \n/quit\nafter quit\n"[..]);

        let result = read_loop(&mut input, client_id, &cmd_tx).await;
        assert!(result.is_ok());

        let mut texts = Vec::new();
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                ServerCommand::Input { text, .. } => texts.push(text),
                other => panic!("unexpected command {:?}", other),
            }
        }
        assert_eq!(texts, vec!["hello", "/quit"]);
    }

    #[tokio::test]
    async fn test_read_loop_reports_connection_lost() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(16);
        let mut input = FrameReader::new(&b"hello\n"[..]);

        let result = read_loop(&mut input, ClientId::new(), &cmd_tx).await;
        assert!(matches!(result, Err(AppError::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_read_loop_server_gone() {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        drop(cmd_rx);
        let mut input = FrameReader::new(&b"hello\n"[..]);

        let result = read_loop(&mut input, ClientId::new(), &cmd_tx).await;
        assert!(matches!(result, Err(AppError::ChannelSend)));
    }

    #[tokio::test]
    async fn test_write_loop_flushes_then_closes() {
        let (near, far) = tokio::io::duplex(4096);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ChatEvent::server("one", EventKind::System)).unwrap();
        tx.send(ChatEvent::new("Bob", "two", EventKind::Message)).unwrap();
        drop(tx);

        write_loop(near, rx, WRITE_TIMEOUT).await;

        let mut frames = FrameReader::new(BufReader::new(far));
        let mut messages = Vec::new();
        while let Some(frame) = frames.next_frame().await.unwrap() {
            messages.push(crate::message::decode(frame.as_bytes()).unwrap().message);
        }
        assert_eq!(messages, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_write_loop_gives_up_on_stalled_peer() {
        // Nobody reads `_far`, so the pipe fills up
        let (near, _far) = tokio::io::duplex(64);
        let (tx, rx) = mpsc::unbounded_channel();
        for i in 0..100 {
            tx.send(ChatEvent::new("Bob", format!("line {}", i), EventKind::Message))
                .unwrap();
        }

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            write_loop(near, rx, Duration::from_millis(50)),
        )
        .await;

        assert!(result.is_ok(), "writer kept waiting on a stalled peer");
        assert!(tx.is_closed());
    }
}
