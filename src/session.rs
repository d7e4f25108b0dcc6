//! Session struct definition
//!
//! Server-side state for one connected client that has completed the
//! username handshake.

use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot};

use crate::error::SendError;
use crate::message::ChatEvent;
use crate::types::ClientId;

/// Server-side end of a connection
///
/// Carries the writer's event queue and the signal that forces the
/// connection closed. Created by the handler, moved into its `Session`.
#[derive(Debug)]
pub struct ConnectionHandle {
    events: mpsc::UnboundedSender<ChatEvent>,
    closer: oneshot::Sender<()>,
}

/// Handler-side ends of a [`ConnectionHandle`]
#[derive(Debug)]
pub struct ConnectionEnds {
    /// Drained by the writer task
    pub events: mpsc::UnboundedReceiver<ChatEvent>,
    /// Resolves `Ok` when the session has been evicted
    pub closed: oneshot::Receiver<()>,
}

/// Create the channels linking a session to its connection handler
pub fn connection_channel() -> (ConnectionHandle, ConnectionEnds) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (close_tx, close_rx) = oneshot::channel();
    (
        ConnectionHandle {
            events: events_tx,
            closer: close_tx,
        },
        ConnectionEnds {
            events: events_rx,
            closed: close_rx,
        },
    )
}

/// Handshaken client
///
/// The `sender` feeds the connection's writer task, which exclusively
/// owns the socket's write half. The queue is unbounded: a peer that
/// stops reading is cut off by the writer's own timeout, never by the
/// router.
#[derive(Debug)]
pub struct Session {
    /// Connection identity
    pub id: ClientId,
    /// Unique username, fixed at handshake
    pub username: String,
    /// Peer address, informational
    pub remote_addr: SocketAddr,
    /// Server → Client event channel
    sender: mpsc::UnboundedSender<ChatEvent>,
    /// Tells the connection handler to drop the socket now
    closer: Option<oneshot::Sender<()>>,
}

impl Session {
    /// Create a session for a connection whose handshake succeeded
    pub fn new(
        id: ClientId,
        username: String,
        remote_addr: SocketAddr,
        connection: ConnectionHandle,
    ) -> Self {
        Self {
            id,
            username,
            remote_addr,
            sender: connection.events,
            closer: Some(connection.closer),
        }
    }

    /// Queue an event for this session's writer without waiting
    ///
    /// Fails only once the writer has ended.
    pub fn send(&self, event: ChatEvent) -> Result<(), SendError> {
        self.sender
            .send(event)
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Whether the writer task is still running
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Force the connection closed after an eviction
    ///
    /// The handler aborts its writer and drops the socket without
    /// flushing anything still queued.
    pub fn close(mut self) {
        if let Some(closer) = self.closer.take() {
            let _ = closer.send(());
        }
    }
}
