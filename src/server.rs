//! ChatServer Actor implementation
//!
//! The single execution unit that owns the router and its session
//! registry. Connection handlers and the admin console talk to it
//! through `ServerCommand`s, so every registry operation is serialized.

use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::error::AppError;
use crate::router::Router;
use crate::session::ConnectionHandle;
use crate::types::ClientId;

/// Commands sent to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Handshake finished reading a candidate username
    Register {
        client_id: ClientId,
        remote_addr: SocketAddr,
        username: String,
        connection: ConnectionHandle,
        reply: oneshot::Sender<Result<(), AppError>>,
    },
    /// One inbound line from an active session
    Input {
        client_id: ClientId,
        text: String,
    },
    /// An active session's connection ended
    Disconnect {
        client_id: ClientId,
        username: String,
    },
    /// Operator asked for the online users
    ListUsers {
        reply: oneshot::Sender<Vec<String>>,
    },
    /// Operator asked the server to stop
    Shutdown,
}

/// Resolve once the running flag is lowered (or its owner is gone)
pub async fn stopped(running: &mut watch::Receiver<bool>) {
    let _ = running.wait_for(|r| !*r).await;
}

/// The main ChatServer actor
pub struct ChatServer {
    router: Router,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
    /// Process-wide running flag, `true` until shutdown
    running: watch::Sender<bool>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    ///
    /// Also returns a handle on the running flag for the accept loop
    /// and connection handlers to observe.
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> (Self, watch::Receiver<bool>) {
        let (running, running_rx) = watch::channel(true);
        let server = Self {
            router: Router::new(),
            receiver,
            running,
        };
        (server, running_rx)
    }

    /// Run the ChatServer event loop
    ///
    /// Processes commands until a shutdown is requested or all senders
    /// are dropped. Either way the running flag is lowered on exit.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            if !self.handle_command(cmd) {
                break;
            }
        }

        self.running.send_replace(false);
        info!("ChatServer shutting down");
    }

    /// Process a single command; returns false once shut down
    fn handle_command(&mut self, cmd: ServerCommand) -> bool {
        match cmd {
            ServerCommand::Register {
                client_id,
                remote_addr,
                username,
                connection,
                reply,
            } => {
                let result = self
                    .router
                    .join(client_id, remote_addr, username.clone(), connection);
                if let Err(e) = &result {
                    info!("Handshake from {} rejected: {}", remote_addr, e);
                }
                if let Err(Ok(())) = reply.send(result) {
                    // Handler went away mid-handshake
                    self.router.leave(client_id, &username);
                }
            }
            ServerCommand::Input { client_id, text } => {
                self.router.handle_input(client_id, &text);
            }
            ServerCommand::Disconnect {
                client_id,
                username,
            } => {
                self.router.leave(client_id, &username);
            }
            ServerCommand::ListUsers { reply } => {
                let _ = reply.send(self.router.online_users());
            }
            ServerCommand::Shutdown => {
                info!("Shutdown requested");
                self.router.shutdown();
                return false;
            }
        }

        debug!("Total sessions: {}", self.router.registry().len());
        true
    }
}
