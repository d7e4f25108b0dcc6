//! Connection acceptor
//!
//! Accepts connections until the running flag drops, handing each one
//! to its own task running [`handle_connection`].

use std::io;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::handler::{handle_connection, DRAIN_TIMEOUT};
use crate::server::{stopped, ServerCommand};

/// Accept loop feeding connection handlers
pub struct Acceptor {
    listener: TcpListener,
    cmd_tx: mpsc::Sender<ServerCommand>,
    running: watch::Receiver<bool>,
}

impl Acceptor {
    pub fn new(
        listener: TcpListener,
        cmd_tx: mpsc::Sender<ServerCommand>,
        running: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            cmd_tx,
            running,
        }
    }

    /// Accept connections until shutdown, then wait for handlers to finish
    ///
    /// A non-transient accept error means the listening socket is gone;
    /// the server is asked to shut down rather than retrying.
    pub async fn run(mut self) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("New connection from {}", addr);
                        let cmd_tx = self.cmd_tx.clone();
                        let running = self.running.clone();

                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, cmd_tx, running).await {
                                error!("Connection handler error for {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) if is_transient(&e) => {
                        warn!("Failed to accept connection: {}", e);
                    }
                    Err(e) => {
                        error!("Listener failed, stopping: {}", e);
                        let _ = self.cmd_tx.send(ServerCommand::Shutdown).await;
                        break;
                    }
                },
                _ = stopped(&mut self.running) => {
                    info!("Accept loop stopping");
                    break;
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        drop(self.listener);
        debug!("Waiting for {} connections to close", connections.len());

        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("Connections still open after {:?}, aborting", DRAIN_TIMEOUT);
            connections.abort_all();
        }
    }
}

/// Accept errors that concern a single incoming connection
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || is_resource_exhausted(e)
}

/// Out of file descriptors; retrying later may succeed
fn is_resource_exhausted(e: &io::Error) -> bool {
    // EMFILE / ENFILE
    matches!(e.raw_os_error(), Some(23) | Some(24))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_accept_errors() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(is_transient(&io::Error::from_raw_os_error(24)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::InvalidInput)));
    }
}
