//! Multi-user TCP Chat Relay Library
//!
//! A chat server that assigns each TCP connection a unique username
//! and routes text between them.
//!
//! # Features
//! - Username handshake with uniqueness check
//! - Broadcast to everyone but the sender
//! - Private whispers
//! - Slash commands: `/help`, `/users`, `/whisper`, `/time`, `/quit`
//! - Join and departure announcements
//! - Operator console with graceful shutdown
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the `Router` and its `Registry`
//! - Each connection has a `handler` task plus a writer task for its socket
//! - No locks needed - all registry access goes through message passing
//!
//! # Protocol
//! Clients send one UTF-8 line per message or command. The server sends
//! one JSON object per line: `{"timestamp","sender","message","type"}`.
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use chat_relay::{Acceptor, ChatServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:55555").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     let (server, running) = ChatServer::new(cmd_rx);
//!     tokio::spawn(server.run());
//!
//!     Acceptor::new(listener, cmd_tx, running).run().await;
//! }
//! ```

pub mod acceptor;
pub mod admin;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use acceptor::Acceptor;
pub use config::{ClientConfig, ServerConfig};
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use message::{decode, encode, ChatEvent, EventKind, FrameReader};
pub use registry::Registry;
pub use router::{Command, Router};
pub use server::{ChatServer, ServerCommand};
pub use session::{connection_channel, ConnectionHandle, Session};
pub use types::ClientId;
