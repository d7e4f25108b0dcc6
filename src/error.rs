//! Error types for the chat relay
//!
//! Defines application-level errors and per-session delivery errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// business errors (send an error event to the client).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on a socket (fatal for that connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error while encoding an outbound event
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A received frame is not a valid chat event
    #[error("Malformed event: {0}")]
    Decode(#[source] serde_json::Error),

    /// Channel send error (fatal - the server actor is gone)
    #[error("Channel send error")]
    ChannelSend,

    /// Username is held by a live session or is reserved
    #[error("Username taken: {0}")]
    UsernameTaken(String),

    /// Connection identity already has a session
    #[error("Connection already registered")]
    AlreadyRegistered,

    /// Empty username offered during the handshake
    #[error("Invalid username")]
    InvalidUsername,

    /// Whisper target is not online, or is the sender
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// Peer closed the connection
    #[error("Connection lost")]
    ConnectionLost,
}

/// Delivery errors
///
/// Occurs when an event cannot be queued for a session's writer.
/// The session is considered unreachable and is evicted.
#[derive(Debug, Error)]
pub enum SendError {
    /// The writer task has ended (socket closed, failed, or timed out)
    #[error("Channel closed")]
    ChannelClosed,
}
