//! Wire protocol definitions
//!
//! The protocol is asymmetric:
//! - Client → Server: raw UTF-8 text, one message or command per line.
//! - Server → Client: one JSON-encoded [`ChatEvent`] per line.
//!
//! Lines are terminated by `\n` (a trailing `\r` is tolerated).

use std::io;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::AppError;

/// Sender label used for every server-originated event
pub const SERVER_SENDER: &str = "Server";

/// Maximum inbound frame size in bytes (longer lines are split)
pub const MAX_FRAME_LEN: usize = 4096;

/// Presentation hint carried by every event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Plain chat line from a user
    Message,
    /// Server notice (joins, departures, command output)
    System,
    /// Greeting sent once the handshake succeeds
    Welcome,
    /// Something the client asked for failed
    Error,
    /// Private message from another user
    Whisper,
}

/// Server → Client event
///
/// Serialized with the field names `timestamp`, `sender`, `message`, `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Server local time, `HH:MM:SS`
    pub timestamp: String,
    /// Username, or "Server"
    pub sender: String,
    /// Text payload
    pub message: String,
    /// Presentation hint
    #[serde(rename = "type")]
    pub kind: EventKind,
}

impl ChatEvent {
    /// Create an event stamped with the current local time
    pub fn new(sender: impl Into<String>, message: impl Into<String>, kind: EventKind) -> Self {
        Self {
            timestamp: timestamp(),
            sender: sender.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create an event sent on behalf of the server
    pub fn server(message: impl Into<String>, kind: EventKind) -> Self {
        Self::new(SERVER_SENDER, message, kind)
    }

    /// Whether the event originates from the server itself
    pub fn is_from_server(&self) -> bool {
        self.sender == SERVER_SENDER
    }
}

/// Convert AppError to an error event for client notification
impl From<AppError> for ChatEvent {
    fn from(err: AppError) -> Self {
        let message = match &err {
            AppError::UsernameTaken(_) => "Username already taken. Disconnecting...".to_string(),
            AppError::InvalidUsername => "Username cannot be empty. Disconnecting...".to_string(),
            AppError::TargetNotFound(username) => {
                format!("User '{}' not found or is yourself", username)
            }
            AppError::Decode(e) => format!("Invalid message format: {}", e),
            // Fatal errors are not typically converted (connection closes)
            _ => "Internal error".to_string(),
        };
        ChatEvent::server(message, EventKind::Error)
    }
}

/// Current local time as `HH:MM:SS`
pub fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Encode an event as a single newline-terminated frame
pub fn encode(event: &ChatEvent) -> Result<Vec<u8>, AppError> {
    let mut frame = serde_json::to_vec(event)?;
    frame.push(b'\n');
    Ok(frame)
}

/// Decode one frame produced by [`encode`]
///
/// Surrounding whitespace (including the terminator) is ignored.
pub fn decode(frame: &[u8]) -> Result<ChatEvent, AppError> {
    serde_json::from_slice(frame.trim_ascii()).map_err(AppError::Decode)
}

/// Encode an event and write it out as one frame
pub async fn write_event<W>(writer: &mut W, event: &ChatEvent) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(event)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Line-delimited frame reader
///
/// Lines longer than [`MAX_FRAME_LEN`] are split into several frames.
/// A split never cuts a UTF-8 sequence: the incomplete tail is carried
/// over to the next frame. Partial reads are kept in the reader, so
/// [`FrameReader::next_frame`] is safe to cancel in `select!`.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R> FrameReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Read the next frame
    ///
    /// Returns `None` once the peer has closed the stream. The terminator
    /// is stripped; invalid UTF-8 is replaced rather than rejected.
    pub async fn next_frame(&mut self) -> io::Result<Option<String>> {
        let limit = MAX_FRAME_LEN.saturating_sub(self.buf.len()) as u64;
        (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await?;

        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut frame = if self.buf.last() != Some(&b'\n') && self.buf.len() >= MAX_FRAME_LEN {
            let tail = self.buf.split_off(split_point(&self.buf));
            std::mem::replace(&mut self.buf, tail)
        } else {
            std::mem::take(&mut self.buf)
        };

        while matches!(frame.last(), Some(b'\n' | b'\r')) {
            frame.pop();
        }

        Ok(Some(String::from_utf8_lossy(&frame).into_owned()))
    }
}

/// Offset of a trailing incomplete UTF-8 sequence, or `buf.len()`
fn split_point(buf: &[u8]) -> usize {
    let len = buf.len();
    for back in 1..=len.min(4) {
        let byte = buf[len - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }

        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { len - back } else { len };
    }
    len
}
