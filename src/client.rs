//! Terminal client
//!
//! A thin consumer of the wire protocol: decodes server events and
//! renders them as coloured terminal lines.

use tokio::io::AsyncBufRead;
use tracing::warn;

use crate::error::AppError;
use crate::message::{decode, timestamp, ChatEvent, EventKind, FrameReader};

const RESET: &str = "\x1b[0m";

/// Help shown locally for `/help`
pub const LOCAL_HELP: &str = "\
Quick Commands:
/help     - Show this help
/users    - List online users
/whisper  - Send private message (format: /whisper username message)
/time     - Show server time
/quit     - Disconnect from server

Just type and press Enter to send message to everyone!";

/// ANSI colour for an event kind
pub fn color(kind: EventKind) -> &'static str {
    match kind {
        EventKind::System => "\x1b[94m",
        EventKind::Welcome => "\x1b[92m",
        EventKind::Error => "\x1b[91m",
        EventKind::Whisper => "\x1b[95m",
        EventKind::Message => RESET,
    }
}

/// Render one event as a terminal line
///
/// Server notices omit the sender; whispers and chat lines show it.
pub fn render(event: &ChatEvent) -> String {
    let color = color(event.kind);
    if event.is_from_server() && event.kind != EventKind::Whisper {
        format!("{}[{}] {}{}", color, event.timestamp, event.message, RESET)
    } else {
        format!(
            "{}[{}] {}: {}{}",
            color, event.timestamp, event.sender, event.message, RESET
        )
    }
}

/// Decode and render server events until the connection closes
///
/// Malformed frames are reported and skipped. Returns `ConnectionLost`
/// when the server closes the stream.
pub async fn receive_events<R, F>(reader: R, mut output: F) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(String),
{
    let mut frames = FrameReader::new(reader);
    while let Some(frame) = frames.next_frame().await? {
        if frame.trim().is_empty() {
            continue;
        }

        match decode(frame.as_bytes()) {
            Ok(event) => output(render(&event)),
            Err(e) => {
                warn!("Dropping malformed event: {}", e);
                output(format!("[{}] Received invalid data", timestamp()));
            }
        }
    }

    Err(AppError::ConnectionLost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::encode;

    #[test]
    fn test_render_server_notice() {
        let mut event = ChatEvent::server("Bob has joined the chat!", EventKind::System);
        event.timestamp = "10:00:00".to_string();
        assert_eq!(
            render(&event),
            "\x1b[94m[10:00:00] Bob has joined the chat!\x1b[0m"
        );
    }

    #[test]
    fn test_render_chat_and_whisper() {
        let mut event = ChatEvent::new("Alice", "hi", EventKind::Message);
        event.timestamp = "10:00:00".to_string();
        assert_eq!(render(&event), "\x1b[0m[10:00:00] Alice: hi\x1b[0m");

        let mut event = ChatEvent::new("[Whisper from Alice]", "psst", EventKind::Whisper);
        event.timestamp = "10:00:01".to_string();
        assert_eq!(
            render(&event),
            "\x1b[95m[10:00:01] [Whisper from Alice]: psst\x1b[0m"
        );
    }

    #[tokio::test]
    async fn test_receive_events_skips_malformed() {
        let mut input = encode(&ChatEvent::server("one", EventKind::System)).unwrap();
        input.extend_from_slice(b"{broken\n");
        input.extend(encode(&ChatEvent::new("Bob", "two", EventKind::Message)).unwrap());

        let mut lines = Vec::new();
        let result = receive_events(input.as_slice(), |line| lines.push(line)).await;

        assert!(matches!(result, Err(AppError::ConnectionLost)));
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("one"));
        assert!(lines[1].contains("Received invalid data"));
        assert!(lines[2].contains("Bob: two"));
    }
}
