//! Operator console
//!
//! Reads commands from the server's stdin: `shutdown`, `users`, `help`.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::AppError;
use crate::server::ServerCommand;

/// A parsed operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Shutdown,
    Users,
    Help,
    Unknown,
    /// Blank line
    Empty,
}

impl AdminCommand {
    pub fn parse(line: &str) -> Self {
        match line.trim().to_lowercase().as_str() {
            "" => AdminCommand::Empty,
            "shutdown" => AdminCommand::Shutdown,
            "users" => AdminCommand::Users,
            "help" => AdminCommand::Help,
            _ => AdminCommand::Unknown,
        }
    }
}

/// Render the `users` reply
pub fn format_users(users: &[String]) -> String {
    let list = if users.is_empty() {
        "None".to_string()
    } else {
        users.join(", ")
    };
    format!("Online users ({}): {}", users.len(), list)
}

/// Run the console until `shutdown` or end of input
///
/// End of input leaves the server running.
pub async fn run<R>(input: R, cmd_tx: mpsc::Sender<ServerCommand>) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        match AdminCommand::parse(&line) {
            AdminCommand::Shutdown => {
                info!("Shutting down server...");
                cmd_tx
                    .send(ServerCommand::Shutdown)
                    .await
                    .map_err(|_| AppError::ChannelSend)?;
                return Ok(());
            }
            AdminCommand::Users => {
                let (reply_tx, reply_rx) = oneshot::channel();
                cmd_tx
                    .send(ServerCommand::ListUsers { reply: reply_tx })
                    .await
                    .map_err(|_| AppError::ChannelSend)?;
                let users = reply_rx.await.map_err(|_| AppError::ChannelSend)?;
                println!("{}", format_users(&users));
            }
            AdminCommand::Help => println!("Admin commands: shutdown, users, help"),
            AdminCommand::Unknown => println!("Unknown command. Type 'help' for admin commands."),
            AdminCommand::Empty => {}
        }
    }

    debug!("Admin console input closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_parse() {
        assert_eq!(AdminCommand::parse("shutdown"), AdminCommand::Shutdown);
        assert_eq!(AdminCommand::parse("  USERS \n"), AdminCommand::Users);
        assert_eq!(AdminCommand::parse("help"), AdminCommand::Help);
        assert_eq!(AdminCommand::parse("reboot"), AdminCommand::Unknown);
        assert_eq!(AdminCommand::parse("   "), AdminCommand::Empty);
    }

    #[test]
    fn test_format_users() {
        assert_eq!(format_users(&[]), "Online users (0): None");
        assert_eq!(
            format_users(&["Alice".to_string(), "Bob".to_string()]),
            "Online users (2): Alice, Bob"
        );
    }

    #[tokio::test]
    async fn test_console_sends_shutdown() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(4);
        let input: &[u8] = b"help\nshutdown\nusers\n";

        run(input, cmd_tx).await.unwrap();

        assert!(matches!(cmd_rx.recv().await, Some(ServerCommand::Shutdown)));
        assert!(cmd_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_console_eof_keeps_server() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(4);
        let input: &[u8] = b"bogus\n";

        run(input, cmd_tx).await.unwrap();

        assert!(cmd_rx.recv().await.is_none());
    }
}
