//! Message routing
//!
//! Broadcast, whisper and slash-command dispatch on top of the
//! [`Registry`]. Delivery never blocks: each session gets its event via
//! a non-blocking queue send. Sessions whose writer has ended are
//! evicted after the enumeration, as a separate registry mutation; the
//! eviction closes their connection and announces the departure.

use std::net::SocketAddr;

use tracing::{debug, info, warn};

use crate::error::{AppError, SendError};
use crate::message::{ChatEvent, EventKind, SERVER_SENDER};
use crate::registry::Registry;
use crate::session::ConnectionHandle;
use crate::types::ClientId;

/// Text sent in reply to `/help`
pub const HELP_TEXT: &str = "\
Available Commands:
/help - Show this help message
/users - List online users
/whisper <username> <message> - Send private message
/quit - Disconnect from server
/time - Show server time";

/// Farewell broadcast when the server shuts down
pub const SHUTDOWN_NOTICE: &str = "Server is shutting down. Goodbye!";

/// A parsed `/`-prefixed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Users,
    Whisper { target: String, body: String },
    /// `/whisper` with a missing target or message
    WhisperUsage,
    Time,
    Quit,
    Unknown(String),
}

impl Command {
    /// Parse a command line; the command name is case-insensitive
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.split_whitespace();
        let name = parts.next().unwrap_or_default().to_lowercase();

        match name.as_str() {
            "/help" => Command::Help,
            "/users" => Command::Users,
            "/whisper" => {
                let target = parts.next();
                let body = parts.collect::<Vec<_>>().join(" ");
                match target {
                    Some(target) if !body.is_empty() => Command::Whisper {
                        target: target.to_string(),
                        body,
                    },
                    _ => Command::WhisperUsage,
                }
            }
            "/time" => Command::Time,
            "/quit" => Command::Quit,
            _ => Command::Unknown(name),
        }
    }

    /// Whether a line should be dispatched as a command
    pub fn is_command(text: &str) -> bool {
        text.starts_with('/')
    }

    /// Whether a line asks to leave the chat
    pub fn is_quit(text: &str) -> bool {
        Self::is_command(text) && Self::parse(text) == Command::Quit
    }
}

/// Routing engine owning the session registry
#[derive(Debug, Default)]
pub struct Router {
    registry: Registry,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Complete a handshake: register, announce, and greet
    ///
    /// On failure nothing is announced and the registry is unchanged.
    pub fn join(
        &mut self,
        id: ClientId,
        remote_addr: SocketAddr,
        username: String,
        connection: ConnectionHandle,
    ) -> Result<(), AppError> {
        let username = self
            .registry
            .try_register(id, remote_addr, username, connection)?
            .username
            .clone();

        info!("{} connected from {}", username, remote_addr);

        self.broadcast(
            &format!("{} has joined the chat!", username),
            SERVER_SENDER,
            EventKind::System,
            Some(id),
        );

        let welcome = format!(
            "Welcome {}! Type '/help' for commands. Currently online: {}",
            username,
            self.online_list()
        );
        self.deliver(id, ChatEvent::server(welcome, EventKind::Welcome));

        debug!("Total sessions: {}", self.registry.len());
        Ok(())
    }

    /// Tear down a session that reached the active state
    ///
    /// Idempotent: a session already evicted during delivery had its
    /// departure announced then, so nothing is announced again.
    pub fn leave(&mut self, id: ClientId, username: &str) {
        if self.registry.remove(id).is_none() {
            debug!("{} was already removed", username);
            return;
        }

        info!("{} disconnected", username);
        self.announce_departure(username);
    }

    /// Route one inbound line from a session
    pub fn handle_input(&mut self, id: ClientId, text: &str) {
        if Command::is_command(text) {
            self.dispatch_command(id, text);
            return;
        }

        let Some(session) = self.registry.get(id) else {
            debug!("Dropping message from unregistered connection {}", id);
            return;
        };

        let sender = session.username.clone();
        debug!("{}: {}", sender, text);
        self.broadcast(text, &sender, EventKind::Message, Some(id));
    }

    /// Deliver one event to every session except `exclude`
    ///
    /// Returns the number of sessions the event was queued for.
    pub fn broadcast(
        &mut self,
        body: &str,
        sender: &str,
        kind: EventKind,
        exclude: Option<ClientId>,
    ) -> usize {
        let event = ChatEvent::new(sender, body, kind);
        let mut delivered = 0;
        let mut failed = Vec::new();

        for session in self.registry.snapshot_all() {
            if Some(session.id) == exclude {
                continue;
            }

            if !session.is_alive() {
                failed.push(session.id);
                continue;
            }

            match session.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Delivery to {} failed: {}", session.username, e);
                    failed.push(session.id);
                }
            }
        }

        self.evict(failed);
        delivered
    }

    /// Send a private message from one user to another
    ///
    /// The target gets a whisper event and the sender a confirmation.
    /// An unknown target, or the sender itself, is `TargetNotFound`.
    pub fn whisper(&mut self, from: &str, to: &str, body: &str) -> Result<(), AppError> {
        let target = match self.registry.lookup_by_username(to) {
            Some(session) if session.username != from => session.id,
            _ => return Err(AppError::TargetNotFound(to.to_string())),
        };

        let whisper = ChatEvent::new(format!("[Whisper from {}]", from), body, EventKind::Whisper);
        if !self.deliver(target, whisper) {
            return Err(AppError::TargetNotFound(to.to_string()));
        }

        if let Some(origin) = self.registry.lookup_by_username(from).map(|s| s.id) {
            let confirmation = ChatEvent::server(format!("Whisper sent to {}", to), EventKind::System);
            self.deliver(origin, confirmation);
        }

        debug!("{} whispered to {}", from, to);
        Ok(())
    }

    /// Execute a `/`-prefixed command on behalf of a session
    ///
    /// `/quit` only says goodbye; the connection's own loop performs
    /// the teardown.
    pub fn dispatch_command(&mut self, id: ClientId, raw: &str) {
        let Some(username) = self.registry.get(id).map(|s| s.username.clone()) else {
            debug!("Dropping command from unregistered connection {}", id);
            return;
        };

        let command = Command::parse(raw);
        debug!("{} issued {:?}", username, command);

        let reply = match command {
            Command::Help => ChatEvent::server(HELP_TEXT, EventKind::System),
            Command::Users => ChatEvent::server(
                format!("Online users: {}", self.online_list()),
                EventKind::System,
            ),
            Command::Whisper { target, body } => match self.whisper(&username, &target, &body) {
                Ok(()) => return,
                Err(e) => e.into(),
            },
            Command::WhisperUsage => ChatEvent::server(
                "Usage: /whisper <username> <message>",
                EventKind::Error,
            ),
            Command::Time => ChatEvent::server(
                format!(
                    "Server time: {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
                ),
                EventKind::System,
            ),
            Command::Quit => ChatEvent::server("Goodbye!", EventKind::System),
            Command::Unknown(name) => ChatEvent::server(
                format!(
                    "Unknown command '{}'. Type /help for available commands.",
                    name
                ),
                EventKind::Error,
            ),
        };

        self.deliver(id, reply);
    }

    /// Say farewell to every session and drop them all
    pub fn shutdown(&mut self) {
        let notified = self.broadcast(SHUTDOWN_NOTICE, SERVER_SENDER, EventKind::Error, None);
        info!("Shutdown notice sent to {} sessions", notified);
        self.registry.clear();
    }

    /// Sorted usernames of every live session
    pub fn online_users(&self) -> Vec<String> {
        let mut names = self.registry.usernames();
        names.sort();
        names
    }

    fn online_list(&self) -> String {
        self.online_users().join(", ")
    }

    fn announce_departure(&mut self, username: &str) {
        self.broadcast(
            &format!("{} has left the chat.", username),
            SERVER_SENDER,
            EventKind::System,
            None,
        );
        debug!("Total sessions: {}", self.registry.len());
    }

    /// Queue an event for one session, evicting it on failure
    fn deliver(&mut self, id: ClientId, event: ChatEvent) -> bool {
        let Some(session) = self.registry.get(id) else {
            return false;
        };

        let result = if session.is_alive() {
            session.send(event)
        } else {
            Err(SendError::ChannelClosed)
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Delivery to {} failed: {}", session.username, e);
                self.evict(vec![id]);
                false
            }
        }
    }

    /// Remove unreachable sessions, close their sockets, and announce them
    ///
    /// Announcing may evict further sessions; each is removed before its
    /// notice goes out, so the recursion ends once the registry stops
    /// shrinking.
    fn evict(&mut self, ids: Vec<ClientId>) {
        for id in ids {
            let Some(session) = self.registry.remove(id) else {
                continue;
            };

            warn!("Evicted unreachable session {}", session.username);
            let username = session.username.clone();
            session.close();
            self.announce_departure(&username);
        }
    }
}
