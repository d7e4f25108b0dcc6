//! Session registry
//!
//! The authoritative set of live sessions. It is owned by the
//! `ChatServer` actor, so every operation here runs serialized with
//! every other; uniqueness checks and insertion happen in one step.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::error::AppError;
use crate::session::{ConnectionHandle, Session};
use crate::types::ClientId;

/// Username no client may take (compared case-insensitively)
pub const RESERVED_USERNAME: &str = "server";

/// Live sessions keyed by connection
#[derive(Debug, Default)]
pub struct Registry {
    sessions: HashMap<ClientId, Session>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session if the username is free
    ///
    /// Fails without touching the registry when the name is empty,
    /// reserved, or held by another live session, or when the
    /// connection already has a session.
    pub fn try_register(
        &mut self,
        id: ClientId,
        remote_addr: SocketAddr,
        username: String,
        connection: ConnectionHandle,
    ) -> Result<&Session, AppError> {
        if self.sessions.contains_key(&id) {
            return Err(AppError::AlreadyRegistered);
        }

        if username.is_empty() {
            return Err(AppError::InvalidUsername);
        }

        if username.eq_ignore_ascii_case(RESERVED_USERNAME)
            || self.lookup_by_username(&username).is_some()
        {
            return Err(AppError::UsernameTaken(username));
        }

        let session = Session::new(id, username, remote_addr, connection);
        self.sessions.insert(id, session);
        Ok(&self.sessions[&id])
    }

    /// Remove a session; a no-op if it is already gone
    pub fn remove(&mut self, id: ClientId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    /// Find a session by exact (case-sensitive) username
    pub fn lookup_by_username(&self, username: &str) -> Option<&Session> {
        self.sessions.values().find(|s| s.username == username)
    }

    /// Find a session by connection
    pub fn get(&self, id: ClientId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// All current sessions, in no particular order
    pub fn snapshot_all(&self) -> Vec<&Session> {
        self.sessions.values().collect()
    }

    /// Usernames of all current sessions
    pub fn usernames(&self) -> Vec<String> {
        self.sessions.values().map(|s| s.username.clone()).collect()
    }

    /// Drop every session, closing their outbound queues
    ///
    /// Writers still flush what was queued before the drop.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::connection_channel;

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn register(registry: &mut Registry, name: &str) -> Result<ClientId, AppError> {
        let (handle, _ends) = connection_channel();
        let id = ClientId::new();
        registry
            .try_register(id, addr(), name.to_string(), handle)
            .map(|s| s.id)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::new();
        let id = register(&mut registry, "Alice").unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup_by_username("Alice").unwrap().id, id);
        assert!(registry.lookup_by_username("alice").is_none());
        assert_eq!(registry.get(id).unwrap().username, "Alice");
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let mut registry = Registry::new();
        register(&mut registry, "Alice").unwrap();

        let err = register(&mut registry, "Alice").unwrap_err();
        assert!(matches!(err, AppError::UsernameTaken(name) if name == "Alice"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reused_connection_id_rejected() {
        let mut registry = Registry::new();
        let id = register(&mut registry, "Alice").unwrap();

        let (handle, _ends) = connection_channel();
        let err = registry
            .try_register(id, addr(), "Bob".to_string(), handle)
            .unwrap_err();

        assert!(matches!(err, AppError::AlreadyRegistered));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(id).unwrap().username, "Alice");
        assert!(registry.lookup_by_username("Bob").is_none());
    }

    #[test]
    fn test_usernames_are_case_sensitive() {
        let mut registry = Registry::new();
        register(&mut registry, "Alice").unwrap();
        register(&mut registry, "alice").unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reserved_username_rejected() {
        let mut registry = Registry::new();
        for name in ["server", "Server", "SERVER"] {
            assert!(matches!(
                register(&mut registry, name),
                Err(AppError::UsernameTaken(_))
            ));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_empty_username_rejected() {
        let mut registry = Registry::new();
        assert!(matches!(
            register(&mut registry, ""),
            Err(AppError::InvalidUsername)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = Registry::new();
        let id = register(&mut registry, "Alice").unwrap();

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.remove(ClientId::new()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_name_reusable_after_remove() {
        let mut registry = Registry::new();
        let id = register(&mut registry, "Alice").unwrap();
        registry.remove(id);
        assert!(register(&mut registry, "Alice").is_ok());
    }

    #[test]
    fn test_snapshot_and_usernames() {
        let mut registry = Registry::new();
        register(&mut registry, "Alice").unwrap();
        register(&mut registry, "Bob").unwrap();

        assert_eq!(registry.snapshot_all().len(), 2);
        let mut names = registry.usernames();
        names.sort();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }
}
