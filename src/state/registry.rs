use dashmap::{DashMap, mapref::entry::Entry};

use crate::{error::ServiceError, state::room::ConnectionId};

/// In-memory index of live sessions of one kind, keyed by session identifier.
///
/// Besides the handles, the registry remembers which session each connection
/// belongs to so the gateway can route disconnects without scanning sessions.
pub struct SessionRegistry<H> {
    kind: &'static str,
    sessions: DashMap<String, H>,
    members: DashMap<ConnectionId, String>,
}

impl<H: Clone> SessionRegistry<H> {
    /// Create an empty registry. `kind` names the sessions in errors and logs.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            sessions: DashMap::new(),
            members: DashMap::new(),
        }
    }

    /// Register `handle` under `id`; fails when the identifier is already taken.
    pub fn create(&self, id: String, handle: H) -> Result<(), ServiceError> {
        match self.sessions.entry(id) {
            Entry::Occupied(entry) => Err(ServiceError::InvalidState(format!(
                "{} `{}` already exists",
                self.kind,
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(handle);
                Ok(())
            }
        }
    }

    /// Handle of session `id`.
    pub fn find(&self, id: &str) -> Result<H, ServiceError> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("{} `{id}` not found", self.kind)))
    }

    /// Whether a session is registered under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Drop session `id` and every membership pointing at it. Removing an unknown
    /// identifier is a no-op.
    pub fn remove(&self, id: &str) -> Option<H> {
        let removed = self.sessions.remove(id).map(|(_, handle)| handle);
        self.members.retain(|_, session| session != id);
        removed
    }

    /// Identifiers of every registered session.
    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Record that `connection` takes part in session `id`.
    pub fn bind_member(&self, connection: ConnectionId, id: &str) {
        self.members.insert(connection, id.to_string());
    }

    /// Session `connection` takes part in, if any.
    pub fn member_session(&self, connection: &ConnectionId) -> Option<String> {
        self.members
            .get(connection)
            .map(|entry| entry.value().clone())
    }

    /// Forget the membership of `connection`, whatever session it points at.
    pub fn unbind_member(&self, connection: &ConnectionId) -> Option<String> {
        self.members.remove(connection).map(|(_, id)| id)
    }

    /// Forget the membership of `connection` only if it points at session `id`.
    pub fn unbind_member_from(&self, connection: &ConnectionId, id: &str) {
        self.members.remove_if(connection, |_, session| session == id);
    }
}
