use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::dto::ws::ServerMessage;

/// Handle identifying one WebSocket connection for its whole lifetime.
pub type ConnectionId = Uuid;

/// Channel feeding a connection's writer task.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// Broadcast scope of one session: the connections currently subscribed to it.
///
/// Messages are pushed synchronously onto each member's unbounded outbox, so the
/// order in which the owning actor emits them is the order every member sees.
#[derive(Debug, Default)]
pub struct Room {
    members: IndexMap<ConnectionId, Outbox>,
}

impl Room {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `connection`, replacing a previous outbox for the same handle.
    pub fn join(&mut self, connection: ConnectionId, outbox: Outbox) {
        self.members.insert(connection, outbox);
    }

    /// Unsubscribe `connection`; returns whether it was a member.
    pub fn leave(&mut self, connection: &ConnectionId) -> bool {
        self.members.shift_remove(connection).is_some()
    }

    pub fn contains(&self, connection: &ConnectionId) -> bool {
        self.members.contains_key(connection)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Send to a single member. Closed outboxes are ignored; the gateway's disconnect
    /// path performs the cleanup.
    pub fn send_to(&self, connection: &ConnectionId, message: ServerMessage) {
        if let Some(outbox) = self.members.get(connection) {
            if outbox.send(message).is_err() {
                debug!(connection = %connection, "dropping message for closed connection");
            }
        }
    }

    /// Send a copy of `message` to every member.
    pub fn broadcast(&self, message: &ServerMessage) {
        for (connection, outbox) in &self.members {
            if outbox.send(message.clone()).is_err() {
                debug!(connection = %connection, "dropping broadcast for closed connection");
            }
        }
    }
}

/// Deliver a message straight to an outbox that is not (or no longer) part of a room.
pub fn send_direct(outbox: &Outbox, message: ServerMessage) {
    let _ = outbox.send(message);
}
