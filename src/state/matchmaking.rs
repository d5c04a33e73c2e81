use std::collections::VecDeque;

use crate::{
    catalog::Topic,
    state::{
        game::PlayerProfile,
        room::{ConnectionId, Outbox},
    },
};

/// A connection waiting for an opponent.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub connection: ConnectionId,
    pub profile: PlayerProfile,
    pub topic: Topic,
    pub outbox: Outbox,
}

/// Result of [`MatchmakingQueue::enqueue`].
#[derive(Debug)]
pub enum Enqueued {
    /// The identity (or the connection) is already waiting; nothing changed.
    AlreadyQueued,
    /// Queued; no opponent available yet.
    Waiting,
    /// The two oldest entries were removed from the queue, oldest first.
    Paired(QueueEntry, QueueEntry),
}

/// FIFO waiting list of battle candidates.
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    entries: VecDeque<QueueEntry>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` and pair the two oldest entries as soon as two are waiting.
    ///
    /// Pairing ignores topics: the first-queued entry's topic is used for the match.
    pub fn enqueue(&mut self, entry: QueueEntry) -> Enqueued {
        if self.entries.iter().any(|queued| {
            queued.profile.user_id == entry.profile.user_id || queued.connection == entry.connection
        }) {
            return Enqueued::AlreadyQueued;
        }

        self.entries.push_back(entry);
        if self.entries.len() < 2 {
            return Enqueued::Waiting;
        }

        match (self.entries.pop_front(), self.entries.pop_front()) {
            (Some(first), Some(second)) => Enqueued::Paired(first, second),
            (Some(first), None) => {
                self.entries.push_front(first);
                Enqueued::Waiting
            }
            _ => Enqueued::Waiting,
        }
    }

    /// Drop every entry of `connection`. Returns whether anything was removed.
    pub fn remove_connection(&mut self, connection: &ConnectionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| &entry.connection != connection);
        before != self.entries.len()
    }

    pub fn contains(&self, connection: &ConnectionId) -> bool {
        self.entries
            .iter()
            .any(|entry| &entry.connection == connection)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
