use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};

use crate::dao::storage::{StorageError, StorageResult};

/// Persistence boundary for the long-lived player score that outlives a single match.
pub trait ProfileStore: Send + Sync {
    /// Current persistent score of `user_id` (0 for unknown users).
    fn score(&self, user_id: &str) -> BoxFuture<'static, StorageResult<i64>>;
    /// Add `delta` (possibly negative) to the persistent score and return the new value.
    fn adjust_score(&self, user_id: &str, delta: i64) -> BoxFuture<'static, StorageResult<i64>>;
}

/// Process-local profile store; scores vanish with the process.
#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    scores: Arc<DashMap<String, i64>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn checked_id(user_id: &str) -> StorageResult<String> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(StorageError::InvalidId(user_id.to_string()));
    }
    Ok(trimmed.to_string())
}

impl ProfileStore for MemoryProfileStore {
    fn score(&self, user_id: &str) -> BoxFuture<'static, StorageResult<i64>> {
        let result =
            checked_id(user_id).map(|id| self.scores.get(&id).map(|entry| *entry).unwrap_or(0));
        async move { result }.boxed()
    }

    fn adjust_score(&self, user_id: &str, delta: i64) -> BoxFuture<'static, StorageResult<i64>> {
        let result = checked_id(user_id).map(|id| {
            let mut entry = self.scores.entry(id).or_insert(0);
            *entry = entry.saturating_add(delta);
            *entry
        });
        async move { result }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn adjustments_accumulate_and_may_go_negative() {
        let store = MemoryProfileStore::new();
        assert_eq!(store.score("ana").await.unwrap(), 0);
        assert_eq!(store.adjust_score("ana", 50).await.unwrap(), 50);
        assert_eq!(store.adjust_score("ana", -80).await.unwrap(), -30);
        assert_eq!(store.score("ana").await.unwrap(), -30);
    }

    #[tokio::test]
    async fn blank_identifiers_are_rejected() {
        let store = MemoryProfileStore::new();
        assert!(matches!(
            store.adjust_score("  ", 10).await,
            Err(StorageError::InvalidId(_))
        ));
    }
}
