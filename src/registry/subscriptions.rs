//! Subscription registry
//!
//! Maps connection identity to the set of rooms it has joined. An entry is
//! created lazily on first subscribe and removed entirely on disconnect.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

/// Concurrent connectionId → set-of-roomId map
///
/// Room sets are held behind per-connection locks; the outer map is only
/// write-locked when a connection's entry is created or removed.
pub struct SubscriptionRegistry {
    rooms: RwLock<HashMap<String, Arc<RwLock<HashSet<String>>>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe a connection to a room
    ///
    /// Idempotent: a room appears at most once per connection's set.
    pub async fn add(&self, conn_id: &str, room_id: &str) {
        {
            let rooms = self.rooms.read().await;
            if let Some(entry) = rooms.get(conn_id) {
                entry.write().await.insert(room_id.to_string());
                return;
            }
        }

        let mut rooms = self.rooms.write().await;
        let entry = rooms
            .entry(conn_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(HashSet::new())));
        entry.write().await.insert(room_id.to_string());

        tracing::debug!(conn = conn_id, room = room_id, "subscription added");
    }

    /// Unsubscribe a connection from a room
    ///
    /// Absence of the room, or of the connection entirely, is a no-op and
    /// never an error.
    pub async fn remove(&self, conn_id: &str, room_id: &str) {
        let rooms = self.rooms.read().await;

        if let Some(entry) = rooms.get(conn_id) {
            entry.write().await.remove(room_id);
            tracing::debug!(conn = conn_id, room = room_id, "subscription removed");
        }
    }

    /// Snapshot of a connection's current room set (empty if none)
    pub async fn subscriptions(&self, conn_id: &str) -> HashSet<String> {
        let rooms = self.rooms.read().await;

        match rooms.get(conn_id) {
            Some(entry) => entry.read().await.clone(),
            None => HashSet::new(),
        }
    }

    /// Whether a connection is currently subscribed to a room
    pub async fn is_subscribed(&self, conn_id: &str, room_id: &str) -> bool {
        let rooms = self.rooms.read().await;

        match rooms.get(conn_id) {
            Some(entry) => entry.read().await.contains(room_id),
            None => false,
        }
    }

    /// Drop a connection's entry entirely (on disconnect)
    pub async fn remove_connection(&self, conn_id: &str) {
        let mut rooms = self.rooms.write().await;
        rooms.remove(conn_id);
    }

    /// Number of connections holding at least one entry
    pub async fn connection_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lazy_entry_and_idempotent_add() {
        let registry = SubscriptionRegistry::new();
        assert_eq!(registry.connection_count().await, 0);

        registry.add("c1", "1").await;
        registry.add("c1", "1").await;
        registry.add("c1", "2").await;

        let subs = registry.subscriptions("c1").await;
        assert_eq!(subs.len(), 2);
        assert!(subs.contains("1"));
        assert!(subs.contains("2"));
    }

    #[tokio::test]
    async fn test_double_subscribe_single_unsubscribe() {
        let registry = SubscriptionRegistry::new();

        registry.add("c1", "1").await;
        registry.add("c1", "1").await;
        registry.remove("c1", "1").await;

        // No residual membership causing spurious delivery.
        assert!(!registry.is_subscribed("c1", "1").await);
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let registry = SubscriptionRegistry::new();

        registry.remove("c1", "1").await; // no entry at all
        registry.add("c1", "1").await;
        registry.remove("c1", "2").await; // room never joined

        assert!(registry.is_subscribed("c1", "1").await);
    }

    #[tokio::test]
    async fn test_remove_connection_clears_entry() {
        let registry = SubscriptionRegistry::new();

        registry.add("c1", "1").await;
        registry.add("c2", "1").await;
        registry.remove_connection("c1").await;

        assert!(registry.subscriptions("c1").await.is_empty());
        assert!(registry.is_subscribed("c2", "1").await);
        assert_eq!(registry.connection_count().await, 1);
    }
}
