//! Connection registry
//!
//! Maps connection identity to its live framed connection. The single
//! source of truth for "who is currently reachable": an entry is created
//! when a connection is accepted and removed when it disconnects.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::connection::SocketConnection;

/// Concurrent connectionId → live connection map
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<SocketConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register an accepted connection under its identity
    pub async fn register(&self, conn: Arc<SocketConnection>) {
        let mut connections = self.connections.write().await;
        connections.insert(conn.id().to_string(), conn);
    }

    /// Remove a connection; returns it if it was present
    pub async fn unregister(&self, conn_id: &str) -> Option<Arc<SocketConnection>> {
        let mut connections = self.connections.write().await;
        connections.remove(conn_id)
    }

    /// Look up a connection by identity
    pub async fn get(&self, conn_id: &str) -> Option<Arc<SocketConnection>> {
        let connections = self.connections.read().await;
        connections.get(conn_id).cloned()
    }

    /// Snapshot of all live connections
    ///
    /// Safe to iterate while the map mutates: entries are `Arc`s cloned out
    /// under the read lock, so registrations and removals during a broadcast
    /// never invalidate the iteration.
    pub async fn all(&self) -> Vec<(String, Arc<SocketConnection>)> {
        let connections = self.connections.read().await;
        connections
            .iter()
            .map(|(id, conn)| (id.clone(), Arc::clone(conn)))
            .collect()
    }

    /// Number of live connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    async fn connection(id: &str) -> Arc<SocketConnection> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();
        let _ = listener.accept().await.unwrap();

        Arc::new(SocketConnection::with_id(id, stream))
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ConnectionRegistry::new();
        let conn = connection("c1").await;

        registry.register(Arc::clone(&conn)).await;

        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get("c1").await.unwrap().id(), "c1");
        assert!(registry.get("c2").await.is_none());
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = ConnectionRegistry::new();
        registry.register(connection("c1").await).await;

        assert!(registry.unregister("c1").await.is_some());
        assert!(registry.unregister("c1").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_survives_mutation() {
        let registry = ConnectionRegistry::new();
        registry.register(connection("c1").await).await;
        registry.register(connection("c2").await).await;

        let snapshot = registry.all().await;
        registry.unregister("c1").await;
        registry.unregister("c2").await;

        // The snapshot is unaffected by concurrent removal.
        assert_eq!(snapshot.len(), 2);
        assert!(registry.is_empty().await);
    }
}
