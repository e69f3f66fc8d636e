//! Connection registry — maps transient connections to participant identities.
//!
//! Two indexes kept consistent under a single lock:
//! - `by_connection`: connection_id → Binding (quick "who is this socket?")
//! - `by_participant`: (participant_id, room_id) → connection_id (quick
//!   relay address resolution, O(1) instead of a scan)

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Identifier of a live transport connection. Minted when the socket is
/// accepted, never reused.
pub type ConnectionId = Uuid;

/// What a connection currently represents: exactly one (participant, room)
/// pair plus the display name announced at join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub connection_id: ConnectionId,
    pub participant_id: Uuid,
    pub room_id: Uuid,
    pub display_name: Option<String>,
}

#[derive(Default)]
struct Indexes {
    by_connection: HashMap<ConnectionId, Binding>,
    by_participant: HashMap<(Uuid, Uuid), ConnectionId>,
}

/// Process-lifetime, memory-resident registry. Rebuilt from empty on restart.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    indexes: Arc<RwLock<Indexes>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) the binding for a connection. Last bind wins:
    /// rebinding a connection replaces its previous binding, and binding a
    /// (participant, room) pair already claimed by another connection steals
    /// the secondary index entry from it.
    pub async fn bind(
        &self,
        connection_id: ConnectionId,
        participant_id: Uuid,
        room_id: Uuid,
        display_name: Option<String>,
    ) -> Binding {
        let binding = Binding {
            connection_id,
            participant_id,
            room_id,
            display_name,
        };

        let mut idx = self.indexes.write().await;

        // Drop the stale secondary entry if this connection was bound before.
        if let Some(previous) = idx.by_connection.remove(&connection_id) {
            let key = (previous.participant_id, previous.room_id);
            if idx.by_participant.get(&key) == Some(&connection_id) {
                idx.by_participant.remove(&key);
            }
        }

        idx.by_connection.insert(connection_id, binding.clone());
        idx.by_participant
            .insert((participant_id, room_id), connection_id);

        tracing::debug!(
            connection = %connection_id,
            participant = %participant_id,
            room = %room_id,
            "Connection bound"
        );

        binding
    }

    /// Remove the binding for a connection, returning it if present.
    pub async fn unbind(&self, connection_id: ConnectionId) -> Option<Binding> {
        let mut idx = self.indexes.write().await;
        let binding = idx.by_connection.remove(&connection_id)?;

        // Only clear the secondary entry if it still points at this
        // connection — a later bind may have claimed the pair.
        let key = (binding.participant_id, binding.room_id);
        if idx.by_participant.get(&key) == Some(&connection_id) {
            idx.by_participant.remove(&key);
        }

        tracing::debug!(
            connection = %connection_id,
            participant = %binding.participant_id,
            room = %binding.room_id,
            "Connection unbound"
        );

        Some(binding)
    }

    /// Resolve a participant within a room to its live connection, O(1).
    pub async fn lookup(&self, participant_id: Uuid, room_id: Uuid) -> Option<ConnectionId> {
        self.indexes
            .read()
            .await
            .by_participant
            .get(&(participant_id, room_id))
            .copied()
    }

    /// The current binding for a connection, if any.
    pub async fn binding(&self, connection_id: ConnectionId) -> Option<Binding> {
        self.indexes
            .read()
            .await
            .by_connection
            .get(&connection_id)
            .cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.indexes.read().await.by_connection.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_then_lookup() {
        let registry = ConnectionRegistry::new();
        let conn = Uuid::new_v4();
        let participant = Uuid::new_v4();
        let room = Uuid::new_v4();

        registry
            .bind(conn, participant, room, Some("Ada".into()))
            .await;

        assert_eq!(registry.lookup(participant, room).await, Some(conn));
        let binding = registry.binding(conn).await.expect("binding");
        assert_eq!(binding.display_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_unbind_returns_previous_binding() {
        let registry = ConnectionRegistry::new();
        let conn = Uuid::new_v4();
        let participant = Uuid::new_v4();
        let room = Uuid::new_v4();

        registry.bind(conn, participant, room, None).await;
        let previous = registry.unbind(conn).await.expect("previous binding");

        assert_eq!(previous.participant_id, participant);
        assert_eq!(registry.lookup(participant, room).await, None);
        assert_eq!(registry.unbind(conn).await, None);
    }

    #[tokio::test]
    async fn test_rebind_is_last_write_wins() {
        let registry = ConnectionRegistry::new();
        let conn = Uuid::new_v4();
        let room = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.bind(conn, first, room, None).await;
        registry.bind(conn, second, room, None).await;

        // The stale (first, room) entry is gone, the new one resolves.
        assert_eq!(registry.lookup(first, room).await, None);
        assert_eq!(registry.lookup(second, room).await, Some(conn));
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_pair_stolen_by_newer_connection_survives_old_unbind() {
        let registry = ConnectionRegistry::new();
        let participant = Uuid::new_v4();
        let room = Uuid::new_v4();
        let old_conn = Uuid::new_v4();
        let new_conn = Uuid::new_v4();

        registry.bind(old_conn, participant, room, None).await;
        registry.bind(new_conn, participant, room, None).await;

        // Unbinding the older connection must not clobber the newer claim.
        registry.unbind(old_conn).await;
        assert_eq!(registry.lookup(participant, room).await, Some(new_conn));
    }
}
