//! Presence reconciliation — unwinds registry and membership state when a
//! participant leaves or drops, and decides when a room ends.
//!
//! Departures are serialized per room on the room's lifecycle lock so the
//! "active count reached zero" check and the "end room" action are linearized
//! with respect to concurrent leaves: the room ends exactly once, and never
//! stays active after the last participant is gone. The count is read from
//! the directory at decision time, never cached.

use crate::directory::RoomDirectory;
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::room::RoomSet;
use huddle_common::error::{HuddleError, HuddleResult};
use huddle_common::event::SignalEvent;
use std::sync::Arc;

/// Why a participant departed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartureReason {
    ExplicitLeave,
    TransportDisconnect,
}

#[derive(Clone)]
pub struct PresenceReconciler {
    registry: ConnectionRegistry,
    rooms: RoomSet,
    directory: Arc<dyn RoomDirectory>,
}

impl PresenceReconciler {
    pub fn new(
        registry: ConnectionRegistry,
        rooms: RoomSet,
        directory: Arc<dyn RoomDirectory>,
    ) -> Self {
        Self {
            registry,
            rooms,
            directory,
        }
    }

    /// Unwind one connection's presence. Safe to call for connections that
    /// were never bound (no-op) and safe to race with a concurrent departure
    /// on the same room.
    pub async fn handle_departure(
        &self,
        connection_id: ConnectionId,
        reason: DepartureReason,
    ) -> HuddleResult<()> {
        // Peek first: the lifecycle lock lives on the room, so we need the
        // room before we can serialize.
        let Some(peek) = self.registry.binding(connection_id).await else {
            return Ok(());
        };
        let Some(room) = self.rooms.get(peek.room_id).await else {
            self.registry.unbind(connection_id).await;
            return Ok(());
        };

        let _lifecycle = room.lifecycle.lock().await;

        // Re-take the binding under the lock; a racing departure for the
        // same connection may already have processed it.
        let Some(binding) = self.registry.unbind(connection_id).await else {
            return Ok(());
        };

        tracing::info!(
            participant = %binding.participant_id,
            room = %binding.room_id,
            ?reason,
            "Participant departing"
        );

        room.leave(connection_id).await;
        self.directory.mark_left(binding.participant_id).await?;

        let active = self
            .directory
            .find_active_participants(binding.room_id)
            .await?;
        if !active.is_empty() {
            return Ok(());
        }

        match self.directory.end_room(binding.room_id).await {
            Ok(true) => {
                room.broadcast(
                    SignalEvent::RoomEnded {
                        room_id: binding.room_id,
                    },
                    None,
                )
                .await;
            }
            Ok(false) => {}
            Err(HuddleError::NotFound { resource }) => {
                tracing::warn!(room = %binding.room_id, %resource, "Directory lost the room");
            }
            Err(e) => return Err(e),
        }
        self.rooms.remove(binding.room_id).await;

        Ok(())
    }
}
