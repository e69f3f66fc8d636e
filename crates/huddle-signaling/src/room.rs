//! Room membership — per-room member sets and best-effort event fan-out.
//!
//! Every member is represented by its connection's outbox: a single ordered
//! channel drained by one writer task per socket. All deliveries to a
//! connection (broadcasts and relayed envelopes alike) go through that one
//! channel, which is what preserves per-pair ordering for ICE candidates.
//!
//! Delivery is at-most-once: a member that disconnects mid-broadcast simply
//! misses the event. No retry, no acknowledgment.

use crate::registry::ConnectionId;
use huddle_common::error::{HuddleError, HuddleResult};
use huddle_common::event::SignalEvent;
use huddle_common::models::ParticipantSummary;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, mpsc};
use uuid::Uuid;

/// The ordered per-connection delivery channel.
pub type Outbox = mpsc::UnboundedSender<SignalEvent>;

struct Member {
    participant_id: Uuid,
    outbox: Outbox,
}

/// A single room's membership set.
pub struct Room {
    pub room_id: Uuid,
    members: Mutex<HashMap<ConnectionId, Member>>,
    /// Serializes departures and the zero-count room-ending decision for
    /// this room. Taken by the presence reconciler, never across rooms.
    pub lifecycle: Mutex<()>,
}

impl Room {
    fn new(room_id: Uuid) -> Self {
        Self {
            room_id,
            members: Mutex::new(HashMap::new()),
            lifecycle: Mutex::new(()),
        }
    }

    /// Add a member and announce the arrival to every other member.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        participant: ParticipantSummary,
        outbox: Outbox,
    ) {
        let announce = SignalEvent::ParticipantJoined {
            room_id: self.room_id,
            participant: participant.clone(),
        };

        let mut members = self.members.lock().await;
        members.insert(
            connection_id,
            Member {
                participant_id: participant.id,
                outbox,
            },
        );
        deliver(&members, announce, Some(connection_id));

        tracing::info!(
            room = %self.room_id,
            participant = %participant.id,
            "Participant joined room"
        );
    }

    /// Remove a member and announce the departure to the rest. Returns the
    /// departed participant id if the connection was a member.
    pub async fn leave(&self, connection_id: ConnectionId) -> Option<Uuid> {
        let mut members = self.members.lock().await;
        let removed = members.remove(&connection_id)?;

        deliver(
            &members,
            SignalEvent::ParticipantLeft {
                room_id: self.room_id,
                participant_id: removed.participant_id,
            },
            None,
        );

        tracing::info!(
            room = %self.room_id,
            participant = %removed.participant_id,
            "Participant left room"
        );

        Some(removed.participant_id)
    }

    /// Best-effort fan-out to currently joined members.
    pub async fn broadcast(&self, event: SignalEvent, exclude: Option<ConnectionId>) {
        let members = self.members.lock().await;
        deliver(&members, event, exclude);
    }

    /// Deliver one event to one member's ordered channel.
    pub async fn send_to(&self, connection_id: ConnectionId, event: SignalEvent) -> HuddleResult<()> {
        let members = self.members.lock().await;
        let member = members
            .get(&connection_id)
            .ok_or_else(|| HuddleError::NotFound {
                resource: format!("Connection {connection_id}"),
            })?;
        member
            .outbox
            .send(event)
            .map_err(|_| HuddleError::ChannelClosed)
    }

    pub async fn member_count(&self) -> usize {
        self.members.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.is_empty()
    }
}

fn deliver(
    members: &HashMap<ConnectionId, Member>,
    event: SignalEvent,
    exclude: Option<ConnectionId>,
) {
    for (connection_id, member) in members {
        if Some(*connection_id) == exclude {
            continue;
        }
        if member.outbox.send(event.clone()).is_err() {
            // Closed channel: the member disconnected mid-broadcast and
            // misses the event. Cleanup happens on its own departure path.
            tracing::debug!(
                connection = %connection_id,
                kind = event.kind(),
                "Dropped event for closed connection"
            );
        }
    }
}

/// All active rooms (room_id → Room).
#[derive(Clone, Default)]
pub struct RoomSet {
    rooms: Arc<RwLock<HashMap<Uuid, Arc<Room>>>>,
}

impl RoomSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the membership set for a room.
    pub async fn get_or_create(&self, room_id: Uuid) -> Arc<Room> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id)
            .or_insert_with(|| Arc::new(Room::new(room_id)))
            .clone()
    }

    pub async fn get(&self, room_id: Uuid) -> Option<Arc<Room>> {
        self.rooms.read().await.get(&room_id).cloned()
    }

    /// Drop a room's membership set (after it has ended).
    pub async fn remove(&self, room_id: Uuid) {
        self.rooms.write().await.remove(&room_id);
    }

    pub async fn active_rooms(&self) -> usize {
        self.rooms.read().await.len()
    }
}
