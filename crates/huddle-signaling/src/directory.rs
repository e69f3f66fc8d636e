//! Directory collaborator — the persistence boundary owning durable room,
//! participant, and message records.
//!
//! The signaling core consumes this as a trait: it reads active-participant
//! counts at departure time, marks departures, asks for rooms to end, and
//! records chat messages. Storage itself is out of scope here; the bundled
//! [`MemoryDirectory`] keeps everything in-process for the single-node server
//! and for tests.

use async_trait::async_trait;
use chrono::Utc;
use huddle_common::error::{HuddleError, HuddleResult};
use huddle_common::id::generate_id;
use huddle_common::models::{
    ChatRecord, Participant, ParticipantRole, ParticipantType, Room, RoomStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// External directory interface consumed by the coordination core.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn find_room(&self, room_id: Uuid) -> HuddleResult<Option<Room>>;

    async fn find_participant(&self, participant_id: Uuid) -> HuddleResult<Option<Participant>>;

    /// Participants of the room that have not been marked left.
    async fn find_active_participants(&self, room_id: Uuid) -> HuddleResult<Vec<Participant>>;

    /// Record that a participant left. Idempotent.
    async fn mark_left(&self, participant_id: Uuid) -> HuddleResult<()>;

    /// Transition the room to ended. Idempotent; returns true only on the
    /// call that actually performed the transition.
    async fn end_room(&self, room_id: Uuid) -> HuddleResult<bool>;

    async fn record_message(
        &self,
        room_id: Uuid,
        participant_id: Uuid,
        content: String,
        sender_name: Option<String>,
    ) -> HuddleResult<ChatRecord>;

    async fn room_messages(&self, room_id: Uuid, limit: usize) -> HuddleResult<Vec<ChatRecord>>;

    async fn create_room(&self) -> HuddleResult<Room>;

    async fn create_participant(
        &self,
        room_id: Uuid,
        display_name: Option<String>,
        participant_type: ParticipantType,
        role: ParticipantRole,
    ) -> HuddleResult<Participant>;
}

#[derive(Default)]
struct Records {
    rooms: HashMap<Uuid, Room>,
    participants: HashMap<Uuid, Participant>,
    messages: HashMap<Uuid, Vec<ChatRecord>>,
}

/// In-process directory for the single-node deployment and tests.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    records: Arc<RwLock<Records>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomDirectory for MemoryDirectory {
    async fn find_room(&self, room_id: Uuid) -> HuddleResult<Option<Room>> {
        Ok(self.records.read().await.rooms.get(&room_id).cloned())
    }

    async fn find_participant(&self, participant_id: Uuid) -> HuddleResult<Option<Participant>> {
        Ok(self
            .records
            .read()
            .await
            .participants
            .get(&participant_id)
            .cloned())
    }

    async fn find_active_participants(&self, room_id: Uuid) -> HuddleResult<Vec<Participant>> {
        Ok(self
            .records
            .read()
            .await
            .participants
            .values()
            .filter(|p| p.room_id == room_id && p.is_active())
            .cloned()
            .collect())
    }

    async fn mark_left(&self, participant_id: Uuid) -> HuddleResult<()> {
        let mut records = self.records.write().await;
        if let Some(participant) = records.participants.get_mut(&participant_id) {
            if participant.left_at.is_none() {
                participant.left_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn end_room(&self, room_id: Uuid) -> HuddleResult<bool> {
        let mut records = self.records.write().await;
        match records.rooms.get_mut(&room_id) {
            Some(room) if room.status == RoomStatus::Active => {
                room.status = RoomStatus::Ended;
                room.ended_at = Some(Utc::now());
                tracing::info!(room = %room_id, "Room ended");
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(HuddleError::NotFound {
                resource: format!("Room {room_id}"),
            }),
        }
    }

    async fn record_message(
        &self,
        room_id: Uuid,
        participant_id: Uuid,
        content: String,
        sender_name: Option<String>,
    ) -> HuddleResult<ChatRecord> {
        let record = ChatRecord {
            id: generate_id(),
            room_id,
            participant_id,
            content,
            sent_at: Utc::now(),
            sender_name,
        };
        self.records
            .write()
            .await
            .messages
            .entry(room_id)
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn room_messages(&self, room_id: Uuid, limit: usize) -> HuddleResult<Vec<ChatRecord>> {
        Ok(self
            .records
            .read()
            .await
            .messages
            .get(&room_id)
            .map(|messages| {
                messages
                    .iter()
                    .rev()
                    .take(limit)
                    .rev()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_room(&self) -> HuddleResult<Room> {
        let room = Room::new(generate_id());
        self.records
            .write()
            .await
            .rooms
            .insert(room.id, room.clone());
        Ok(room)
    }

    async fn create_participant(
        &self,
        room_id: Uuid,
        display_name: Option<String>,
        participant_type: ParticipantType,
        role: ParticipantRole,
    ) -> HuddleResult<Participant> {
        let mut records = self.records.write().await;
        match records.rooms.get(&room_id) {
            Some(room) if room.is_active() => {}
            Some(room) => {
                return Err(HuddleError::RoomNotActive { room_id: room.id });
            }
            None => {
                return Err(HuddleError::NotFound {
                    resource: format!("Room {room_id}"),
                });
            }
        }

        let participant = Participant {
            id: generate_id(),
            room_id,
            user_id: None,
            participant_type,
            role,
            joined_at: Utc::now(),
            left_at: None,
            display_name,
        };
        records
            .participants
            .insert(participant.id, participant.clone());
        Ok(participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_end_room_is_idempotent() {
        let directory = MemoryDirectory::new();
        let room = directory.create_room().await.expect("create room");

        assert!(directory.end_room(room.id).await.expect("first end"));
        assert!(!directory.end_room(room.id).await.expect("second end"));

        let stored = directory
            .find_room(room.id)
            .await
            .expect("find")
            .expect("room exists");
        assert_eq!(stored.status, RoomStatus::Ended);
        assert!(stored.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_mark_left_removes_from_active_set() {
        let directory = MemoryDirectory::new();
        let room = directory.create_room().await.expect("create room");
        let a = directory
            .create_participant(
                room.id,
                Some("A".into()),
                ParticipantType::User,
                ParticipantRole::Host,
            )
            .await
            .expect("participant");
        directory
            .create_participant(
                room.id,
                Some("B".into()),
                ParticipantType::User,
                ParticipantRole::Participant,
            )
            .await
            .expect("participant");

        directory.mark_left(a.id).await.expect("mark left");

        let active = directory
            .find_active_participants(room.id)
            .await
            .expect("active");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].display_name.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_join_rejected_for_ended_room() {
        let directory = MemoryDirectory::new();
        let room = directory.create_room().await.expect("create room");
        directory.end_room(room.id).await.expect("end");

        let result = directory
            .create_participant(room.id, None, ParticipantType::User, ParticipantRole::Participant)
            .await;
        assert!(matches!(result, Err(HuddleError::RoomNotActive { .. })));
    }

    #[tokio::test]
    async fn test_messages_are_recorded_in_order() {
        let directory = MemoryDirectory::new();
        let room = directory.create_room().await.expect("create room");
        let p = directory
            .create_participant(room.id, None, ParticipantType::User, ParticipantRole::Host)
            .await
            .expect("participant");

        for n in 0..3 {
            directory
                .record_message(room.id, p.id, format!("msg {n}"), None)
                .await
                .expect("record");
        }

        let messages = directory.room_messages(room.id, 100).await.expect("list");
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["msg 0", "msg 1", "msg 2"]);

        let limited = directory.room_messages(room.id, 2).await.expect("list");
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].content, "msg 1");
    }
}
