//! Signaling event vocabulary — shared between the server and client crates.
//!
//! These are the envelopes exchanged over the persistent WebSocket connection.
//! SDP and ICE payloads are carried as opaque JSON: the coordination layer
//! relays them verbatim and never inspects their structure — that belongs to
//! the media transport on each end.

use crate::models::participant::{ParticipantSummary, ParticipantType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Signaling events (bidirectional).
///
/// Wire format is `{"type": "...", "data": {...}}` with kebab-case event
/// names and camelCase field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SignalEvent {
    /// Client → Server: bind this connection to a participant and join a room.
    JoinRoom {
        room_id: Uuid,
        participant_id: Uuid,
        display_name: Option<String>,
        #[serde(rename = "type", default)]
        participant_type: ParticipantType,
    },

    /// Server → Client: join accepted, the connection is bound.
    Joined {
        room_id: Uuid,
        participant_id: Uuid,
    },

    /// Client → Server: leave the room explicitly.
    LeaveRoom {
        room_id: Uuid,
        participant_id: Uuid,
    },

    /// Server → Client: another participant joined the room.
    ParticipantJoined {
        room_id: Uuid,
        participant: ParticipantSummary,
    },

    /// Server → Client: a participant left (explicitly or by disconnect).
    ParticipantLeft {
        room_id: Uuid,
        participant_id: Uuid,
    },

    /// Session-negotiation offer. Inbound envelopes carry the target; the
    /// relayed copy is annotated with the sender only.
    Offer {
        room_id: Uuid,
        participant_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        target_participant_id: Option<Uuid>,
        /// Opaque SDP blob — relayed verbatim.
        sdp: serde_json::Value,
    },

    /// Session-negotiation answer. Same addressing rules as `Offer`.
    Answer {
        room_id: Uuid,
        participant_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        target_participant_id: Option<Uuid>,
        sdp: serde_json::Value,
    },

    /// ICE candidate. Delivered to the target in the exact order the sender
    /// issued them (single ordered channel per connection).
    IceCandidate {
        room_id: Uuid,
        participant_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        target_participant_id: Option<Uuid>,
        /// Opaque candidate blob — relayed verbatim.
        candidate: serde_json::Value,
    },

    /// Advisory: the participant toggled their camera.
    ToggleVideo {
        room_id: Uuid,
        participant_id: Uuid,
        video_enabled: bool,
    },

    /// Advisory: the participant toggled their microphone.
    ToggleAudio {
        room_id: Uuid,
        participant_id: Uuid,
        audio_enabled: bool,
    },

    ScreenShareStart {
        room_id: Uuid,
        participant_id: Uuid,
    },

    ScreenShareStop {
        room_id: Uuid,
        participant_id: Uuid,
    },

    /// Chat message — recorded via the directory, then fanned out to the
    /// whole room including the sender.
    ChatMessage {
        room_id: Uuid,
        participant_id: Uuid,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        sender_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        sent_at: Option<DateTime<Utc>>,
    },

    /// Server → Client: the room transitioned to ended.
    RoomEnded {
        room_id: Uuid,
    },

    /// Server → Client: protocol-level error.
    Error {
        code: u32,
        message: String,
    },
}

impl SignalEvent {
    /// The wire name of this event kind (the serde tag).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join-room",
            Self::Joined { .. } => "joined",
            Self::LeaveRoom { .. } => "leave-room",
            Self::ParticipantJoined { .. } => "participant-joined",
            Self::ParticipantLeft { .. } => "participant-left",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::ToggleVideo { .. } => "toggle-video",
            Self::ToggleAudio { .. } => "toggle-audio",
            Self::ScreenShareStart { .. } => "screen-share-start",
            Self::ScreenShareStop { .. } => "screen-share-stop",
            Self::ChatMessage { .. } => "chat-message",
            Self::RoomEnded { .. } => "room-ended",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_are_kebab_case() {
        let event = SignalEvent::IceCandidate {
            room_id: Uuid::nil(),
            participant_id: Uuid::nil(),
            target_participant_id: None,
            candidate: serde_json::json!({"candidate": "candidate:0 1 UDP"}),
        };
        let wire = serde_json::to_value(&event).expect("serialize");
        assert_eq!(wire["type"], "ice-candidate");
        assert_eq!(wire["data"]["candidate"]["candidate"], "candidate:0 1 UDP");
    }

    #[test]
    fn test_sdp_payload_survives_round_trip_untouched() {
        let sdp = serde_json::json!({
            "type": "offer",
            "sdp": "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n",
            "vendorExtension": {"nested": [1, 2, 3]},
        });
        let event = SignalEvent::Offer {
            room_id: Uuid::new_v4(),
            participant_id: Uuid::new_v4(),
            target_participant_id: Some(Uuid::new_v4()),
            sdp: sdp.clone(),
        };
        let text = serde_json::to_string(&event).expect("serialize");
        let back: SignalEvent = serde_json::from_str(&text).expect("deserialize");
        match back {
            SignalEvent::Offer { sdp: got, .. } => assert_eq!(got, sdp),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_join_room_fields_are_camel_case() {
        let text = r#"{
            "type": "join-room",
            "data": {
                "roomId": "0192c7a0-0000-7000-8000-000000000001",
                "participantId": "0192c7a0-0000-7000-8000-000000000002",
                "displayName": "Ada",
                "type": "user"
            }
        }"#;
        let event: SignalEvent = serde_json::from_str(text).expect("deserialize");
        match event {
            SignalEvent::JoinRoom { display_name, .. } => {
                assert_eq!(display_name.as_deref(), Some("Ada"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
