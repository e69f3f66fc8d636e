//! Participant model — a logical identity within a room, distinct from the
//! transient connection representing it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Host,
    Participant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantType {
    #[default]
    User,
    AiAgent,
}

/// Full participant record as held by the directory collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: Uuid,
    pub room_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub participant_type: ParticipantType,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub left_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub display_name: Option<String>,
}

impl Participant {
    /// Still present in the room (has not been marked left).
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }

    pub fn summary(&self) -> ParticipantSummary {
        ParticipantSummary {
            id: self.id,
            display_name: self.display_name.clone(),
            participant_type: self.participant_type,
            role: self.role,
        }
    }
}

/// The subset of participant data announced in `participant-joined` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub display_name: Option<String>,
    #[serde(rename = "type")]
    pub participant_type: ParticipantType,
    pub role: ParticipantRole,
}
