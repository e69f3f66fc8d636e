//! Room model — lifecycle state is owned by the directory collaborator, the
//! coordination layer only reads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Room lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Active,
    Ended,
}

/// A logical session grouping participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: Uuid,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub participant_count: Option<usize>,
}

impl Room {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            status: RoomStatus::Active,
            created_at: Utc::now(),
            ended_at: None,
            participant_count: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RoomStatus::Active
    }
}
