//! Centralized error types for Huddle.
//!
//! Uses `thiserror` for ergonomic error definitions. Protocol-level errors
//! carry a numeric code that is surfaced to clients in `error` events.

/// Core application error type used across the Huddle services.
#[derive(Debug, thiserror::Error)]
pub enum HuddleError {
    // === Validation errors ===
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // === Resource errors ===
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("Room {room_id} is not active")]
    RoomNotActive { room_id: uuid::Uuid },

    // === Delivery errors ===
    #[error("Connection channel closed")]
    ChannelClosed,

    // === Collaborator errors ===
    #[error("Directory error: {0}")]
    Directory(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl HuddleError {
    /// Numeric code surfaced to clients in protocol `error` events.
    pub fn protocol_code(&self) -> u32 {
        match self {
            Self::Validation { .. } => 4000,
            Self::NotFound { .. } => 4004,
            Self::RoomNotActive { .. } => 4005,
            Self::ChannelClosed => 4006,
            Self::Directory(_) | Self::Internal(_) => 5000,
        }
    }
}

/// Convenience type alias for Results using HuddleError.
pub type HuddleResult<T> = Result<T, HuddleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_codes() {
        let err = HuddleError::Validation {
            message: "missing participantId".into(),
        };
        assert_eq!(err.protocol_code(), 4000);

        let err = HuddleError::NotFound {
            resource: "Room".into(),
        };
        assert_eq!(err.protocol_code(), 4004);
    }
}
