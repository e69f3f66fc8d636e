//! Join-time snapshot surface.
//!
//! A thin read/join HTTP facade over the directory collaborator. Clients hit
//! it once when entering a room: create (or resolve) their participant
//! record, then fetch the current participant and message lists. Everything
//! live flows over the WebSocket afterwards.

use crate::handler::SignalingState;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use huddle_common::error::HuddleError;
use huddle_common::models::{ChatRecord, Participant, ParticipantRole, ParticipantType, Room};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_MESSAGE_LIMIT: usize = 100;

/// Build the snapshot router.
pub fn build_router(state: Arc<SignalingState>) -> Router {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{room_id}", get(get_room))
        .route("/rooms/{room_id}/join", post(join_room))
        .route("/rooms/{room_id}/participants", get(list_participants))
        .route("/rooms/{room_id}/messages", get(list_messages))
        .with_state(state)
}

struct ApiError(HuddleError);

impl From<HuddleError> for ApiError {
    fn from(err: HuddleError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            HuddleError::Validation { .. } | HuddleError::RoomNotActive { .. } => {
                StatusCode::BAD_REQUEST
            }
            HuddleError::NotFound { .. } => StatusCode::NOT_FOUND,
            HuddleError::ChannelClosed | HuddleError::Directory(_) | HuddleError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self.0 {
            HuddleError::Directory(e) => {
                tracing::error!("Directory error: {e}");
                "An internal error occurred".to_string()
            }
            HuddleError::Internal(e) => {
                tracing::error!("Internal error: {e}");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        let body = serde_json::json!({
            "code": status.as_u16(),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

async fn create_room(
    State(state): State<Arc<SignalingState>>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(state.directory.create_room().await?))
}

async fn get_room(
    State(state): State<Arc<SignalingState>>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<Room>, ApiError> {
    let room = state
        .directory
        .find_room(room_id)
        .await?
        .ok_or_else(|| HuddleError::NotFound {
            resource: format!("Room {room_id}"),
        })?;
    Ok(Json(room))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest {
    display_name: Option<String>,
    #[serde(rename = "type", default)]
    participant_type: ParticipantType,
}

async fn join_room(
    State(state): State<Arc<SignalingState>>,
    Path(room_id): Path<Uuid>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<Participant>, ApiError> {
    if let Some(name) = &request.display_name {
        if name.chars().count() > state.limits.max_display_name_length {
            return Err(HuddleError::Validation {
                message: "Display name too long".into(),
            }
            .into());
        }
    }
    let participant = state
        .directory
        .create_participant(
            room_id,
            request.display_name,
            request.participant_type,
            ParticipantRole::Participant,
        )
        .await?;
    Ok(Json(participant))
}

async fn list_participants(
    State(state): State<Arc<SignalingState>>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<Vec<Participant>>, ApiError> {
    Ok(Json(
        state.directory.find_active_participants(room_id).await?,
    ))
}

async fn list_messages(
    State(state): State<Arc<SignalingState>>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<Vec<ChatRecord>>, ApiError> {
    Ok(Json(
        state
            .directory
            .room_messages(room_id, DEFAULT_MESSAGE_LIMIT)
            .await?,
    ))
}
