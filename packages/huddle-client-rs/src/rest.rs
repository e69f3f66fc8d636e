//! HTTP client for the join-time snapshot surface.
//!
//! Used once on room entry: create or resolve the caller's participant
//! record, then fetch the current participant and message lists. Everything
//! live goes over the signaling WebSocket afterwards.

use huddle_common::models::{ChatRecord, Participant, ParticipantType, Room};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ClientError, Result};

/// Client for the snapshot HTTP API.
#[derive(Clone)]
pub struct SnapshotClient {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(rename = "type")]
    participant_type: ParticipantType,
}

impl SnapshotClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Create a new room.
    pub async fn create_room(&self) -> Result<Room> {
        let response = self
            .http
            .post(format!("{}/rooms", self.base_url))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Fetch a room by id.
    pub async fn get_room(&self, room_id: Uuid) -> Result<Room> {
        let response = self
            .http
            .get(format!("{}/rooms/{room_id}", self.base_url))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Register a participant in the room, returning the record whose id the
    /// signaling join must present.
    pub async fn join_room(
        &self,
        room_id: Uuid,
        display_name: Option<&str>,
        participant_type: ParticipantType,
    ) -> Result<Participant> {
        let response = self
            .http
            .post(format!("{}/rooms/{room_id}/join", self.base_url))
            .json(&JoinRequest {
                display_name,
                participant_type,
            })
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Currently-active participants in the room.
    pub async fn participants(&self, room_id: Uuid) -> Result<Vec<Participant>> {
        let response = self
            .http
            .get(format!("{}/rooms/{room_id}/participants", self.base_url))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Recent chat messages for the room.
    pub async fn messages(&self, room_id: Uuid) -> Result<Vec<ChatRecord>> {
        let response = self
            .http
            .get(format!("{}/rooms/{room_id}/messages", self.base_url))
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        // Error bodies are `{"code": ..., "message": ...}`.
        let message = match response.json::<serde_json::Value>().await {
            Ok(body) => body["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string(),
            Err(_) => StatusCode::from_u16(status.as_u16())
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("unknown error")
                .to_string(),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slashes_are_stripped() {
        let client = SnapshotClient::new("http://localhost:3000///");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_join_request_serializes_camel_case() {
        let body = serde_json::to_value(JoinRequest {
            display_name: Some("Ada"),
            participant_type: ParticipantType::AiAgent,
        })
        .expect("serialize");
        assert_eq!(body["displayName"], "Ada");
        assert_eq!(body["type"], "ai_agent");
    }
}
