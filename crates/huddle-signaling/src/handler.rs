//! Signaling WebSocket handler.
//!
//! One socket per participant:
//!
//! 1. Client connects to /signal
//! 2. Sends "join-room" with the participant created at the REST join
//! 3. Server binds the connection, announces the arrival to the room
//! 4. Clients exchange offer/answer/ICE envelopes through the relay
//! 5. Media toggles and chat fan out to the room
//! 6. Explicit "leave-room" or socket close → presence reconciliation
//!
//! Outbound delivery goes through a single ordered channel per connection,
//! drained by one writer task — relayed envelopes from a given sender reach
//! the socket in the order they were relayed.

use crate::directory::RoomDirectory;
use crate::presence::{DepartureReason, PresenceReconciler};
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::relay;
use crate::room::{Outbox, RoomSet};
use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use huddle_common::error::{HuddleError, HuddleResult};
use huddle_common::event::SignalEvent;
use huddle_common::models::{ParticipantSummary, ParticipantType};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Payload limits enforced at the service edge.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_message_length: usize,
    pub max_display_name_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_message_length: 4_000,
            max_display_name_length: 64,
        }
    }
}

/// Coordination-service state shared across all signaling connections.
/// Explicitly constructed and passed to handlers — nothing global.
#[derive(Clone)]
pub struct SignalingState {
    pub registry: ConnectionRegistry,
    pub rooms: RoomSet,
    pub directory: Arc<dyn RoomDirectory>,
    pub presence: PresenceReconciler,
    pub limits: Limits,
}

impl SignalingState {
    pub fn new(directory: Arc<dyn RoomDirectory>) -> Self {
        let registry = ConnectionRegistry::new();
        let rooms = RoomSet::new();
        let presence = PresenceReconciler::new(registry.clone(), rooms.clone(), directory.clone());
        Self {
            registry,
            rooms,
            directory,
            presence,
            limits: Limits::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

/// Build the signaling WebSocket router.
pub fn build_router(state: Arc<SignalingState>) -> Router {
    Router::new()
        .route("/signal", get(ws_handler))
        .with_state(state)
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<SignalingState>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Handle a single signaling WebSocket connection.
async fn handle_connection(socket: WebSocket, state: Arc<SignalingState>) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id: ConnectionId = Uuid::new_v4();

    // The connection's single ordered outbox, drained by one writer task.
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<SignalEvent>();

    let write_task = tokio::spawn(async move {
        while let Some(event) = outbox_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    tracing::debug!(connection = %connection_id, "Signaling WebSocket connected");

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let event = match serde_json::from_str::<SignalEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        send_error(
                            &outbox,
                            4000,
                            &format!("Invalid message: {e}"),
                        );
                        continue;
                    }
                };
                dispatch(&state, connection_id, &outbox, event).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Cleanup on disconnect — a no-op if the client left explicitly.
    if let Err(e) = state
        .presence
        .handle_departure(connection_id, DepartureReason::TransportDisconnect)
        .await
    {
        tracing::warn!(connection = %connection_id, error = %e, "Departure cleanup failed");
    }

    write_task.abort();
    tracing::debug!(connection = %connection_id, "Signaling WebSocket disconnected");
}

async fn dispatch(
    state: &SignalingState,
    connection_id: ConnectionId,
    outbox: &Outbox,
    event: SignalEvent,
) {
    match event {
        SignalEvent::JoinRoom {
            room_id,
            participant_id,
            display_name,
            participant_type,
        } => {
            match prepare_join(
                state.directory.as_ref(),
                room_id,
                participant_id,
                display_name,
                participant_type,
            )
            .await
            {
                Ok(summary) => {
                    // A connection re-joining as a different (participant,
                    // room) departs its previous room first; otherwise the
                    // old room keeps a phantom member and can never end.
                    if let Some(previous) = state.registry.binding(connection_id).await {
                        if previous.room_id != room_id
                            || previous.participant_id != participant_id
                        {
                            if let Err(e) = state
                                .presence
                                .handle_departure(connection_id, DepartureReason::ExplicitLeave)
                                .await
                            {
                                tracing::warn!(
                                    connection = %connection_id,
                                    error = %e,
                                    "Failed to unwind previous room on rejoin"
                                );
                            }
                        }
                    }
                    state
                        .registry
                        .bind(
                            connection_id,
                            participant_id,
                            room_id,
                            summary.display_name.clone(),
                        )
                        .await;
                    let room = state.rooms.get_or_create(room_id).await;
                    room.join(connection_id, summary, outbox.clone()).await;

                    let _ = outbox.send(SignalEvent::Joined {
                        room_id,
                        participant_id,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        connection = %connection_id,
                        error = %err,
                        "Join rejected"
                    );
                    send_error(outbox, err.protocol_code(), &err.to_string());
                }
            }
        }

        SignalEvent::LeaveRoom { .. } => {
            if let Err(e) = state
                .presence
                .handle_departure(connection_id, DepartureReason::ExplicitLeave)
                .await
            {
                tracing::warn!(connection = %connection_id, error = %e, "Leave failed");
            }
        }

        SignalEvent::Offer { .. } | SignalEvent::Answer { .. } | SignalEvent::IceCandidate { .. } => {
            let Some(binding) = state.registry.binding(connection_id).await else {
                send_error(outbox, 4003, "Not in a room");
                return;
            };
            // The relay annotates envelopes with the authoritative sender
            // identity, not whatever the payload claimed.
            let event = stamp_sender(event, binding.participant_id, binding.room_id);
            relay::relay(&state.registry, &state.rooms, event).await;
        }

        SignalEvent::ToggleVideo { .. }
        | SignalEvent::ToggleAudio { .. }
        | SignalEvent::ScreenShareStart { .. }
        | SignalEvent::ScreenShareStop { .. } => {
            let Some(binding) = state.registry.binding(connection_id).await else {
                send_error(outbox, 4003, "Not in a room");
                return;
            };
            let Some(room) = state.rooms.get(binding.room_id).await else {
                return;
            };
            // Pass-through, advisory only: no validation, no persistence.
            let event = stamp_sender(event, binding.participant_id, binding.room_id);
            room.broadcast(event, Some(connection_id)).await;
        }

        SignalEvent::ChatMessage { content, .. } => {
            let Some(binding) = state.registry.binding(connection_id).await else {
                send_error(outbox, 4003, "Not in a room");
                return;
            };
            let content = content.trim().to_owned();
            if content.is_empty() {
                send_error(outbox, 4000, "Empty chat message");
                return;
            }
            if content.chars().count() > state.limits.max_message_length {
                send_error(outbox, 4000, "Chat message too long");
                return;
            }
            let Some(room) = state.rooms.get(binding.room_id).await else {
                return;
            };

            match state
                .directory
                .record_message(
                    binding.room_id,
                    binding.participant_id,
                    content,
                    binding.display_name.clone(),
                )
                .await
            {
                Ok(record) => {
                    // Chat echoes to the whole room, sender included.
                    room.broadcast(
                        SignalEvent::ChatMessage {
                            room_id: record.room_id,
                            participant_id: record.participant_id,
                            content: record.content,
                            sender_name: record.sender_name,
                            sent_at: Some(record.sent_at),
                        },
                        None,
                    )
                    .await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to record chat message");
                    send_error(outbox, e.protocol_code(), &e.to_string());
                }
            }
        }

        // Server → Client kinds are not accepted from clients.
        SignalEvent::Joined { .. }
        | SignalEvent::ParticipantJoined { .. }
        | SignalEvent::ParticipantLeft { .. }
        | SignalEvent::RoomEnded { .. }
        | SignalEvent::Error { .. } => {
            send_error(outbox, 4000, "Invalid event direction");
        }
    }
}

/// Validate a join request against the directory. Rejects missing
/// identifiers and rooms or participants the directory does not consider
/// active — no binding is created on rejection.
pub(crate) async fn prepare_join(
    directory: &dyn RoomDirectory,
    room_id: Uuid,
    participant_id: Uuid,
    display_name: Option<String>,
    participant_type: ParticipantType,
) -> HuddleResult<ParticipantSummary> {
    if room_id.is_nil() || participant_id.is_nil() {
        return Err(HuddleError::Validation {
            message: "Missing participant or room identifier".into(),
        });
    }

    let room = directory
        .find_room(room_id)
        .await?
        .ok_or_else(|| HuddleError::NotFound {
            resource: format!("Room {room_id}"),
        })?;
    if !room.is_active() {
        return Err(HuddleError::RoomNotActive { room_id });
    }

    let participant =
        directory
            .find_participant(participant_id)
            .await?
            .ok_or_else(|| HuddleError::NotFound {
                resource: format!("Participant {participant_id}"),
            })?;
    if participant.room_id != room_id {
        return Err(HuddleError::Validation {
            message: "Participant does not belong to this room".into(),
        });
    }

    let mut summary = participant.summary();
    if summary.display_name.is_none() {
        summary.display_name = display_name;
    }
    if summary.participant_type != participant_type {
        // Directory record wins; the payload hint is advisory.
        tracing::debug!(participant = %participant_id, "Participant type mismatch in join");
    }
    Ok(summary)
}

/// Rewrite an envelope's identity fields with the connection's authoritative
/// binding.
fn stamp_sender(event: SignalEvent, sender: Uuid, room: Uuid) -> SignalEvent {
    match event {
        SignalEvent::Offer {
            target_participant_id,
            sdp,
            ..
        } => SignalEvent::Offer {
            room_id: room,
            participant_id: sender,
            target_participant_id,
            sdp,
        },
        SignalEvent::Answer {
            target_participant_id,
            sdp,
            ..
        } => SignalEvent::Answer {
            room_id: room,
            participant_id: sender,
            target_participant_id,
            sdp,
        },
        SignalEvent::IceCandidate {
            target_participant_id,
            candidate,
            ..
        } => SignalEvent::IceCandidate {
            room_id: room,
            participant_id: sender,
            target_participant_id,
            candidate,
        },
        SignalEvent::ToggleVideo { video_enabled, .. } => SignalEvent::ToggleVideo {
            room_id: room,
            participant_id: sender,
            video_enabled,
        },
        SignalEvent::ToggleAudio { audio_enabled, .. } => SignalEvent::ToggleAudio {
            room_id: room,
            participant_id: sender,
            audio_enabled,
        },
        SignalEvent::ScreenShareStart { .. } => SignalEvent::ScreenShareStart {
            room_id: room,
            participant_id: sender,
        },
        SignalEvent::ScreenShareStop { .. } => SignalEvent::ScreenShareStop {
            room_id: room,
            participant_id: sender,
        },
        other => other,
    }
}

fn send_error(outbox: &Outbox, code: u32, message: &str) {
    let _ = outbox.send(SignalEvent::Error {
        code,
        message: message.to_owned(),
    });
}
