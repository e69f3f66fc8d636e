//! Signaling relay — forwards negotiation envelopes to one named target.
//!
//! The relay resolves the target participant through the registry restricted
//! to the envelope's room, then pushes the envelope onto the target
//! connection's ordered channel. Payloads are never parsed, validated, or
//! mutated; the relayed copy only drops the target field and keeps the
//! sender's id attached.
//!
//! An unresolved target is a silent no-op — the documented best-effort
//! contract. The sender gets neither an error nor a timeout.

use crate::registry::ConnectionRegistry;
use crate::room::RoomSet;
use huddle_common::event::SignalEvent;
use uuid::Uuid;

/// The addressing fields of a relayable envelope.
fn addressing(event: &SignalEvent) -> Option<(Uuid, Uuid, Option<Uuid>)> {
    match event {
        SignalEvent::Offer {
            room_id,
            participant_id,
            target_participant_id,
            ..
        }
        | SignalEvent::Answer {
            room_id,
            participant_id,
            target_participant_id,
            ..
        }
        | SignalEvent::IceCandidate {
            room_id,
            participant_id,
            target_participant_id,
            ..
        } => Some((*room_id, *participant_id, *target_participant_id)),
        _ => None,
    }
}

/// The delivered copy: target stripped, sender annotation kept, payload
/// untouched.
fn annotated(event: SignalEvent) -> SignalEvent {
    match event {
        SignalEvent::Offer {
            room_id,
            participant_id,
            sdp,
            ..
        } => SignalEvent::Offer {
            room_id,
            participant_id,
            target_participant_id: None,
            sdp,
        },
        SignalEvent::Answer {
            room_id,
            participant_id,
            sdp,
            ..
        } => SignalEvent::Answer {
            room_id,
            participant_id,
            target_participant_id: None,
            sdp,
        },
        SignalEvent::IceCandidate {
            room_id,
            participant_id,
            candidate,
            ..
        } => SignalEvent::IceCandidate {
            room_id,
            participant_id,
            target_participant_id: None,
            candidate,
        },
        other => other,
    }
}

/// Relay one envelope. Completes successfully whether or not the target was
/// reachable.
pub async fn relay(registry: &ConnectionRegistry, rooms: &RoomSet, event: SignalEvent) {
    let Some((room_id, sender_id, target)) = addressing(&event) else {
        tracing::warn!(kind = event.kind(), "Event kind is not relayable");
        return;
    };
    let Some(target_id) = target else {
        tracing::debug!(
            kind = event.kind(),
            sender = %sender_id,
            "Relay envelope without target dropped"
        );
        return;
    };

    let Some(connection_id) = registry.lookup(target_id, room_id).await else {
        // Target not connected: deliberate fire-and-forget, nothing surfaces
        // to the sender.
        tracing::debug!(
            kind = event.kind(),
            sender = %sender_id,
            target = %target_id,
            room = %room_id,
            "Relay target not connected"
        );
        return;
    };

    let Some(room) = rooms.get(room_id).await else {
        return;
    };

    tracing::debug!(
        kind = event.kind(),
        sender = %sender_id,
        target = %target_id,
        "Relaying envelope"
    );

    if let Err(e) = room.send_to(connection_id, annotated(event)).await {
        tracing::debug!(
            target = %target_id,
            error = %e,
            "Relay delivery dropped"
        );
    }
}
