//! # huddle-signaling
//!
//! The real-time coordination core for multi-party rooms. Handles:
//! - Connection identity: which socket represents which participant
//! - Room membership and lifecycle/control event fan-out
//! - Relay of opaque session-negotiation envelopes between participants
//! - Presence reconciliation and the room-ending decision
//!
//! Media never flows through here — audio/video travels directly between
//! participants' media stacks. This layer only mediates how they find each
//! other and stay informed of room state.

pub mod directory;
pub mod handler;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod room;
pub mod snapshot;

pub use directory::{MemoryDirectory, RoomDirectory};
pub use handler::{Limits, SignalingState};
pub use presence::{DepartureReason, PresenceReconciler};
pub use registry::{Binding, ConnectionId, ConnectionRegistry};
pub use room::{Outbox, Room, RoomSet};

use axum::Router;
use std::sync::Arc;

/// Build the full service router: WebSocket signaling plus the join-time
/// snapshot surface, both over the same directory.
pub fn build_router(state: SignalingState) -> Router {
    let state = Arc::new(state);
    handler::build_router(Arc::clone(&state)).merge(snapshot::build_router(state))
}
