//! # Huddle Client
//!
//! Rust client library for Huddle multi-party rooms.
//!
//! The pieces compose bottom-up:
//!
//! - [`rest::SnapshotClient`] — join-time HTTP snapshot (rooms,
//!   participants, messages)
//! - [`transport::SignalTransport`] — the persistent signaling WebSocket
//!   with automatic reconnection
//! - [`peer::PeerSession`] — offer/answer negotiation per remote, driving a
//!   [`peer::MediaSession`] you provide
//! - [`room::RoomSession`] — one joined room: peer lifecycle, event routing,
//!   quality sampling
//!
//! ```no_run
//! use huddle_client::rest::SnapshotClient;
//! use huddle_client::room::RoomSession;
//! use huddle_client::transport::{ReconnectPolicy, SignalTransport};
//! use huddle_common::models::ParticipantType;
//! use std::sync::Arc;
//!
//! # async fn example(factory: Arc<dyn huddle_client::room::MediaFactory>) -> huddle_client::Result<()> {
//! let api = SnapshotClient::new("http://127.0.0.1:3000");
//! let room = api.create_room().await?;
//! let me = api.join_room(room.id, Some("Ada"), ParticipantType::User).await?;
//!
//! let transport = Arc::new(SignalTransport::new(
//!     "ws://127.0.0.1:3000/signal",
//!     ReconnectPolicy::default(),
//! ));
//! transport.connect()?;
//!
//! let session = RoomSession::join(
//!     transport,
//!     factory,
//!     room.id,
//!     me.id,
//!     me.display_name.clone(),
//!     ParticipantType::User,
//! )?;
//! session.send_chat("hello")?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod peer;
pub mod rest;
pub mod room;
pub mod stats;
pub mod transport;

pub use error::{ClientError, Result};
pub use peer::{MediaSession, NegotiationState, PeerSession};
pub use rest::SnapshotClient;
pub use room::{MediaFactory, RoomSession, RoomUpdate};
pub use stats::{QualityBand, SessionStats};
pub use transport::{ReconnectPolicy, SignalTransport, TransportState};

// Shared event vocabulary, re-exported for convenience.
pub use huddle_common::event::SignalEvent;
