//! Snapshot data models shared between the signaling core, the directory
//! collaborator, and the client SDK.

pub mod message;
pub mod participant;
pub mod room;

pub use message::ChatRecord;
pub use participant::{Participant, ParticipantRole, ParticipantSummary, ParticipantType};
pub use room::{Room, RoomStatus};
