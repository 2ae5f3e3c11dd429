//! Signaling Types
//!
//! Value types shared by everything that speaks the call signaling protocol:
//!
//! - `ParticipantId` / `RoomId` - validated identities
//! - `SignalingMessage` - offer / answer / ICE-candidate messages
//! - `Roster` - presence-derived room membership

pub mod identity;
pub mod message;
pub mod presence;

pub use identity::{ParticipantId, RoomId};
pub use message::{IceCandidate, SdpType, SessionDescription, SignalKind, SignalingMessage};
pub use presence::{PresenceMeta, Roster};
