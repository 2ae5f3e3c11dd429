//! Shared Module
//!
//! Types shared by the realtime backend seam and the call layer. These are
//! plain values: identities, the signaling wire types, the presence roster,
//! boundary errors and configuration.
//!
//! # Overview
//!
//! Nothing in this module performs I/O except configuration loading. All
//! signaling types serialize to the JSON shape the web client already uses
//! on the realtime topic.

/// Shared error types
pub mod error;

/// Call configuration
pub mod config;

/// Signaling identities, messages and presence
pub mod signaling;

/// Re-export commonly used types for convenience
pub use config::{CallConfig, CallConfigBuilder, ConfigError, IceServer};
pub use error::SharedError;
pub use signaling::{
    IceCandidate, ParticipantId, PresenceMeta, RoomId, Roster, SdpType, SessionDescription,
    SignalKind, SignalingMessage,
};
