//! Call Error Taxonomy
//!
//! # Session-fatal
//!
//! - `MediaAccess` - local capture failed; the session ends before any
//!   signaling is attempted
//! - `SignalingUnavailable` - the room topic could not be joined or was
//!   dropped mid-call; the session is torn down
//!
//! # Per-peer
//!
//! - `Negotiation` - the transport rejected an offer, answer or candidate;
//!   only that peer's connection is discarded
//! - `PeerConnectionFailure` - an established connection failed; handled
//!   like the peer leaving
//!
//! Nothing is retried. A failed peer is not redialed.

use crate::backend::realtime::RealtimeError;
use crate::call::media::MediaAccessError;
use crate::shared::{ParticipantId, SharedError};
use std::fmt;
use thiserror::Error;

/// Errors surfaced by the call layer
#[derive(Debug, Error, Clone)]
pub enum CallError {
    #[error("media access failed: {0}")]
    MediaAccess(#[from] MediaAccessError),

    #[error("signaling unavailable: {reason}")]
    SignalingUnavailable { reason: String },

    #[error("negotiation with {peer} failed: {reason}")]
    Negotiation { peer: ParticipantId, reason: String },

    #[error("connection to {peer} failed")]
    PeerConnectionFailure { peer: ParticipantId },

    #[error("invalid call request: {0}")]
    InvalidRequest(#[from] SharedError),

    /// A continuation observed that the session had already ended
    #[error("call session has ended")]
    SessionEnded,
}

impl CallError {
    pub fn negotiation(peer: &ParticipantId, reason: impl fmt::Display) -> Self {
        Self::Negotiation {
            peer: peer.clone(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error ends the whole session
    pub fn is_fatal(&self) -> bool {
        matches!(self, CallError::MediaAccess(_) | CallError::SignalingUnavailable { .. })
    }

    /// Peer the error is about, for per-peer errors
    pub fn peer(&self) -> Option<&ParticipantId> {
        match self {
            CallError::Negotiation { peer, .. } | CallError::PeerConnectionFailure { peer } => Some(peer),
            _ => None,
        }
    }

    /// Notice shown to the user
    pub fn user_message(&self) -> String {
        match self {
            CallError::MediaAccess(_) => "Failed to access media or connect.".to_string(),
            CallError::SignalingUnavailable { .. } => "Call failed.".to_string(),
            CallError::Negotiation { peer, .. } | CallError::PeerConnectionFailure { peer } => {
                format!("Lost connection to {}.", peer)
            }
            CallError::InvalidRequest(_) | CallError::SessionEnded => "Call failed.".to_string(),
        }
    }
}

impl From<RealtimeError> for CallError {
    fn from(err: RealtimeError) -> Self {
        CallError::SignalingUnavailable {
            reason: err.to_string(),
        }
    }
}
