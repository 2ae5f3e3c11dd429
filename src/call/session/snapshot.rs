//! Read-only view of a call session for the presentation layer

use super::lifecycle::CallState;
use crate::call::error::CallError;
use crate::call::media::MediaStream;
use crate::call::peer::RemoteStream;
use crate::shared::{ParticipantId, RoomId};
use std::collections::BTreeMap;

/// Everything the UI renders, published on every change
#[derive(Debug, Clone)]
pub struct CallSnapshot {
    pub state: CallState,
    pub room: Option<RoomId>,
    pub local: Option<ParticipantId>,
    /// Local preview; `None` once media is released
    pub local_stream: Option<MediaStream>,
    pub mic_enabled: bool,
    pub video_enabled: bool,
    /// Other participants in the room, as last seen through presence
    pub peers: Vec<ParticipantId>,
    /// Participants with a peer-connection entry
    pub connections: Vec<ParticipantId>,
    /// Participants whose connection has reached `Connected`
    pub connected_peers: Vec<ParticipantId>,
    pub remote_streams: BTreeMap<ParticipantId, RemoteStream>,
    /// Error that ended the session
    pub error: Option<CallError>,
    /// Most recent per-peer failure; the session carried on
    pub last_peer_error: Option<CallError>,
}

impl Default for CallSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

impl CallSnapshot {
    pub fn idle() -> Self {
        Self {
            state: CallState::Idle,
            room: None,
            local: None,
            local_stream: None,
            mic_enabled: false,
            video_enabled: false,
            peers: Vec::new(),
            connections: Vec::new(),
            connected_peers: Vec::new(),
            remote_streams: BTreeMap::new(),
            error: None,
            last_peer_error: None,
        }
    }

    /// Snapshot of a session that has just been requested
    pub fn connecting(room: RoomId, local: ParticipantId) -> Self {
        Self {
            state: CallState::Connecting,
            room: Some(room),
            local: Some(local),
            ..Self::idle()
        }
    }

    /// Turn this snapshot into the final one of its session
    pub fn end(&mut self, error: Option<CallError>) {
        self.state = CallState::Ended;
        self.local_stream = None;
        self.mic_enabled = false;
        self.video_enabled = false;
        self.peers.clear();
        self.connections.clear();
        self.connected_peers.clear();
        self.remote_streams.clear();
        if error.is_some() {
            self.error = error;
        }
    }

    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    /// Notice to show for the error that ended the session
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(CallError::user_message)
    }
}
