//! Media Transport Seam
//!
//! The peer connection manager drives connections through the traits in this
//! module and never touches a concrete RTC stack.
//!
//! - **`loopback`** - in-process transport that models the offer/answer
//!   signaling states and emits candidates, tracks and state changes; used by
//!   the demo binary and the tests
//! - **`webrtc_rs`** - transport backed by the `webrtc` crate (feature
//!   `webrtc-rs`)
//!
//! Connections report asynchronous facts through a [`PeerEventSink`]. Each
//! sink is stamped with the remote participant and a generation number so
//! events from a connection that has since been replaced can be told apart.

pub mod loopback;

#[cfg(feature = "webrtc-rs")]
pub mod webrtc_rs;

pub use loopback::{LoopbackConnection, LoopbackTransport};

use crate::call::media::{MediaTrack, TrackKind};
use crate::shared::{IceCandidate, IceServer, ParticipantId, SessionDescription};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Offer/answer state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

impl SignalingState {
    /// Only a connection waiting on its own offer can take an answer
    pub fn accepts_answer(self) -> bool {
        matches!(self, SignalingState::HaveLocalOffer | SignalingState::HaveRemotePranswer)
    }
}

/// Transport-level connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Failed and closed connections are never recovered
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

/// A track received from a remote participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
    pub stream_id: String,
    pub enabled: bool,
    pub ended: bool,
}

/// Something a connection observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Local ICE candidate to relay to the remote participant
    IceCandidate(IceCandidate),
    /// Remote media arrived
    Track(RemoteTrack),
    TrackMuted { track_id: String },
    TrackUnmuted { track_id: String },
    TrackEnded { track_id: String },
    ConnectionStateChanged(ConnectionState),
}

/// Event tagged with the connection it came from
#[derive(Debug, Clone)]
pub struct PeerEventEnvelope {
    pub remote: ParticipantId,
    pub generation: u64,
    pub event: PeerEvent,
}

/// Where a connection sends its events
#[derive(Debug, Clone)]
pub struct PeerEventSink {
    remote: ParticipantId,
    generation: u64,
    tx: mpsc::UnboundedSender<PeerEventEnvelope>,
}

impl PeerEventSink {
    pub fn new(remote: ParticipantId, generation: u64, tx: mpsc::UnboundedSender<PeerEventEnvelope>) -> Self {
        Self { remote, generation, tx }
    }

    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue an event; false once the session stopped listening
    pub fn emit(&self, event: PeerEvent) -> bool {
        self.tx
            .send(PeerEventEnvelope {
                remote: self.remote.clone(),
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Media transport errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("{operation} not allowed in signaling state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SignalingState,
    },
    #[error("connection is closed")]
    Closed,
    #[error("rejected by transport: {0}")]
    Rejected(String),
}

/// One peer-to-peer media connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Send `track` (part of local stream `stream_id`) to the remote side
    async fn add_track(&self, track: Arc<MediaTrack>, stream_id: &str) -> Result<(), TransportError>;

    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    fn signaling_state(&self) -> SignalingState;

    /// Current remote tracks, used by the polling fallback
    fn remote_tracks(&self) -> Vec<RemoteTrack>;

    /// Release the connection. A `Closed` state reported afterwards belongs
    /// to a removed entry and is ignored by the manager.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Factory for peer connections
#[async_trait]
pub trait MediaTransport: Send + Sync {
    async fn create_connection(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerConnection>, TransportError>;
}
