//! In-process loopback transport
//!
//! Models one side of a peer connection without sockets or codecs. Session
//! descriptions are synthetic SDP listing the attached tracks as `m=` sections
//! with `a=msid:` lines; the remote tracks of a connection are read back from
//! the remote description. Signaling-state transitions follow the offer/answer
//! rules of a real RTC stack, so out-of-order or duplicate descriptions are
//! rejected the same way.
//!
//! Once a connection reaches `stable` with both descriptions applied it
//! reports `connecting`, `connected` and one `Track` event per remote track.
//!
//! The transport handle doubles as a fault injector for tests: it can make
//! connections to a given peer reject descriptions, fail, or change remote
//! track state.

use super::{
    ConnectionState, MediaTransport, PeerConnection, PeerEvent, PeerEventSink, RemoteTrack, SignalingState,
    TransportError,
};
use crate::call::media::{MediaTrack, TrackKind};
use crate::shared::{IceCandidate, IceServer, ParticipantId, SdpType, SessionDescription};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

static NEXT_PORT: AtomicU64 = AtomicU64::new(50000);

#[derive(Default)]
struct TransportState {
    created: usize,
    connections: Vec<Arc<LoopbackConnection>>,
}

type RejectList = Arc<Mutex<HashSet<ParticipantId>>>;

/// Media transport whose connections live entirely in memory
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<TransportState>>,
    rejecting: RejectList,
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("created", &self.created_count())
            .field("open", &self.open_count())
            .finish()
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Connections created over the transport's lifetime
    pub fn created_count(&self) -> usize {
        self.lock().created
    }

    /// Connections not yet closed
    pub fn open_count(&self) -> usize {
        self.lock().connections.iter().filter(|c| !c.is_closed()).count()
    }

    /// Open connections whose remote side is `peer`
    pub fn connections_to(&self, peer: &ParticipantId) -> usize {
        self.open_to(peer).len()
    }

    fn open_to(&self, peer: &ParticipantId) -> Vec<Arc<LoopbackConnection>> {
        self.lock()
            .connections
            .iter()
            .filter(|c| c.remote() == peer && !c.is_closed())
            .cloned()
            .collect()
    }

    /// Make every connection to `peer` reject remote descriptions from now on
    pub fn reject_descriptions_from(&self, peer: &ParticipantId) {
        self.rejecting
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(peer.clone());
    }

    /// Report an ICE failure on every open connection to `peer`
    pub fn fail_connection(&self, peer: &ParticipantId) -> bool {
        let targets = self.open_to(peer);
        for conn in &targets {
            conn.sink.emit(PeerEvent::ConnectionStateChanged(ConnectionState::Failed));
        }
        !targets.is_empty()
    }

    /// Change the enabled state of `peer`'s remote tracks of `kind` and emit
    /// the matching muted / unmuted events. Returns the number of tracks changed.
    pub fn set_remote_track_enabled(&self, peer: &ParticipantId, kind: TrackKind, enabled: bool) -> usize {
        self.update_remote_tracks(peer, kind, enabled, true)
    }

    /// Same as `set_remote_track_enabled` but without any event, so only a
    /// poll of `remote_tracks()` can notice the change
    pub fn set_remote_track_enabled_silently(&self, peer: &ParticipantId, kind: TrackKind, enabled: bool) -> usize {
        self.update_remote_tracks(peer, kind, enabled, false)
    }

    fn update_remote_tracks(&self, peer: &ParticipantId, kind: TrackKind, enabled: bool, notify: bool) -> usize {
        let mut changed = 0;
        for conn in self.open_to(peer) {
            let ids = {
                let mut inner = conn.lock();
                inner
                    .remote_tracks
                    .iter_mut()
                    .filter(|t| t.kind == kind && t.enabled != enabled)
                    .map(|t| {
                        t.enabled = enabled;
                        t.id.clone()
                    })
                    .collect::<Vec<_>>()
            };
            changed += ids.len();
            if notify {
                for track_id in ids {
                    let event = if enabled {
                        PeerEvent::TrackUnmuted { track_id }
                    } else {
                        PeerEvent::TrackMuted { track_id }
                    };
                    conn.sink.emit(event);
                }
            }
        }
        changed
    }
}

#[async_trait]
impl MediaTransport for LoopbackTransport {
    async fn create_connection(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerConnection>, TransportError> {
        tracing::debug!(
            "[Peer] Loopback connection to {} (generation {}, {} ICE server(s))",
            events.remote(),
            events.generation(),
            ice_servers.len()
        );
        let conn = Arc::new(LoopbackConnection::new(self.rejecting.clone(), events));
        let mut state = self.lock();
        state.created += 1;
        state.connections.push(conn.clone());
        Ok(conn)
    }
}

struct ConnectionInner {
    signaling: SignalingState,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    local_tracks: Vec<(Arc<MediaTrack>, String)>,
    remote_tracks: Vec<RemoteTrack>,
    announced: HashSet<String>,
    connected: bool,
    candidates_added: usize,
}

/// One side of an in-memory peer connection
pub struct LoopbackConnection {
    session_id: String,
    rejecting: RejectList,
    sink: PeerEventSink,
    inner: Mutex<ConnectionInner>,
}

impl std::fmt::Debug for LoopbackConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackConnection")
            .field("remote", self.remote())
            .field("signaling", &self.signaling_state())
            .finish()
    }
}

impl LoopbackConnection {
    fn new(rejecting: RejectList, sink: PeerEventSink) -> Self {
        Self {
            session_id: Uuid::new_v4().simple().to_string(),
            rejecting,
            sink,
            inner: Mutex::new(ConnectionInner {
                signaling: SignalingState::Stable,
                local_description: None,
                remote_description: None,
                local_tracks: Vec::new(),
                remote_tracks: Vec::new(),
                announced: HashSet::new(),
                connected: false,
                candidates_added: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn remote(&self) -> &ParticipantId {
        self.sink.remote()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().signaling == SignalingState::Closed
    }

    /// Remote candidates applied so far
    pub fn candidates_added(&self) -> usize {
        self.lock().candidates_added
    }

    fn rejects_remote(&self) -> bool {
        self.rejecting
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(self.remote())
    }

    fn open(&self) -> Result<MutexGuard<'_, ConnectionInner>, TransportError> {
        let inner = self.lock();
        if inner.signaling == SignalingState::Closed {
            return Err(TransportError::Closed);
        }
        Ok(inner)
    }

    fn describe(&self, inner: &ConnectionInner) -> String {
        let mut sdp = format!("v=0\r\no=xfcall {} 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n", self.session_id);
        for (mid, (track, stream_id)) in inner.local_tracks.iter().enumerate() {
            let (media, payload) = match track.kind() {
                TrackKind::Audio => ("audio", 111),
                TrackKind::Video => ("video", 96),
            };
            sdp.push_str(&format!("m={} 9 UDP/TLS/RTP/SAVPF {}\r\n", media, payload));
            sdp.push_str(&format!("a=mid:{}\r\n", mid));
            sdp.push_str(&format!("a=msid:{} {}\r\n", stream_id, track.id()));
        }
        sdp
    }

    /// Collect the tracks announced by a remote description
    fn parse_tracks(sdp: &str) -> Vec<RemoteTrack> {
        let mut tracks = Vec::new();
        let mut kind = None;
        for line in sdp.lines() {
            if let Some(media) = line.strip_prefix("m=") {
                kind = match media.split_whitespace().next() {
                    Some("audio") => Some(TrackKind::Audio),
                    Some("video") => Some(TrackKind::Video),
                    _ => None,
                };
            } else if let (Some(msid), Some(kind)) = (line.strip_prefix("a=msid:"), kind) {
                let mut parts = msid.split_whitespace();
                if let (Some(stream_id), Some(id)) = (parts.next(), parts.next()) {
                    tracks.push(RemoteTrack {
                        id: id.to_string(),
                        kind,
                        stream_id: stream_id.to_string(),
                        enabled: true,
                        ended: false,
                    });
                }
            }
        }
        tracks
    }

    fn host_candidate(&self) -> IceCandidate {
        let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
        IceCandidate {
            candidate: format!("candidate:1 1 UDP 2122252543 127.0.0.1 {} typ host", port),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    /// Events owed once both descriptions are applied and the state is stable
    fn settle(inner: &mut ConnectionInner) -> Vec<PeerEvent> {
        let mut events = Vec::new();
        if inner.signaling != SignalingState::Stable
            || inner.local_description.is_none()
            || inner.remote_description.is_none()
        {
            return events;
        }
        if !inner.connected {
            inner.connected = true;
            events.push(PeerEvent::ConnectionStateChanged(ConnectionState::Connecting));
            events.push(PeerEvent::ConnectionStateChanged(ConnectionState::Connected));
        }
        for track in &inner.remote_tracks {
            if inner.announced.insert(track.id.clone()) {
                events.push(PeerEvent::Track(track.clone()));
            }
        }
        events
    }

    fn emit_all(&self, events: Vec<PeerEvent>) {
        for event in events {
            self.sink.emit(event);
        }
    }
}

#[async_trait]
impl PeerConnection for LoopbackConnection {
    async fn add_track(&self, track: Arc<MediaTrack>, stream_id: &str) -> Result<(), TransportError> {
        let mut inner = self.open()?;
        if inner.local_tracks.iter().any(|(t, _)| t.id() == track.id()) {
            return Err(TransportError::Rejected(format!("track {} already added", track.id())));
        }
        inner.local_tracks.push((track, stream_id.to_string()));
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let inner = self.open()?;
        match inner.signaling {
            SignalingState::Stable | SignalingState::HaveLocalOffer => Ok(SessionDescription::offer(self.describe(&inner))),
            state => Err(TransportError::InvalidState {
                operation: "create_offer",
                state,
            }),
        }
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let inner = self.open()?;
        match inner.signaling {
            SignalingState::HaveRemoteOffer => Ok(SessionDescription::answer(self.describe(&inner))),
            state => Err(TransportError::InvalidState {
                operation: "create_answer",
                state,
            }),
        }
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        let events = {
            let mut inner = self.open()?;
            inner.signaling = match (inner.signaling, description.sdp_type) {
                (SignalingState::Stable, SdpType::Offer) => SignalingState::HaveLocalOffer,
                (SignalingState::HaveRemoteOffer, SdpType::Answer) => SignalingState::Stable,
                (state, _) => {
                    return Err(TransportError::InvalidState {
                        operation: "set_local_description",
                        state,
                    })
                }
            };
            inner.local_description = Some(description);
            let mut events = vec![PeerEvent::IceCandidate(self.host_candidate())];
            events.extend(Self::settle(&mut inner));
            events
        };
        self.emit_all(events);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        if self.rejects_remote() {
            return Err(TransportError::Rejected(format!(
                "remote description from {} refused",
                self.remote()
            )));
        }
        let events = {
            let mut inner = self.open()?;
            inner.signaling = match (inner.signaling, description.sdp_type) {
                (SignalingState::Stable, SdpType::Offer) => SignalingState::HaveRemoteOffer,
                (SignalingState::HaveLocalOffer, SdpType::Answer) => SignalingState::Stable,
                (state, _) => {
                    return Err(TransportError::InvalidState {
                        operation: "set_remote_description",
                        state,
                    })
                }
            };
            let mut tracks = Self::parse_tracks(&description.sdp);
            for track in &mut tracks {
                if let Some(known) = inner.remote_tracks.iter().find(|t| t.id == track.id) {
                    track.enabled = known.enabled;
                }
            }
            inner.remote_tracks = tracks;
            inner.remote_description = Some(description);
            Self::settle(&mut inner)
        };
        self.emit_all(events);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        let mut inner = self.open()?;
        if inner.remote_description.is_none() {
            return Err(TransportError::InvalidState {
                operation: "add_ice_candidate",
                state: inner.signaling,
            });
        }
        if candidate.candidate.trim().is_empty() {
            return Err(TransportError::Rejected("empty candidate".to_string()));
        }
        inner.candidates_added += 1;
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        self.lock().signaling
    }

    fn remote_tracks(&self) -> Vec<RemoteTrack> {
        self.lock().remote_tracks.clone()
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if inner.signaling == SignalingState::Closed {
            return Ok(());
        }
        inner.signaling = SignalingState::Closed;
        for track in &mut inner.remote_tracks {
            track.ended = true;
        }
        Ok(())
    }
}
