//! WebRTC transport backed by webrtc-rs
//!
//! Wraps `RTCPeerConnection` behind the `PeerConnection` trait. Codecs and
//! interceptors are the webrtc-rs defaults. Each local track is mirrored by a
//! `TrackLocalStaticSample`; the capture backend writes samples into it via
//! [`WebRtcConnection::sample_track`].
//!
//! # Remote track state
//!
//! webrtc-rs raises no mute/unmute events, so each remote track gets a watcher
//! task that drains its RTP. A track with no packets for [`RTP_SILENCE`] is
//! reported muted, the next packet unmutes it, and a read error ends it. A
//! sender that disables a track but keeps sending silence or black frames is
//! therefore still seen as enabled.

use super::{
    ConnectionState, MediaTransport, PeerConnection, PeerEvent, PeerEventSink, RemoteTrack, SignalingState,
    TransportError,
};
use crate::call::media::{MediaTrack, TrackKind};
use crate::shared::{IceCandidate, IceServer, SdpType, SessionDescription};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// How long a remote track may go without RTP before it counts as muted
pub const RTP_SILENCE: Duration = Duration::from_secs(2);

fn rejected(context: &str, err: webrtc::Error) -> TransportError {
    TransportError::Rejected(format!("{}: {}", context, err))
}

/// Media transport creating real WebRTC peer connections
pub struct WebRtcTransport {
    api: API,
}

impl std::fmt::Debug for WebRtcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebRtcTransport").finish_non_exhaustive()
    }
}

impl WebRtcTransport {
    /// Build the shared API with default codecs and interceptors
    pub fn new() -> Result<Self, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| rejected("failed to register codecs", e))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| rejected("failed to register interceptors", e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api })
    }

    fn rtc_configuration(ice_servers: &[IceServer]) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl MediaTransport for WebRtcTransport {
    async fn create_connection(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerConnection>, TransportError> {
        let pc = self
            .api
            .new_peer_connection(Self::rtc_configuration(ice_servers))
            .await
            .map_err(|e| rejected("failed to create peer connection", e))?;
        let pc = Arc::new(pc);
        let remote_tracks: Arc<Mutex<Vec<RemoteTrack>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            if let Some(init) = candidate.and_then(|c| c.to_json().ok()) {
                sink.emit(PeerEvent::IceCandidate(IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_mline_index: init.sdp_mline_index,
                    username_fragment: init.username_fragment,
                }));
            }
            Box::pin(async {})
        }));

        let sink = events.clone();
        let tracks = remote_tracks.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver: Arc<RTCRtpTransceiver>| {
                let kind = match track.kind() {
                    RTPCodecType::Video => TrackKind::Video,
                    _ => TrackKind::Audio,
                };
                let remote = RemoteTrack {
                    id: track.id(),
                    kind,
                    stream_id: track.stream_id(),
                    enabled: true,
                    ended: false,
                };
                {
                    let mut known = tracks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    known.retain(|t| t.id != remote.id);
                    known.push(remote.clone());
                }
                sink.emit(PeerEvent::Track(remote));
                tokio::spawn(watch_remote_track(track, tracks.clone(), sink.clone()));
                Box::pin(async {})
            },
        ));

        let sink = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let mapped = match state {
                RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                RTCPeerConnectionState::Connected => ConnectionState::Connected,
                RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
                RTCPeerConnectionState::Failed => ConnectionState::Failed,
                RTCPeerConnectionState::Closed => ConnectionState::Closed,
                _ => ConnectionState::New,
            };
            sink.emit(PeerEvent::ConnectionStateChanged(mapped));
            Box::pin(async {})
        }));

        tracing::debug!("[Peer] WebRTC connection created for {}", events.remote());
        Ok(Arc::new(WebRtcConnection {
            pc,
            remote_tracks,
            local_tracks: Mutex::new(HashMap::new()),
        }))
    }
}

/// What the watcher saw on a remote track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Flowing,
    Silent,
    Ended,
}

/// Record `activity` for `track_id`; returns the event to report, if the
/// track's state changed
fn apply_activity(tracks: &Mutex<Vec<RemoteTrack>>, track_id: &str, activity: Activity) -> Option<PeerEvent> {
    let mut tracks = tracks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let track = tracks.iter_mut().find(|t| t.id == track_id && !t.ended)?;
    let track_id = track_id.to_string();
    match activity {
        Activity::Flowing if !track.enabled => {
            track.enabled = true;
            Some(PeerEvent::TrackUnmuted { track_id })
        }
        Activity::Silent if track.enabled => {
            track.enabled = false;
            Some(PeerEvent::TrackMuted { track_id })
        }
        Activity::Ended => {
            track.ended = true;
            Some(PeerEvent::TrackEnded { track_id })
        }
        _ => None,
    }
}

async fn watch_remote_track(track: Arc<TrackRemote>, tracks: Arc<Mutex<Vec<RemoteTrack>>>, sink: PeerEventSink) {
    let track_id = track.id();
    loop {
        let activity = match tokio::time::timeout(RTP_SILENCE, track.read_rtp()).await {
            Ok(Ok(_)) => Activity::Flowing,
            Ok(Err(e)) => {
                tracing::debug!("[Peer] Remote track {} from {} ended: {}", track_id, sink.remote(), e);
                Activity::Ended
            }
            Err(_) => Activity::Silent,
        };
        if let Some(event) = apply_activity(&tracks, &track_id, activity) {
            if !sink.emit(event) {
                return;
            }
        }
        if activity == Activity::Ended {
            return;
        }
    }
}

/// `PeerConnection` over an `RTCPeerConnection`
pub struct WebRtcConnection {
    pc: Arc<RTCPeerConnection>,
    remote_tracks: Arc<Mutex<Vec<RemoteTrack>>>,
    local_tracks: Mutex<HashMap<String, Arc<TrackLocalStaticSample>>>,
}

impl WebRtcConnection {
    fn local(&self) -> MutexGuard<'_, HashMap<String, Arc<TrackLocalStaticSample>>> {
        self.local_tracks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sample sink mirroring the local track `track_id`
    pub fn sample_track(&self, track_id: &str) -> Option<Arc<TrackLocalStaticSample>> {
        self.local().get(track_id).cloned()
    }

    fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription, TransportError> {
        let SessionDescription { sdp_type, sdp } = description;
        match sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(sdp),
            SdpType::Answer => RTCSessionDescription::answer(sdp),
            SdpType::Pranswer => RTCSessionDescription::pranswer(sdp),
            SdpType::Rollback => return Err(TransportError::Rejected("rollback is not supported".to_string())),
        }
        .map_err(|e| rejected("invalid session description", e))
    }

    fn from_rtc(description: RTCSessionDescription) -> Result<SessionDescription, TransportError> {
        let sdp_type = match description.sdp_type {
            RTCSdpType::Offer => SdpType::Offer,
            RTCSdpType::Answer => SdpType::Answer,
            RTCSdpType::Pranswer => SdpType::Pranswer,
            RTCSdpType::Rollback => SdpType::Rollback,
            RTCSdpType::Unspecified => {
                return Err(TransportError::Rejected("unspecified session description type".to_string()))
            }
        };
        Ok(SessionDescription {
            sdp_type,
            sdp: description.sdp,
        })
    }
}

#[async_trait]
impl PeerConnection for WebRtcConnection {
    async fn add_track(&self, track: Arc<MediaTrack>, stream_id: &str) -> Result<(), TransportError> {
        let mime_type = match track.kind() {
            TrackKind::Audio => MIME_TYPE_OPUS,
            TrackKind::Video => MIME_TYPE_VP8,
        };
        let local = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            track.id().to_owned(),
            stream_id.to_owned(),
        ));
        self.pc
            .add_track(local.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| rejected("failed to add track", e))?;
        self.local().insert(track.id().to_owned(), local);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| rejected("failed to create offer", e))?;
        Self::from_rtc(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| rejected("failed to create answer", e))?;
        Self::from_rtc(answer)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        self.pc
            .set_local_description(Self::to_rtc(description)?)
            .await
            .map_err(|e| rejected("failed to set local description", e))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError> {
        self.pc
            .set_remote_description(Self::to_rtc(description)?)
            .await
            .map_err(|e| rejected("failed to set remote description", e))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| rejected("failed to add ICE candidate", e))
    }

    fn signaling_state(&self) -> SignalingState {
        match self.pc.signaling_state() {
            RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
            RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
            RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
            RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
            RTCSignalingState::Closed => SignalingState::Closed,
            _ => SignalingState::Stable,
        }
    }

    fn remote_tracks(&self) -> Vec<RemoteTrack> {
        self.remote_tracks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn close(&self) -> Result<(), TransportError> {
        {
            let mut tracks = self.remote_tracks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            for track in tracks.iter_mut() {
                track.ended = true;
            }
        }
        self.pc
            .close()
            .await
            .map_err(|e| rejected("failed to close peer connection", e))
    }
}
