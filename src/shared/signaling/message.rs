/**
 * Signaling Messages
 *
 * Offer, answer and ICE-candidate messages exchanged between call participants
 * over the room's realtime topic. Every participant receives every message, so
 * each message names both its sender and its target.
 *
 * # Wire Format
 *
 * The broadcast event name is the message kind (`offer`, `answer`, `candidate`)
 * and the payload carries the sender, the target and the kind-specific body:
 *
 * ```json
 * { "fromUserId": "alice", "targetUserId": "bob", "offer": { "type": "offer", "sdp": "v=0..." } }
 * ```
 *
 * Payloads are parsed into [`SignalingMessage`] at the boundary. Anything that
 * does not fit (missing fields, empty identities, a description of the wrong
 * type) is rejected there and never reaches the peer connection manager.
 */

use crate::shared::error::SharedError;
use crate::shared::signaling::identity::ParticipantId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session description type, mirroring the RTC `RTCSdpType` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description exchanged during offer/answer negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: SdpType::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: SdpType::Answer, sdp: sdp.into() }
    }
}

/// ICE candidate as produced by the local transport or received from a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Kind of a signaling message; doubles as the broadcast event name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

impl SignalKind {
    /// Broadcast event name for this kind
    pub fn event_name(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
        }
    }

    /// Parse a broadcast event name, returning `None` for non-signaling events
    pub fn from_event_name(event: &str) -> Option<Self> {
        match event {
            "offer" => Some(SignalKind::Offer),
            "answer" => Some(SignalKind::Answer),
            "candidate" => Some(SignalKind::Candidate),
            _ => None,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// A signaling message addressed from one participant to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMessage {
    Offer {
        from: ParticipantId,
        target: ParticipantId,
        description: SessionDescription,
    },
    Answer {
        from: ParticipantId,
        target: ParticipantId,
        description: SessionDescription,
    },
    Candidate {
        from: ParticipantId,
        target: ParticipantId,
        candidate: IceCandidate,
    },
}

#[derive(Serialize, Deserialize)]
struct OfferPayload {
    #[serde(rename = "fromUserId")]
    from: ParticipantId,
    #[serde(rename = "targetUserId")]
    target: ParticipantId,
    offer: SessionDescription,
}

#[derive(Serialize, Deserialize)]
struct AnswerPayload {
    #[serde(rename = "fromUserId")]
    from: ParticipantId,
    #[serde(rename = "targetUserId")]
    target: ParticipantId,
    answer: SessionDescription,
}

#[derive(Serialize, Deserialize)]
struct CandidatePayload {
    #[serde(rename = "fromUserId")]
    from: ParticipantId,
    #[serde(rename = "targetUserId")]
    target: ParticipantId,
    candidate: IceCandidate,
}

impl SignalingMessage {
    pub fn kind(&self) -> SignalKind {
        match self {
            SignalingMessage::Offer { .. } => SignalKind::Offer,
            SignalingMessage::Answer { .. } => SignalKind::Answer,
            SignalingMessage::Candidate { .. } => SignalKind::Candidate,
        }
    }

    pub fn sender(&self) -> &ParticipantId {
        match self {
            SignalingMessage::Offer { from, .. }
            | SignalingMessage::Answer { from, .. }
            | SignalingMessage::Candidate { from, .. } => from,
        }
    }

    pub fn target(&self) -> &ParticipantId {
        match self {
            SignalingMessage::Offer { target, .. }
            | SignalingMessage::Answer { target, .. }
            | SignalingMessage::Candidate { target, .. } => target,
        }
    }

    /// Whether this message is meant for `participant`
    pub fn is_addressed_to(&self, participant: &ParticipantId) -> bool {
        self.target() == participant
    }

    /// Encode as a broadcast `(event, payload)` pair
    pub fn to_broadcast(&self) -> Result<(&'static str, serde_json::Value), SharedError> {
        let payload = match self.clone() {
            SignalingMessage::Offer { from, target, description } => {
                serde_json::to_value(OfferPayload { from, target, offer: description })?
            }
            SignalingMessage::Answer { from, target, description } => {
                serde_json::to_value(AnswerPayload { from, target, answer: description })?
            }
            SignalingMessage::Candidate { from, target, candidate } => {
                serde_json::to_value(CandidatePayload { from, target, candidate })?
            }
        };
        Ok((self.kind().event_name(), payload))
    }

    /// Decode a broadcast payload received under `event`
    ///
    /// # Errors
    ///
    /// * `SharedError::ValidationError` - unknown event name or a description
    ///   whose type does not match the event
    /// * `SharedError::SerializationError` - missing or malformed fields
    pub fn from_broadcast(event: &str, payload: &serde_json::Value) -> Result<Self, SharedError> {
        let kind = SignalKind::from_event_name(event)
            .ok_or_else(|| SharedError::validation("event", format!("unknown signaling event '{}'", event)))?;

        match kind {
            SignalKind::Offer => {
                let p: OfferPayload = serde_json::from_value(payload.clone())?;
                expect_sdp_type(&p.offer, SdpType::Offer)?;
                Ok(SignalingMessage::Offer { from: p.from, target: p.target, description: p.offer })
            }
            SignalKind::Answer => {
                let p: AnswerPayload = serde_json::from_value(payload.clone())?;
                expect_sdp_type(&p.answer, SdpType::Answer)?;
                Ok(SignalingMessage::Answer { from: p.from, target: p.target, description: p.answer })
            }
            SignalKind::Candidate => {
                let p: CandidatePayload = serde_json::from_value(payload.clone())?;
                if p.candidate.candidate.is_empty() {
                    return Err(SharedError::validation("candidate", "candidate line cannot be empty"));
                }
                Ok(SignalingMessage::Candidate { from: p.from, target: p.target, candidate: p.candidate })
            }
        }
    }
}

fn expect_sdp_type(description: &SessionDescription, expected: SdpType) -> Result<(), SharedError> {
    if description.sdp_type != expected {
        return Err(SharedError::validation(
            "type",
            format!("expected {:?} description, got {:?}", expected, description.sdp_type),
        ));
    }
    Ok(())
}
