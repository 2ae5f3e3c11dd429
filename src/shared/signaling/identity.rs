//! Participant and room identities
//!
//! Both identities are opaque, non-empty strings handed out by the auth layer
//! (participants) and the conversation store (rooms). They are validated once at
//! construction or deserialization so the rest of the call layer never sees an
//! empty identity.

use crate::shared::error::SharedError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one call participant.
///
/// The ordering is a total, stable byte-wise ordering over the identity string.
/// It decides which side of a newly discovered pair sends the offer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Create a participant identity, rejecting empty or blank strings
    pub fn new(id: impl Into<String>) -> Result<Self, SharedError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SharedError::validation("participant_id", "identity cannot be empty"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this participant sends the offer when it discovers `other`.
    ///
    /// Only the participant whose identity sorts lower initiates, so for any two
    /// distinct identities exactly one side returns `true`.
    pub fn initiates_with(&self, other: &ParticipantId) -> bool {
        self < other
    }
}

impl TryFrom<String> for ParticipantId {
    type Error = SharedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ParticipantId> for String {
    fn from(id: ParticipantId) -> Self {
        id.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a call room (a conversation or voice channel)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Create a room identity, rejecting empty or blank strings
    pub fn new(id: impl Into<String>) -> Result<Self, SharedError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SharedError::validation("room_id", "room identifier cannot be empty"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Realtime topic name carrying this room's signaling traffic
    pub fn topic(&self, prefix: &str) -> String {
        format!("{}:{}", prefix, self.0)
    }
}

impl TryFrom<String> for RoomId {
    type Error = SharedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
