//! Presence roster
//!
//! The roster is the set of participants currently holding a subscription to a
//! room's topic. It is derived from the realtime channel's presence state on
//! every sync and is never stored anywhere else.

use crate::shared::signaling::identity::ParticipantId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Metadata a participant publishes when it starts tracking presence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMeta {
    pub user_id: ParticipantId,
    /// RFC 3339 timestamp of when the participant came online
    pub online_at: String,
}

impl PresenceMeta {
    pub fn now(user_id: ParticipantId) -> Self {
        Self {
            user_id,
            online_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Sorted, de-duplicated set of participants present in a room
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    participants: BTreeSet<ParticipantId>,
}

impl Roster {
    /// Derive a roster from a presence state (presence key to metadata list).
    ///
    /// Each metadata entry contributes its `user_id`; entries without one fall
    /// back to the presence key. Empty identities are dropped.
    pub fn from_presence_state(state: &HashMap<String, Vec<serde_json::Value>>) -> Self {
        let mut participants = BTreeSet::new();
        for (key, metas) in state {
            for meta in metas {
                if let Some(id) = identity_of(key, meta) {
                    participants.insert(id);
                }
            }
        }
        Self { participants }
    }

    /// Identities named by a presence join/leave diff
    pub fn identities_in(key: &str, presences: &[serde_json::Value]) -> Vec<ParticipantId> {
        let mut ids: Vec<ParticipantId> = presences
            .iter()
            .filter_map(|meta| identity_of(key, meta))
            .collect();
        if ids.is_empty() {
            if let Ok(id) = ParticipantId::new(key) {
                ids.push(id);
            }
        }
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.participants.contains(participant)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParticipantId> {
        self.participants.iter()
    }

    /// Everyone in the room except `local`
    pub fn peers(&self, local: &ParticipantId) -> Vec<ParticipantId> {
        self.participants
            .iter()
            .filter(|p| *p != local)
            .cloned()
            .collect()
    }
}

impl FromIterator<ParticipantId> for Roster {
    fn from_iter<T: IntoIterator<Item = ParticipantId>>(iter: T) -> Self {
        Self { participants: iter.into_iter().collect() }
    }
}

fn identity_of(key: &str, meta: &serde_json::Value) -> Option<ParticipantId> {
    let raw = meta
        .get("user_id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(key);
    ParticipantId::new(raw).ok()
}
