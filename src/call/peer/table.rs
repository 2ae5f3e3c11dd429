//! Peer table
//!
//! Owns the peer-connection entries and the remote streams derived from them.
//! Both maps live behind one set of operations so they cannot drift apart: a
//! stream exists only for a live entry, and removing an entry removes its
//! stream in the same call.

use crate::call::media::TrackKind;
use crate::call::transport::{ConnectionState, PeerConnection, RemoteTrack};
use crate::shared::ParticipantId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One remote participant's connection
#[derive(Clone)]
pub struct PeerEntry {
    remote: ParticipantId,
    connection: Arc<dyn PeerConnection>,
    generation: u64,
    initiator: bool,
    state: ConnectionState,
}

impl std::fmt::Debug for PeerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerEntry")
            .field("remote", &self.remote)
            .field("generation", &self.generation)
            .field("initiator", &self.initiator)
            .field("state", &self.state)
            .field("signaling", &self.connection.signaling_state())
            .finish()
    }
}

impl PeerEntry {
    pub fn new(remote: ParticipantId, connection: Arc<dyn PeerConnection>, generation: u64, initiator: bool) -> Self {
        Self {
            remote,
            connection,
            generation,
            initiator,
            state: ConnectionState::New,
        }
    }

    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn connection(&self) -> &Arc<dyn PeerConnection> {
        &self.connection
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the local side sent the first offer
    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

/// Media received from one remote participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    id: String,
    tracks: Vec<RemoteTrack>,
}

impl RemoteStream {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tracks: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[RemoteTrack] {
        &self.tracks
    }

    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == TrackKind::Video && !t.ended)
    }

    /// Any live track of `kind` currently enabled
    pub fn is_enabled(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind && t.enabled && !t.ended)
    }

    fn upsert(&mut self, track: RemoteTrack) -> bool {
        match self.tracks.iter_mut().find(|t| t.id == track.id) {
            Some(existing) if *existing == track => false,
            Some(existing) => {
                *existing = track;
                true
            }
            None => {
                self.tracks.push(track);
                true
            }
        }
    }
}

/// Peer entries and remote streams, kept in lockstep
#[derive(Debug, Default)]
pub struct PeerTable {
    entries: BTreeMap<ParticipantId, PeerEntry>,
    streams: BTreeMap<ParticipantId, RemoteStream>,
    generations: u64,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh generation number for a connection about to be created
    pub fn next_generation(&mut self) -> u64 {
        self.generations += 1;
        self.generations
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, remote: &ParticipantId) -> bool {
        self.entries.contains_key(remote)
    }

    pub fn get(&self, remote: &ParticipantId) -> Option<&PeerEntry> {
        self.entries.get(remote)
    }

    /// The entry for `remote`, only if it is still generation `generation`
    pub fn current(&self, remote: &ParticipantId, generation: u64) -> Option<&PeerEntry> {
        self.entries.get(remote).filter(|e| e.generation == generation)
    }

    /// Add an entry. An existing entry for the same participant is kept and
    /// the new one handed back.
    pub fn insert(&mut self, entry: PeerEntry) -> Result<(), PeerEntry> {
        if self.entries.contains_key(&entry.remote) {
            return Err(entry);
        }
        self.entries.insert(entry.remote.clone(), entry);
        Ok(())
    }

    /// Remove the entry for `remote` together with its stream
    pub fn remove(&mut self, remote: &ParticipantId) -> Option<(PeerEntry, Option<RemoteStream>)> {
        let entry = self.entries.remove(remote)?;
        let stream = self.streams.remove(remote);
        Some((entry, stream))
    }

    /// Empty both maps, returning the entries for closing
    pub fn drain(&mut self) -> Vec<PeerEntry> {
        self.streams.clear();
        std::mem::take(&mut self.entries).into_values().collect()
    }

    /// Record a connection-state change for the current generation
    pub fn set_state(&mut self, remote: &ParticipantId, generation: u64, state: ConnectionState) -> bool {
        match self.entries.get_mut(remote).filter(|e| e.generation == generation) {
            Some(entry) => {
                entry.state = state;
                true
            }
            None => false,
        }
    }

    /// Store a remote track for a live entry. A track from a different stream
    /// than the stored one replaces that stream.
    pub fn store_track(&mut self, remote: &ParticipantId, generation: u64, track: RemoteTrack) -> bool {
        if self.current(remote, generation).is_none() {
            return false;
        }
        let stream = self
            .streams
            .entry(remote.clone())
            .or_insert_with(|| RemoteStream::new(track.stream_id.clone()));
        if stream.id != track.stream_id {
            *stream = RemoteStream::new(track.stream_id.clone());
        }
        stream.upsert(track)
    }

    /// Apply a mute/unmute/end notification to one remote track
    pub fn update_track(
        &mut self,
        remote: &ParticipantId,
        generation: u64,
        track_id: &str,
        apply: impl FnOnce(&mut RemoteTrack),
    ) -> bool {
        if self.current(remote, generation).is_none() {
            return false;
        }
        let track = self
            .streams
            .get_mut(remote)
            .and_then(|s| s.tracks.iter_mut().find(|t| t.id == track_id));
        match track {
            Some(track) => {
                let before = track.clone();
                apply(track);
                *track != before
            }
            None => false,
        }
    }

    /// Bring the stored stream in line with what the connection reports.
    /// Returns true if anything changed.
    pub fn reconcile(&mut self, remote: &ParticipantId, reported: Vec<RemoteTrack>) -> bool {
        let generation = match self.entries.get(remote) {
            Some(entry) => entry.generation,
            None => return false,
        };
        let mut changed = false;
        for track in reported {
            let known = self
                .streams
                .get(remote)
                .map(|s| s.id == track.stream_id)
                .unwrap_or(true);
            if known {
                changed |= self.store_track(remote, generation, track);
            }
        }
        changed
    }

    pub fn peer_ids(&self) -> Vec<ParticipantId> {
        self.entries.keys().cloned().collect()
    }

    pub fn connected_peers(&self) -> Vec<ParticipantId> {
        self.entries
            .values()
            .filter(|e| e.state == ConnectionState::Connected)
            .map(|e| e.remote.clone())
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &PeerEntry> {
        self.entries.values()
    }

    pub fn stream(&self, remote: &ParticipantId) -> Option<&RemoteStream> {
        self.streams.get(remote)
    }

    pub fn streams(&self) -> &BTreeMap<ParticipantId, RemoteStream> {
        &self.streams
    }
}
