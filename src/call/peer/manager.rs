//! Peer Connection Manager
//!
//! Drives one offer/answer/candidate exchange per remote participant and
//! keeps the resulting connections and remote streams in a [`PeerTable`].
//!
//! # Protocol
//!
//! - `ensure_connection` is idempotent: a second request for a participant
//!   with a live entry returns `EnsureOutcome::Existing` and does nothing.
//! - On discovery only the participant whose identity sorts lower sends the
//!   offer; the other side waits for it.
//! - An offer for an unknown participant creates an answering entry. An offer
//!   for a `stable` entry is a renegotiation. An offer that meets our own
//!   pending offer is ignored.
//! - Answers are applied only while our offer is pending. Answers and
//!   candidates for unknown participants are dropped.
//!
//! # Failure
//!
//! Any rejected offer, answer or candidate discards that peer's entry and
//! stream and is recorded as the last per-peer error. A failed or closed
//! connection is removed the same way. Nothing is redialed: a discarded
//! participant is skipped by later rosters and its offers are ignored until
//! it leaves the room.
//!
//! # Cancellation
//!
//! Every await is followed by a liveness check. Once the session is ending the
//! result is discarded and `CallError::SessionEnded` is returned.

use super::table::{PeerEntry, PeerTable, RemoteStream};
use crate::call::error::CallError;
use crate::call::media::MediaStream;
use crate::call::session::lifecycle::Liveness;
use crate::call::signaling::SignalSender;
use crate::call::transport::{
    ConnectionState, MediaTransport, PeerConnection, PeerEvent, PeerEventEnvelope, PeerEventSink, SignalingState,
};
use crate::shared::{IceCandidate, IceServer, ParticipantId, Roster, SessionDescription, SharedError, SignalingMessage};
use futures_util::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Result of `ensure_connection`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// An entry already existed; nothing was done
    Existing,
    Created,
}

/// Owner of every peer connection in one call session
pub struct PeerConnectionManager {
    local: ParticipantId,
    local_stream: MediaStream,
    transport: Arc<dyn MediaTransport>,
    ice_servers: Vec<IceServer>,
    signals: SignalSender,
    events: mpsc::UnboundedSender<PeerEventEnvelope>,
    liveness: Liveness,
    table: PeerTable,
    /// Participants discarded after a per-peer failure, until they leave
    failed: BTreeSet<ParticipantId>,
    last_error: Option<CallError>,
}

impl std::fmt::Debug for PeerConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnectionManager")
            .field("local", &self.local)
            .field("table", &self.table)
            .field("failed", &self.failed)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl PeerConnectionManager {
    pub fn new(
        local: ParticipantId,
        local_stream: MediaStream,
        transport: Arc<dyn MediaTransport>,
        ice_servers: Vec<IceServer>,
        signals: SignalSender,
        events: mpsc::UnboundedSender<PeerEventEnvelope>,
        liveness: Liveness,
    ) -> Self {
        Self {
            local,
            local_stream,
            transport,
            ice_servers,
            signals,
            events,
            liveness,
            table: PeerTable::new(),
            failed: BTreeSet::new(),
            last_error: None,
        }
    }

    pub fn local(&self) -> &ParticipantId {
        &self.local
    }

    pub fn table(&self) -> &PeerTable {
        &self.table
    }

    pub fn peer_ids(&self) -> Vec<ParticipantId> {
        self.table.peer_ids()
    }

    pub fn connected_peers(&self) -> Vec<ParticipantId> {
        self.table.connected_peers()
    }

    pub fn remote_streams(&self) -> BTreeMap<ParticipantId, RemoteStream> {
        self.table.streams().clone()
    }

    /// Most recent per-peer error
    pub fn last_error(&self) -> Option<&CallError> {
        self.last_error.as_ref()
    }

    /// Whether `remote` was discarded after a failure and is not redialed
    pub fn has_failed(&self, remote: &ParticipantId) -> bool {
        self.failed.contains(remote)
    }

    fn guard(&self) -> Result<(), CallError> {
        if self.liveness.is_live() {
            Ok(())
        } else {
            Err(CallError::SessionEnded)
        }
    }

    /// Connection for `remote`, if it is still generation `generation`
    fn current(&self, remote: &ParticipantId, generation: u64) -> Result<Arc<dyn PeerConnection>, CallError> {
        self.guard()?;
        self.table
            .current(remote, generation)
            .map(|e| e.connection().clone())
            .ok_or_else(|| CallError::negotiation(remote, "connection replaced during negotiation"))
    }

    /// Create the connection to `remote` unless one exists; send an offer if
    /// `is_initiator`.
    pub async fn ensure_connection(
        &mut self,
        remote: &ParticipantId,
        is_initiator: bool,
    ) -> Result<EnsureOutcome, CallError> {
        self.guard()?;
        if self.table.contains(remote) {
            tracing::debug!("[Peer] Connection to {} already exists", remote);
            return Ok(EnsureOutcome::Existing);
        }
        if remote == &self.local {
            return Err(SharedError::validation("remote", "cannot connect to the local participant").into());
        }

        let generation = self.table.next_generation();
        let sink = PeerEventSink::new(remote.clone(), generation, self.events.clone());
        let connection = match self.transport.create_connection(&self.ice_servers, sink).await {
            Ok(connection) => connection,
            Err(e) => return Err(self.discard(remote, CallError::negotiation(remote, e))),
        };
        if let Err(e) = self.guard() {
            close_quietly(remote, &connection).await;
            return Err(e);
        }

        let stream_id = self.local_stream.id().to_string();
        let tracks: Vec<_> = self.local_stream.tracks().iter().filter(|t| t.is_live()).cloned().collect();
        for track in tracks {
            if let Err(e) = connection.add_track(track, &stream_id).await {
                close_quietly(remote, &connection).await;
                return Err(self.discard(remote, CallError::negotiation(remote, e)));
            }
        }
        if let Err(e) = self.guard() {
            close_quietly(remote, &connection).await;
            return Err(e);
        }

        let entry = PeerEntry::new(remote.clone(), connection, generation, is_initiator);
        if let Err(entry) = self.table.insert(entry) {
            close_quietly(remote, entry.connection()).await;
            return Ok(EnsureOutcome::Existing);
        }
        tracing::info!(
            "[Peer] Created connection to {} (initiator={}, generation {})",
            remote,
            is_initiator,
            generation
        );

        if is_initiator {
            self.send_offer(remote, generation).await?;
        }
        Ok(EnsureOutcome::Created)
    }

    async fn send_offer(&mut self, remote: &ParticipantId, generation: u64) -> Result<(), CallError> {
        let connection = self.current(remote, generation)?;
        let offer = match connection.create_offer().await {
            Ok(offer) => offer,
            Err(e) => return Err(self.fail_peer(remote, CallError::negotiation(remote, e)).await),
        };
        self.current(remote, generation)?;
        if let Err(e) = connection.set_local_description(offer.clone()).await {
            return Err(self.fail_peer(remote, CallError::negotiation(remote, e)).await);
        }
        self.current(remote, generation)?;

        self.signals
            .send(&SignalingMessage::Offer {
                from: self.local.clone(),
                target: remote.clone(),
                description: offer,
            })
            .await?;
        tracing::info!("[Peer] Sent offer to {}", remote);
        Ok(())
    }

    /// Start connections for a fresh roster. Returns the number of offers sent.
    ///
    /// Per-peer failures are recorded and skipped; only session-level errors
    /// are returned.
    pub async fn handle_roster(&mut self, roster: &Roster) -> Result<usize, CallError> {
        self.failed.retain(|p| roster.contains(p));
        let mut offers = 0;
        for peer in roster.peers(&self.local) {
            if !self.local.initiates_with(&peer) || self.failed.contains(&peer) {
                continue;
            }
            match self.ensure_connection(&peer, true).await {
                Ok(EnsureOutcome::Created) => offers += 1,
                Ok(EnsureOutcome::Existing) => {}
                Err(e) if e.is_fatal() || matches!(e, CallError::SessionEnded) => return Err(e),
                Err(e) => tracing::warn!("[Peer] Could not connect to {}: {}", peer, e),
            }
        }
        Ok(offers)
    }

    /// Apply an inbound signaling message.
    ///
    /// Messages for other participants are ignored. Per-peer failures are
    /// recorded and returned.
    pub async fn handle_message(&mut self, message: SignalingMessage) -> Result<(), CallError> {
        self.guard()?;
        if !message.is_addressed_to(&self.local) {
            tracing::debug!(
                "[Peer] Ignoring {} for {} from {}",
                message.kind(),
                message.target(),
                message.sender()
            );
            return Ok(());
        }
        if message.sender() == &self.local {
            return Ok(());
        }

        match message {
            SignalingMessage::Offer { from, description, .. } => self.handle_offer(&from, description).await,
            SignalingMessage::Answer { from, description, .. } => self.handle_answer(&from, description).await,
            SignalingMessage::Candidate { from, candidate, .. } => self.handle_candidate(&from, candidate).await,
        }
    }

    async fn handle_offer(&mut self, from: &ParticipantId, offer: SessionDescription) -> Result<(), CallError> {
        match self.table.get(from).map(|e| e.connection().signaling_state()) {
            None if self.failed.contains(from) => {
                tracing::debug!("[Peer] Ignoring offer from failed peer {}", from);
                return Ok(());
            }
            None => {
                self.ensure_connection(from, false).await?;
            }
            Some(SignalingState::Stable) => {
                tracing::info!("[Peer] Renegotiation offer from {}", from);
            }
            Some(state) => {
                tracing::warn!("[Peer] Ignoring offer from {} in state {:?}", from, state);
                return Ok(());
            }
        }

        let generation = match self.table.get(from) {
            Some(entry) => entry.generation(),
            None => return Ok(()),
        };
        let connection = self.current(from, generation)?;

        if let Err(e) = connection.set_remote_description(offer).await {
            return Err(self.fail_peer(from, CallError::negotiation(from, e)).await);
        }
        self.current(from, generation)?;
        let answer = match connection.create_answer().await {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail_peer(from, CallError::negotiation(from, e)).await),
        };
        self.current(from, generation)?;
        if let Err(e) = connection.set_local_description(answer.clone()).await {
            return Err(self.fail_peer(from, CallError::negotiation(from, e)).await);
        }
        self.current(from, generation)?;

        self.signals
            .send(&SignalingMessage::Answer {
                from: self.local.clone(),
                target: from.clone(),
                description: answer,
            })
            .await?;
        tracing::info!("[Peer] Answered offer from {}", from);
        Ok(())
    }

    async fn handle_answer(&mut self, from: &ParticipantId, answer: SessionDescription) -> Result<(), CallError> {
        let (connection, generation) = match self.table.get(from) {
            Some(entry) => (entry.connection().clone(), entry.generation()),
            None => {
                tracing::debug!("[Peer] Dropping answer from unknown peer {}", from);
                return Ok(());
            }
        };
        let state = connection.signaling_state();
        if !state.accepts_answer() {
            tracing::debug!("[Peer] Ignoring answer from {} in state {:?}", from, state);
            return Ok(());
        }

        if let Err(e) = connection.set_remote_description(answer).await {
            return Err(self.fail_peer(from, CallError::negotiation(from, e)).await);
        }
        self.current(from, generation)?;
        tracing::info!("[Peer] Applied answer from {}", from);
        Ok(())
    }

    async fn handle_candidate(&mut self, from: &ParticipantId, candidate: IceCandidate) -> Result<(), CallError> {
        let (connection, generation) = match self.table.get(from) {
            Some(entry) => (entry.connection().clone(), entry.generation()),
            None => {
                tracing::debug!("[Peer] Dropping candidate from unknown peer {}", from);
                return Ok(());
            }
        };

        if let Err(e) = connection.add_ice_candidate(candidate).await {
            return Err(self.fail_peer(from, CallError::negotiation(from, e)).await);
        }
        self.current(from, generation)?;
        Ok(())
    }

    /// Apply an event reported by a connection. Returns true if the peer set
    /// or remote streams changed.
    pub async fn handle_peer_event(&mut self, envelope: PeerEventEnvelope) -> bool {
        if !self.liveness.is_live() {
            return false;
        }
        let PeerEventEnvelope {
            remote,
            generation,
            event,
        } = envelope;
        if self.table.current(&remote, generation).is_none() {
            tracing::debug!("[Peer] Discarding stale event from {} (generation {})", remote, generation);
            return false;
        }

        match event {
            PeerEvent::IceCandidate(candidate) => {
                let message = SignalingMessage::Candidate {
                    from: self.local.clone(),
                    target: remote.clone(),
                    candidate,
                };
                if let Err(e) = self.signals.send(&message).await {
                    tracing::warn!("[Peer] Could not relay candidate to {}: {}", remote, e);
                }
                false
            }
            PeerEvent::Track(track) => {
                tracing::info!(
                    "[Peer] {} track {} from {} (stream {})",
                    track.kind,
                    track.id,
                    remote,
                    track.stream_id
                );
                self.table.store_track(&remote, generation, track)
            }
            PeerEvent::TrackMuted { track_id } => {
                self.table
                    .update_track(&remote, generation, &track_id, |t| t.enabled = false)
            }
            PeerEvent::TrackUnmuted { track_id } => {
                self.table
                    .update_track(&remote, generation, &track_id, |t| t.enabled = true)
            }
            PeerEvent::TrackEnded { track_id } => {
                self.table
                    .update_track(&remote, generation, &track_id, |t| t.ended = true)
            }
            PeerEvent::ConnectionStateChanged(state) => {
                tracing::debug!("[Peer] Connection to {} is {:?}", remote, state);
                self.table.set_state(&remote, generation, state);
                match state {
                    ConnectionState::Failed => {
                        self.fail_peer(&remote, CallError::PeerConnectionFailure { peer: remote.clone() })
                            .await;
                    }
                    ConnectionState::Closed => {
                        self.failed.insert(remote.clone());
                        self.remove_peer(&remote).await;
                    }
                    _ => {}
                }
                true
            }
        }
    }

    /// Drop the entry and stream for a participant that left. Returns false
    /// if there was no entry.
    pub async fn remove_peer(&mut self, remote: &ParticipantId) -> bool {
        match self.table.remove(remote) {
            Some((entry, _stream)) => {
                close_quietly(remote, entry.connection()).await;
                tracing::info!("[Peer] Removed connection to {}", remote);
                true
            }
            None => false,
        }
    }

    /// A participant left the room: drop its entry and stream, and let it be
    /// dialed again if it comes back. Returns false if there was no entry.
    pub async fn peer_left(&mut self, remote: &ParticipantId) -> bool {
        self.failed.remove(remote);
        self.remove_peer(remote).await
    }

    /// Discard a peer after a per-peer error and remember the error
    async fn fail_peer(&mut self, remote: &ParticipantId, error: CallError) -> CallError {
        if !self.liveness.is_live() {
            return CallError::SessionEnded;
        }
        if let Some((entry, _stream)) = self.table.remove(remote) {
            close_quietly(remote, entry.connection()).await;
        }
        self.discard(remote, error)
    }

    /// Mark `remote` as not to be redialed and remember the error
    fn discard(&mut self, remote: &ParticipantId, error: CallError) -> CallError {
        tracing::warn!("[Peer] {}", error);
        self.failed.insert(remote.clone());
        self.last_error = Some(error.clone());
        error
    }

    /// Reconcile stored remote tracks against what each connection reports.
    /// Returns true if anything changed.
    pub fn poll_remote_tracks(&mut self) -> bool {
        let reported: Vec<_> = self
            .table
            .entries()
            .map(|e| (e.remote().clone(), e.connection().remote_tracks()))
            .collect();
        let mut changed = false;
        for (remote, tracks) in reported {
            changed |= self.table.reconcile(&remote, tracks);
        }
        if changed {
            tracing::debug!("[Peer] Track poll picked up remote changes");
        }
        changed
    }

    /// Close every connection. All are closed even if some fail; the first
    /// failure is returned.
    pub async fn close_all(&mut self) -> Result<(), CallError> {
        let entries = self.table.drain();
        if entries.is_empty() {
            return Ok(());
        }
        let results = join_all(entries.iter().map(|e| e.connection().close())).await;
        tracing::info!("[Peer] Closed {} connection(s)", entries.len());

        entries
            .iter()
            .zip(results)
            .find_map(|(entry, result)| result.err().map(|e| CallError::negotiation(entry.remote(), e)))
            .map_or(Ok(()), Err)
    }
}

async fn close_quietly(remote: &ParticipantId, connection: &Arc<dyn PeerConnection>) {
    if let Err(e) = connection.close().await {
        tracing::warn!("[Peer] Closing connection to {} failed: {}", remote, e);
    }
}
