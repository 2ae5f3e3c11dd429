//! Session task
//!
//! One task per call session. It selects over controller commands, signaling
//! events, peer events and the track poll timer, and is the only place that
//! mutates the peer manager. When the loop exits it tears the session down in
//! order: release media, close peer connections, close signaling.

use super::lifecycle::{CallState, Liveness};
use super::snapshot::CallSnapshot;
use crate::call::error::CallError;
use crate::call::media::LocalMediaController;
use crate::call::peer::PeerConnectionManager;
use crate::call::signaling::{SignalingChannel, SignalingEvent};
use crate::call::transport::PeerEventEnvelope;
use crate::shared::Roster;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Requests from the controller to a running session
#[derive(Debug)]
pub(crate) enum SessionCommand {
    End,
}

pub(crate) struct SessionDriver {
    pub(crate) media: Arc<LocalMediaController>,
    pub(crate) signaling: SignalingChannel,
    pub(crate) peers: PeerConnectionManager,
    pub(crate) peer_events: mpsc::UnboundedReceiver<PeerEventEnvelope>,
    pub(crate) commands: mpsc::UnboundedReceiver<SessionCommand>,
    pub(crate) state: Arc<watch::Sender<CallSnapshot>>,
    pub(crate) liveness: Liveness,
    pub(crate) poll_interval: Option<Duration>,
    /// Room occupants as last seen through presence
    pub(crate) roster: Roster,
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl SessionDriver {
    /// Run until ended, then tear down. Returns the first teardown error.
    pub(crate) async fn run(mut self) -> Result<(), CallError> {
        let mut poll = self.poll_interval.map(|period| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        let fatal = loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    match command {
                        Some(SessionCommand::End) => tracing::debug!("[Call] End requested"),
                        None => tracing::debug!("[Call] Controller dropped"),
                    }
                    break None;
                }
                event = self.signaling.next_event() => {
                    if let Err(e) = self.on_signaling_event(event).await {
                        if e.is_fatal() {
                            break Some(e);
                        }
                    }
                }
                Some(envelope) = self.peer_events.recv() => {
                    if self.peers.handle_peer_event(envelope).await {
                        self.publish();
                    }
                }
                _ = tick(&mut poll) => {
                    if self.peers.poll_remote_tracks() {
                        self.publish();
                    }
                }
            }
        };

        self.teardown(fatal).await
    }

    async fn on_signaling_event(&mut self, event: SignalingEvent) -> Result<(), CallError> {
        match event {
            SignalingEvent::PresenceSync(roster) => {
                if self.liveness.is_live() && self.state.borrow().state == CallState::Connecting {
                    tracing::info!("[Call] Session active in {}", self.signaling.room());
                    self.state.send_modify(|s| s.state = CallState::Active);
                }
                let result = self.peers.handle_roster(&roster).await;
                self.roster = roster;
                self.publish();
                result.map(|_| ())
            }
            SignalingEvent::PresenceJoin(joined) => {
                tracing::debug!("[Call] Joined: {:?}", joined);
                self.roster = self.roster.iter().cloned().chain(joined).collect();
                self.publish();
                Ok(())
            }
            SignalingEvent::PresenceLeave(left) => {
                let local = self.peers.local().clone();
                for peer in left.iter().filter(|p| **p != local) {
                    self.peers.peer_left(peer).await;
                }
                self.roster = self.roster.iter().filter(|p| !left.contains(*p)).cloned().collect();
                self.publish();
                Ok(())
            }
            SignalingEvent::Message(message) => {
                let result = self.peers.handle_message(message).await;
                self.publish();
                result
            }
            SignalingEvent::Disconnected { reason } => Err(CallError::SignalingUnavailable { reason }),
        }
    }

    /// Push peer and media state into the snapshot while the session is live
    fn publish(&self) {
        if !self.liveness.is_live() {
            return;
        }
        let peers = self.roster.peers(self.peers.local());
        let connections = self.peers.peer_ids();
        let connected = self.peers.connected_peers();
        let streams = self.peers.remote_streams();
        let last_peer_error = self.peers.last_error().cloned();
        let mic = self.media.is_audio_enabled();
        let video = self.media.is_video_enabled();
        self.state.send_modify(|s| {
            s.peers = peers;
            s.connections = connections;
            s.connected_peers = connected;
            s.remote_streams = streams;
            s.last_peer_error = last_peer_error;
            s.mic_enabled = mic;
            s.video_enabled = video;
        });
    }

    async fn teardown(mut self, fatal: Option<CallError>) -> Result<(), CallError> {
        self.liveness.end();
        match &fatal {
            Some(e) => tracing::error!("[Call] Ending session in {}: {}", self.signaling.room(), e),
            None => tracing::info!("[Call] Ending session in {}", self.signaling.room()),
        }

        let mut first_error = None;
        self.media.release();
        if let Err(e) = self.peers.close_all().await {
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.signaling.close().await {
            first_error.get_or_insert(e);
        }

        self.state.send_modify(|s| s.end(fatal));
        tracing::info!("[Call] Session ended");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
