//! Call Session Lifecycle
//!
//! [`CallController`] is the handle the presentation layer holds. It starts
//! and ends sessions, flips the microphone and camera, and publishes a
//! [`CallSnapshot`] through a `tokio::sync::watch` channel whenever anything
//! visible changes.
//!
//! # Lifecycle
//!
//! ```text
//! Idle -> Connecting -> Active -> Ended
//!            |                      ^
//!            +----------------------+   media or signaling failure
//! ```
//!
//! - `start_call` publishes `Connecting`, acquires local media, then opens
//!   the room's signaling channel. A failure in either step publishes `Ended`
//!   with the error and nothing is left open.
//! - The first presence sync moves the session to `Active`, whether or not
//!   anyone else is in the room yet.
//! - Hangup, a dropped topic, or dropping the controller ends the session.
//!   Teardown releases media, closes every peer connection, then closes
//!   signaling; each step runs even if an earlier one failed.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xfcall::backend::realtime::RealtimeHub;
//! use xfcall::call::{CallController, CallDependencies, LoopbackTransport, SyntheticDevices};
//! use xfcall::shared::{CallConfig, ParticipantId, RoomId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let deps = CallDependencies {
//!     realtime: Arc::new(RealtimeHub::new()),
//!     devices: Arc::new(SyntheticDevices::new()),
//!     transport: Arc::new(LoopbackTransport::new()),
//! };
//! let mut controller = CallController::new(deps, CallConfig::default());
//! controller
//!     .start_call(RoomId::new("call-42")?, ParticipantId::new("alice")?, true)
//!     .await?;
//! controller.toggle_mic();
//! controller.end_call().await?;
//! # Ok(())
//! # }
//! ```

pub mod lifecycle;
pub mod snapshot;

mod driver;

pub use lifecycle::{CallState, Liveness};
pub use snapshot::CallSnapshot;

use crate::backend::realtime::RealtimeClient;
use crate::call::error::CallError;
use crate::call::media::{LocalMediaController, MediaDevices};
use crate::call::peer::PeerConnectionManager;
use crate::call::signaling::SignalingChannel;
use crate::call::transport::MediaTransport;
use crate::shared::{CallConfig, ParticipantId, RoomId, Roster};
use driver::{SessionCommand, SessionDriver};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// External collaborators a call session runs against
#[derive(Clone)]
pub struct CallDependencies {
    pub realtime: Arc<dyn RealtimeClient>,
    pub devices: Arc<dyn MediaDevices>,
    pub transport: Arc<dyn MediaTransport>,
}

impl std::fmt::Debug for CallDependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallDependencies").finish_non_exhaustive()
    }
}

struct LiveSession {
    liveness: Liveness,
    media: Arc<LocalMediaController>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<Result<(), CallError>>,
}

/// Presentation-layer handle for voice/video calls
pub struct CallController {
    deps: CallDependencies,
    config: CallConfig,
    state: Arc<watch::Sender<CallSnapshot>>,
    session: Option<LiveSession>,
}

impl std::fmt::Debug for CallController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallController")
            .field("state", &self.state.borrow().state)
            .field("config", &self.config)
            .finish()
    }
}

impl CallController {
    pub fn new(deps: CallDependencies, config: CallConfig) -> Self {
        let (state, _) = watch::channel(CallSnapshot::idle());
        Self {
            deps,
            config,
            state: Arc::new(state),
            session: None,
        }
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Current state
    pub fn snapshot(&self) -> CallSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.state.subscribe()
    }

    /// Whether a session is connecting or active
    pub fn is_live(&self) -> bool {
        self.live_session().is_some()
    }

    fn live_session(&self) -> Option<&LiveSession> {
        self.session.as_ref().filter(|s| s.liveness.is_live())
    }

    /// Join `room` as `local`, capturing the camera too if `wants_video`.
    ///
    /// A session that is still live is ended first.
    ///
    /// # Errors
    ///
    /// - `MediaAccess` if local capture fails; signaling is never attempted
    /// - `SignalingUnavailable` if the room topic cannot be joined
    ///
    /// In both cases the published state is `Ended` with the error attached.
    pub async fn start_call(&mut self, room: RoomId, local: ParticipantId, wants_video: bool) -> Result<(), CallError> {
        if self.session.is_some() {
            if let Err(e) = self.end_call().await {
                tracing::warn!("[Call] Previous session ended with: {}", e);
            }
        }

        tracing::info!("[Call] Starting call in {} as {} (video={})", room, local, wants_video);
        self.state
            .send_replace(CallSnapshot::connecting(room.clone(), local.clone()));

        let media = match LocalMediaController::acquire(self.deps.devices.as_ref(), wants_video).await {
            Ok(media) => Arc::new(media),
            Err(e) => return Err(self.fail_start(e.into())),
        };

        let signaling = match SignalingChannel::open(
            self.deps.realtime.as_ref(),
            &room,
            &local,
            &self.config.topic_prefix,
        )
        .await
        {
            Ok(signaling) => signaling,
            Err(e) => {
                media.release();
                return Err(self.fail_start(e));
            }
        };

        let liveness = Liveness::new();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let peers = PeerConnectionManager::new(
            local,
            media.stream().clone(),
            self.deps.transport.clone(),
            self.config.ice_servers.clone(),
            signaling.sender(),
            peer_tx,
            liveness.clone(),
        );

        let stream = media.stream().clone();
        let (mic, video) = (media.is_audio_enabled(), media.is_video_enabled());
        self.state.send_modify(|s| {
            s.local_stream = Some(stream);
            s.mic_enabled = mic;
            s.video_enabled = video;
        });

        let (commands, command_rx) = mpsc::unbounded_channel();
        let driver = SessionDriver {
            media: media.clone(),
            signaling,
            peers,
            peer_events: peer_rx,
            commands: command_rx,
            state: self.state.clone(),
            liveness: liveness.clone(),
            poll_interval: self.config.track_poll_interval(),
            roster: Roster::default(),
        };
        let task = tokio::spawn(driver.run());

        self.session = Some(LiveSession {
            liveness,
            media,
            commands,
            task,
        });
        Ok(())
    }

    fn fail_start(&self, error: CallError) -> CallError {
        tracing::error!("[Call] Could not start call: {}", error);
        self.state.send_modify(|s| s.end(Some(error.clone())));
        error
    }

    /// End the live session and wait for teardown to finish.
    ///
    /// Returns the first teardown error. Does nothing when no session is live.
    pub async fn end_call(&mut self) -> Result<(), CallError> {
        let session = match self.session.take() {
            Some(session) => session,
            None => return Ok(()),
        };

        if !session.liveness.end() {
            // the session already ended itself; just reap the task
            if let Err(e) = session.task.await {
                tracing::warn!("[Call] Session task failed: {}", e);
            }
            return Ok(());
        }

        tracing::info!("[Call] Hanging up");
        if session.commands.send(SessionCommand::End).is_err() {
            tracing::debug!("[Call] Session task already gone");
        }
        match session.task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("[Call] Session task failed: {}", e);
                Err(CallError::SessionEnded)
            }
        }
    }

    /// Flip the microphone; returns whether it is now enabled
    pub fn toggle_mic(&self) -> bool {
        let session = match self.live_session() {
            Some(session) => session,
            None => return false,
        };
        let enabled = session.media.toggle_audio();
        tracing::info!("[Call] Microphone {}", if enabled { "on" } else { "off" });
        self.state.send_modify(|s| s.mic_enabled = enabled);
        enabled
    }

    /// Flip the camera; returns whether it is now enabled
    pub fn toggle_video(&self) -> bool {
        let session = match self.live_session() {
            Some(session) => session,
            None => return false,
        };
        let enabled = session.media.toggle_video();
        tracing::info!("[Call] Camera {}", if enabled { "on" } else { "off" });
        self.state.send_modify(|s| s.video_enabled = enabled);
        enabled
    }
}

impl Drop for CallController {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if session.liveness.end() {
                tracing::info!("[Call] Controller dropped, ending session");
                session.media.release();
            }
            // dropping the command sender lets the session task tear down
        }
    }
}
