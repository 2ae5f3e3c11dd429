//! Call Module
//!
//! Peer-to-peer voice and video calls over a realtime topic used as the
//! signaling bus.
//!
//! # Module Structure
//!
//! ```text
//! call/
//! ├── mod.rs        - Module exports
//! ├── error.rs      - CallError taxonomy
//! ├── signaling.rs  - Room topic adapter: presence + message relay
//! ├── media/        - Local capture, tracks, mute toggles
//! ├── peer/         - Peer connection manager and peer table
//! ├── session/      - CallController, session task, snapshots
//! └── transport/    - Media transport seam (loopback, webrtc-rs)
//! ```
//!
//! # Data Flow
//!
//! `CallController::start_call` acquires local media, opens the signaling
//! channel and spawns the session task. As presence reveals other
//! participants the peer manager creates connections and exchanges offers,
//! answers and candidates through the signaling channel. Remote streams are
//! published back in the `CallSnapshot`, keyed by participant.

pub mod error;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod transport;

pub use error::CallError;
pub use media::{LocalMediaController, MediaAccessError, MediaDevices, MediaStream, SyntheticDevices, TrackKind};
pub use peer::{EnsureOutcome, PeerConnectionManager, RemoteStream};
pub use session::{CallController, CallDependencies, CallSnapshot, CallState};
pub use signaling::{SignalSender, SignalingChannel, SignalingEvent};
pub use transport::{LoopbackTransport, MediaTransport, PeerConnection};

#[cfg(feature = "webrtc-rs")]
pub use transport::webrtc_rs::WebRtcTransport;
