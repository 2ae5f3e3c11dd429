//! XFCall - Peer-to-Peer Calling Library
//!
//! XFCall is the voice/video calling layer of the xf chat client. Calls are
//! direct peer-to-peer media connections; the realtime presence/broadcast
//! service the chat already uses carries the signaling traffic.
//!
//! # Overview
//!
//! This library provides:
//! - Room presence and offer/answer/candidate relay over one realtime topic
//! - One peer connection per remote participant, with a deterministic
//!   tie-break deciding who sends the offer
//! - Local microphone/camera capture with mute toggles
//! - A call session lifecycle with ordered, best-effort teardown
//!
//! # Module Structure
//!
//! - **`shared`** - Platform-agnostic value types
//!   - Participant and room identities
//!   - Signaling wire messages and presence roster
//!   - Configuration and boundary errors
//!
//! - **`backend`** - Realtime service seam
//!   - `RealtimeClient` / `RealtimeChannel` traits
//!   - `RealtimeHub`, an in-process implementation
//!
//! - **`call`** - The calling core
//!   - `CallController` for the presentation layer
//!   - Signaling adapter, peer connection manager, local media controller
//!   - Media transport seam with loopback and webrtc-rs transports
//!
//! # Feature Flags
//!
//! - **`cli`** (default) - builds the `call-demo` binary with
//!   `tracing-subscriber` and `.env` loading
//! - **`webrtc-rs`** - enables `WebRtcTransport` backed by the `webrtc` crate
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xfcall::backend::realtime::RealtimeHub;
//! use xfcall::call::{CallController, CallDependencies, LoopbackTransport, SyntheticDevices};
//! use xfcall::shared::{CallConfig, ParticipantId, RoomId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = RealtimeHub::new();
//! let deps = CallDependencies {
//!     realtime: Arc::new(hub.clone()),
//!     devices: Arc::new(SyntheticDevices::new()),
//!     transport: Arc::new(LoopbackTransport::new()),
//! };
//! let mut controller = CallController::new(deps, CallConfig::load()?);
//! let mut state = controller.subscribe();
//!
//! controller
//!     .start_call(RoomId::new("call-42")?, ParticipantId::new("alice")?, true)
//!     .await?;
//! while state.changed().await.is_ok() {
//!     let snapshot = state.borrow().clone();
//!     println!("{} with {:?}", snapshot.state, snapshot.peers);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! Each call session runs as a single tokio task that owns the peer manager;
//! nothing else mutates peer or stream state. The presentation layer reads
//! `CallSnapshot`s from a `tokio::sync::watch` channel. Every async step in
//! the session re-checks a shared liveness flag, so nothing is applied once a
//! session has started ending.
//!
//! # Error Handling
//!
//! - `CallError` for the call layer, split into session-fatal errors (media
//!   access, signaling unavailable) and per-peer errors (negotiation, peer
//!   connection failure)
//! - `SharedError` for malformed wire payloads and invalid identities
//! - `ConfigError` for configuration loading
//! - `RealtimeError`, `TransportError` and `MediaAccessError` at each seam

/// Shared types and data structures
pub mod shared;

/// Realtime service seam
pub mod backend;

/// Peer-to-peer calling core
pub mod call;
