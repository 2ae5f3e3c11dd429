//! Real-time Presence and Broadcast Module
//!
//! This module is the seam between the call layer and the realtime service
//! that carries signaling traffic. It provides:
//!
//! - **`channel`** - the `RealtimeClient` / `RealtimeChannel` contract and
//!   the events a subscriber receives
//! - **`broadcast`** - per-topic fan-out over `tokio::sync::broadcast`
//! - **`hub`** - `RealtimeHub`, an in-process implementation of the contract
//!
//! # Module Structure
//!
//! ```text
//! realtime/
//! ├── mod.rs        - Module exports and documentation
//! ├── channel.rs    - Client/channel traits, events, errors
//! ├── broadcast.rs  - Topic fan-out and subscriber forwarding
//! └── hub.rs        - In-process realtime hub
//! ```
//!
//! # Event Types
//!
//! Subscribers receive:
//! - `PresenceJoin` / `PresenceLeave` - presence diffs
//! - `PresenceSync` - presence state changed
//! - `Broadcast` - a payload sent by another subscriber
//! - `Closed` - the topic was dropped by the service
//!
//! # Example
//!
//! ```rust,no_run
//! use xfcall::backend::realtime::{RealtimeClient, RealtimeHub};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = RealtimeHub::new();
//! let mut sub = hub.subscribe("signaling:call-42", "alice").await?;
//! sub.channel.track(serde_json::json!({ "user_id": "alice" })).await?;
//! while let Some(event) = sub.events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

/// Topic fan-out utilities
pub mod broadcast;

/// Realtime client/channel contract
pub mod channel;

/// In-process realtime hub
pub mod hub;

// Re-export commonly used types
pub use channel::{
    ChannelEvent, PresenceState, RealtimeChannel, RealtimeClient, RealtimeError, Subscription,
};
pub use hub::{HubChannel, RealtimeHub};
