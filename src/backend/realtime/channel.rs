/**
 * Realtime Channel Contract
 *
 * The call layer needs exactly two things from the hosted realtime service:
 * presence tracking on a topic and broadcast of JSON payloads to everyone
 * subscribed to that topic. This module defines that contract so the
 * signaling adapter can run against the in-process hub, a hosted service
 * client, or a test double without changing.
 *
 * # Delivery
 *
 * Broadcasts are best-effort and at-most-once. Implementations must keep
 * per-sender FIFO order; nothing stronger is assumed.
 */

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Presence state of a topic: presence key to the metadata tracked under it
pub type PresenceState = HashMap<String, Vec<serde_json::Value>>;

/// Event delivered to one topic subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Presence state changed; read it with `RealtimeChannel::presence_state`
    PresenceSync,
    /// A client started tracking presence
    PresenceJoin {
        key: String,
        new_presences: Vec<serde_json::Value>,
    },
    /// A client stopped tracking presence or went away
    PresenceLeave {
        key: String,
        left_presences: Vec<serde_json::Value>,
    },
    /// Broadcast from another subscriber
    Broadcast {
        event: String,
        payload: serde_json::Value,
    },
    /// The topic was dropped by the service; no further events follow
    Closed { reason: String },
}

/// Realtime service errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("realtime service unreachable: {0}")]
    Unreachable(String),
    #[error("channel for topic '{0}' is closed")]
    Closed(String),
    #[error("failed to send '{event}': {message}")]
    SendFailed { event: String, message: String },
}

/// An open subscription: the channel handle plus its event stream
pub struct Subscription {
    pub channel: Arc<dyn RealtimeChannel>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.channel.topic())
            .finish()
    }
}

/// Connection to the realtime service
#[async_trait]
pub trait RealtimeClient: Send + Sync {
    /// Subscribe to `topic`, using `presence_key` for presence tracking
    async fn subscribe(&self, topic: &str, presence_key: &str) -> Result<Subscription, RealtimeError>;
}

/// One subscribed topic
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    fn topic(&self) -> &str;

    /// Start (or replace) presence tracking with `meta`
    async fn track(&self, meta: serde_json::Value) -> Result<(), RealtimeError>;

    /// Stop presence tracking
    async fn untrack(&self) -> Result<(), RealtimeError>;

    /// Current presence state of the topic
    fn presence_state(&self) -> PresenceState;

    /// Broadcast `payload` under `event` to the other subscribers
    async fn send(&self, event: &str, payload: serde_json::Value) -> Result<(), RealtimeError>;

    /// Leave the topic. Calling it again is a no-op.
    async fn unsubscribe(&self) -> Result<(), RealtimeError>;
}
