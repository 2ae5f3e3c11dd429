//! Signaling Channel Adapter
//!
//! Wraps one realtime topic scoped to a call room. The topic carries two
//! things at once:
//!
//! - **presence** - who is in the room, keyed by participant identity
//! - **broadcast** - offer / answer / candidate messages, each sent to every
//!   subscriber and filtered by target identity on the receiving side
//!
//! # Event stream
//!
//! Instead of per-kind callbacks the adapter exposes a single typed stream
//! through [`SignalingChannel::next_event`], which the session task selects
//! on. Broadcasts that fail to decode are logged and dropped here; they never
//! reach the peer manager.
//!
//! # Failure
//!
//! `open` surfaces a single `SignalingUnavailable` error and does not retry.
//! A topic dropped by the service mid-call arrives as
//! [`SignalingEvent::Disconnected`].

use crate::backend::realtime::{ChannelEvent, RealtimeChannel, RealtimeClient};
use crate::call::error::CallError;
use crate::shared::{ParticipantId, PresenceMeta, RoomId, Roster, SignalKind, SignalingMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Something that happened on the room topic
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// Full roster after a presence change
    PresenceSync(Roster),
    PresenceJoin(Vec<ParticipantId>),
    PresenceLeave(Vec<ParticipantId>),
    /// Decoded signaling message; not yet filtered by target
    Message(SignalingMessage),
    /// The topic was dropped; no further events follow
    Disconnected { reason: String },
}

/// Send half of a signaling channel, shared with the peer manager
#[derive(Clone)]
pub struct SignalSender {
    channel: Arc<dyn RealtimeChannel>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for SignalSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalSender")
            .field("topic", &self.channel.topic())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl SignalSender {
    /// Broadcast `message` to every subscriber of the room topic
    pub async fn send(&self, message: &SignalingMessage) -> Result<(), CallError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CallError::SignalingUnavailable {
                reason: format!("channel '{}' is closed", self.channel.topic()),
            });
        }
        let (event, payload) = message.to_broadcast()?;
        self.channel.send(event, payload).await?;
        tracing::debug!(
            "[Signaling] Sent {} {} -> {}",
            event,
            message.sender(),
            message.target()
        );
        Ok(())
    }
}

/// Presence and message relay for one room
pub struct SignalingChannel {
    room: RoomId,
    local: ParticipantId,
    channel: Arc<dyn RealtimeChannel>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    closed: Arc<AtomicBool>,
    ended: bool,
}

impl std::fmt::Debug for SignalingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingChannel")
            .field("room", &self.room)
            .field("local", &self.local)
            .field("topic", &self.channel.topic())
            .finish()
    }
}

impl SignalingChannel {
    /// Subscribe to the room topic and start tracking presence as `local`.
    ///
    /// # Errors
    ///
    /// `SignalingUnavailable` if the service cannot be reached or refuses the
    /// presence registration. Nothing is left subscribed in that case.
    pub async fn open(
        client: &dyn RealtimeClient,
        room: &RoomId,
        local: &ParticipantId,
        topic_prefix: &str,
    ) -> Result<Self, CallError> {
        let topic = room.topic(topic_prefix);
        tracing::info!("[Signaling] Opening '{}' as {}", topic, local);

        let subscription = client.subscribe(&topic, local.as_str()).await.map_err(|e| {
            tracing::error!("[Signaling] Subscribe to '{}' failed: {}", topic, e);
            CallError::from(e)
        })?;

        let meta = serde_json::to_value(PresenceMeta::now(local.clone())).map_err(crate::shared::SharedError::from)?;
        if let Err(e) = subscription.channel.track(meta).await {
            tracing::error!("[Signaling] Presence tracking on '{}' failed: {}", topic, e);
            if let Err(unsub) = subscription.channel.unsubscribe().await {
                tracing::warn!("[Signaling] Unsubscribe after failed open: {}", unsub);
            }
            return Err(e.into());
        }

        Ok(Self {
            room: room.clone(),
            local: local.clone(),
            channel: subscription.channel,
            events: subscription.events,
            closed: Arc::new(AtomicBool::new(false)),
            ended: false,
        })
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn local(&self) -> &ParticipantId {
        &self.local
    }

    pub fn topic(&self) -> &str {
        self.channel.topic()
    }

    pub fn sender(&self) -> SignalSender {
        SignalSender {
            channel: self.channel.clone(),
            closed: self.closed.clone(),
        }
    }

    pub async fn send(&self, message: &SignalingMessage) -> Result<(), CallError> {
        self.sender().send(message).await
    }

    /// Roster derived from the topic's current presence state
    pub fn roster(&self) -> Roster {
        Roster::from_presence_state(&self.channel.presence_state())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Next event on the topic.
    ///
    /// Cancel-safe. Once the channel is closed or disconnected this never
    /// resolves, so it can stay in a `select!` after teardown.
    pub async fn next_event(&mut self) -> SignalingEvent {
        loop {
            if self.ended || self.is_closed() {
                return std::future::pending().await;
            }

            let event = match self.events.recv().await {
                Some(event) => event,
                None => {
                    self.ended = true;
                    if self.is_closed() {
                        continue;
                    }
                    tracing::error!("[Signaling] Event stream for '{}' ended", self.topic());
                    return SignalingEvent::Disconnected {
                        reason: "subscription stream ended".to_string(),
                    };
                }
            };

            match event {
                ChannelEvent::PresenceSync => {
                    let roster = self.roster();
                    tracing::debug!("[Signaling] Presence sync: {} participant(s)", roster.len());
                    return SignalingEvent::PresenceSync(roster);
                }
                ChannelEvent::PresenceJoin { key, new_presences } => {
                    return SignalingEvent::PresenceJoin(Roster::identities_in(&key, &new_presences));
                }
                ChannelEvent::PresenceLeave { key, left_presences } => {
                    let left = Roster::identities_in(&key, &left_presences);
                    tracing::info!("[Signaling] Left '{}': {:?}", self.topic(), left);
                    return SignalingEvent::PresenceLeave(left);
                }
                ChannelEvent::Broadcast { event, payload } => {
                    if SignalKind::from_event_name(&event).is_none() {
                        tracing::debug!("[Signaling] Ignoring non-signaling broadcast '{}'", event);
                        continue;
                    }
                    match SignalingMessage::from_broadcast(&event, &payload) {
                        Ok(message) => return SignalingEvent::Message(message),
                        Err(e) => {
                            tracing::warn!("[Signaling] Dropping malformed '{}' payload: {}", event, e);
                        }
                    }
                }
                ChannelEvent::Closed { reason } => {
                    self.ended = true;
                    tracing::error!("[Signaling] Topic '{}' dropped: {}", self.topic(), reason);
                    return SignalingEvent::Disconnected { reason };
                }
            }
        }
    }

    /// Stop presence tracking and leave the topic. Only the first call does
    /// anything; the first error is returned but both steps always run.
    pub async fn close(&self) -> Result<(), CallError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("[Signaling] Closing '{}'", self.topic());

        let untracked = self.channel.untrack().await;
        let unsubscribed = self.channel.unsubscribe().await;
        untracked.and(unsubscribed).map_err(|e| {
            tracing::warn!("[Signaling] Close of '{}' reported: {}", self.topic(), e);
            CallError::from(e)
        })
    }
}
