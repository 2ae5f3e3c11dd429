//! In-process realtime hub
//!
//! A complete implementation of the realtime contract that lives inside the
//! process: topics are created on first subscribe and removed when the last
//! subscriber leaves. Each topic keeps its presence table next to its
//! broadcast channel.
//!
//! The hub is an explicit handle. Clone it and pass it to whatever needs to
//! subscribe; clones share the same topics.

use crate::backend::realtime::broadcast::{
    broadcast_event, forward_topic_events, TopicBroadcast, TopicEnvelope, SERVICE_ORIGIN,
    TOPIC_CAPACITY,
};
use crate::backend::realtime::channel::{
    ChannelEvent, PresenceState, RealtimeChannel, RealtimeClient, RealtimeError, Subscription,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

struct TopicState {
    tx: TopicBroadcast,
    subscribers: HashSet<u64>,
    /// subscription id -> (presence key, tracked metadata)
    presences: HashMap<u64, (String, serde_json::Value)>,
}

impl TopicState {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(TOPIC_CAPACITY);
        Self {
            tx,
            subscribers: HashSet::new(),
            presences: HashMap::new(),
        }
    }

    fn presence_state(&self) -> PresenceState {
        let mut state: PresenceState = HashMap::new();
        for (key, meta) in self.presences.values() {
            state.entry(key.clone()).or_default().push(meta.clone());
        }
        state
    }

    fn publish(&self, origin: u64, event: ChannelEvent) -> usize {
        broadcast_event(&self.tx, TopicEnvelope { origin, event })
    }
}

struct HubState {
    reachable: bool,
    echo_broadcasts: bool,
    next_subscription_id: u64,
    topics: HashMap<String, TopicState>,
}

/// Shared in-process realtime service
#[derive(Clone)]
pub struct RealtimeHub {
    state: Arc<Mutex<HubState>>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RealtimeHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RealtimeHub")
            .field("reachable", &state.reachable)
            .field("topics", &state.topics.len())
            .finish()
    }
}

impl RealtimeHub {
    /// Create a hub that does not echo broadcasts back to their sender
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                reachable: true,
                echo_broadcasts: false,
                next_subscription_id: SERVICE_ORIGIN + 1,
                topics: HashMap::new(),
            })),
        }
    }

    /// Create a hub that also delivers broadcasts to their sender
    pub fn with_echo() -> Self {
        let hub = Self::new();
        hub.lock().echo_broadcasts = true;
        hub
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make subsequent subscribes succeed or fail with `Unreachable`
    pub fn set_reachable(&self, reachable: bool) {
        tracing::info!("[Realtime] Hub reachable = {}", reachable);
        self.lock().reachable = reachable;
    }

    /// Drop a topic, telling every subscriber why.
    ///
    /// Returns false if the topic did not exist.
    pub fn close_topic(&self, topic: &str, reason: &str) -> bool {
        let removed = self.lock().topics.remove(topic);
        match removed {
            Some(state) => {
                tracing::warn!("[Realtime] Closing topic '{}': {}", topic, reason);
                state.publish(SERVICE_ORIGIN, ChannelEvent::Closed { reason: reason.to_string() });
                true
            }
            None => false,
        }
    }

    /// Number of live subscriptions on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock()
            .topics
            .get(topic)
            .map(|t| t.subscribers.len())
            .unwrap_or(0)
    }

    /// Presence state of `topic` (empty if the topic does not exist)
    pub fn presence_state(&self, topic: &str) -> PresenceState {
        self.lock()
            .topics
            .get(topic)
            .map(TopicState::presence_state)
            .unwrap_or_default()
    }

    fn track(&self, topic: &str, subscription_id: u64, key: &str, meta: serde_json::Value) -> Result<(), RealtimeError> {
        let mut state = self.lock();
        let topic_state = state
            .topics
            .get_mut(topic)
            .filter(|t| t.subscribers.contains(&subscription_id))
            .ok_or_else(|| RealtimeError::Closed(topic.to_string()))?;

        topic_state
            .presences
            .insert(subscription_id, (key.to_string(), meta.clone()));
        topic_state.publish(
            subscription_id,
            ChannelEvent::PresenceJoin {
                key: key.to_string(),
                new_presences: vec![meta],
            },
        );
        topic_state.publish(subscription_id, ChannelEvent::PresenceSync);
        Ok(())
    }

    fn untrack(&self, topic: &str, subscription_id: u64) {
        let mut state = self.lock();
        if let Some(topic_state) = state.topics.get_mut(topic) {
            if let Some((key, meta)) = topic_state.presences.remove(&subscription_id) {
                topic_state.publish(
                    subscription_id,
                    ChannelEvent::PresenceLeave {
                        key,
                        left_presences: vec![meta],
                    },
                );
                topic_state.publish(subscription_id, ChannelEvent::PresenceSync);
            }
        }
    }

    fn send(&self, topic: &str, subscription_id: u64, event: &str, payload: serde_json::Value) -> Result<(), RealtimeError> {
        let state = self.lock();
        let topic_state = state
            .topics
            .get(topic)
            .filter(|t| t.subscribers.contains(&subscription_id))
            .ok_or_else(|| RealtimeError::Closed(topic.to_string()))?;

        topic_state.publish(
            subscription_id,
            ChannelEvent::Broadcast {
                event: event.to_string(),
                payload,
            },
        );
        Ok(())
    }

    fn detach(&self, topic: &str, subscription_id: u64) {
        self.untrack(topic, subscription_id);

        let mut state = self.lock();
        let now_empty = match state.topics.get_mut(topic) {
            Some(topic_state) => {
                topic_state.subscribers.remove(&subscription_id);
                topic_state.subscribers.is_empty()
            }
            None => false,
        };
        if now_empty {
            tracing::debug!("[Realtime] Last subscriber left '{}', removing topic", topic);
            state.topics.remove(topic);
        }
    }
}

#[async_trait]
impl RealtimeClient for RealtimeHub {
    async fn subscribe(&self, topic: &str, presence_key: &str) -> Result<Subscription, RealtimeError> {
        let (subscription_id, rx, echo) = {
            let mut state = self.lock();
            if !state.reachable {
                tracing::warn!("[Realtime] Subscribe to '{}' refused: hub unreachable", topic);
                return Err(RealtimeError::Unreachable(format!("cannot subscribe to '{}'", topic)));
            }
            let subscription_id = state.next_subscription_id;
            state.next_subscription_id += 1;
            let echo = state.echo_broadcasts;

            let topic_state = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(TopicState::new);
            topic_state.subscribers.insert(subscription_id);
            (subscription_id, topic_state.tx.subscribe(), echo)
        };

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward_topic_events(rx, subscription_id, echo, out_tx));

        tracing::info!(
            "[Realtime] Subscription {} joined '{}' as '{}'",
            subscription_id,
            topic,
            presence_key
        );

        let channel = HubChannel {
            hub: self.clone(),
            topic: topic.to_string(),
            presence_key: presence_key.to_string(),
            subscription_id,
            closed: AtomicBool::new(false),
            forwarder: Mutex::new(Some(forwarder)),
        };

        Ok(Subscription {
            channel: Arc::new(channel),
            events: out_rx,
        })
    }
}

/// Subscription handle returned by [`RealtimeHub`]
pub struct HubChannel {
    hub: RealtimeHub,
    topic: String,
    presence_key: String,
    subscription_id: u64,
    closed: AtomicBool,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl HubChannel {
    fn ensure_open(&self) -> Result<(), RealtimeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RealtimeError::Closed(self.topic.clone()));
        }
        Ok(())
    }

    fn close_once(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.hub.detach(&self.topic, self.subscription_id);
        let forwarder = self
            .forwarder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = forwarder {
            handle.abort();
        }
        true
    }
}

#[async_trait]
impl RealtimeChannel for HubChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn track(&self, meta: serde_json::Value) -> Result<(), RealtimeError> {
        self.ensure_open()?;
        self.hub
            .track(&self.topic, self.subscription_id, &self.presence_key, meta)
    }

    async fn untrack(&self) -> Result<(), RealtimeError> {
        self.ensure_open()?;
        self.hub.untrack(&self.topic, self.subscription_id);
        Ok(())
    }

    fn presence_state(&self) -> PresenceState {
        self.hub.presence_state(&self.topic)
    }

    async fn send(&self, event: &str, payload: serde_json::Value) -> Result<(), RealtimeError> {
        self.ensure_open()?;
        self.hub
            .send(&self.topic, self.subscription_id, event, payload)
    }

    async fn unsubscribe(&self) -> Result<(), RealtimeError> {
        if self.close_once() {
            tracing::info!("[Realtime] Subscription {} left '{}'", self.subscription_id, self.topic);
        }
        Ok(())
    }
}

impl Drop for HubChannel {
    fn drop(&mut self) {
        self.close_once();
    }
}
