//! Call fixtures
//!
//! Every participant gets its own loopback transport and synthetic devices
//! but shares the hub, so a test can run a whole room in one process.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use xfcall::backend::realtime::{ChannelEvent, RealtimeClient, RealtimeHub, Subscription};
use xfcall::call::{CallController, CallDependencies, CallSnapshot, CallState, LoopbackTransport, SyntheticDevices};
use xfcall::shared::{CallConfig, ParticipantId, RoomId, SignalKind, SignalingMessage};

/// Upper bound for any single wait in a test
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the observer waits for more traffic before it calls the topic quiet
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

pub fn pid(id: &str) -> ParticipantId {
    ParticipantId::new(id).expect("valid participant id")
}

pub fn room(id: &str) -> RoomId {
    RoomId::new(id).expect("valid room id")
}

/// Config without polling, so only transport events move remote track state
pub fn event_only_config() -> CallConfig {
    CallConfig::builder()
        .track_poll_interval(None)
        .build()
        .expect("valid config")
}

/// Config that polls remote tracks often
pub fn polling_config(every: Duration) -> CallConfig {
    CallConfig::builder()
        .track_poll_interval(Some(every))
        .build()
        .expect("valid config")
}

pub struct Participant {
    pub id: ParticipantId,
    pub controller: CallController,
    pub state: watch::Receiver<CallSnapshot>,
    pub transport: LoopbackTransport,
    pub devices: Arc<SyntheticDevices>,
}

impl Participant {
    pub fn new(hub: &RealtimeHub, id: &str) -> Self {
        Self::with(hub, id, SyntheticDevices::new(), event_only_config())
    }

    pub fn with(hub: &RealtimeHub, id: &str, devices: SyntheticDevices, config: CallConfig) -> Self {
        let transport = LoopbackTransport::new();
        let devices = devices.into_shared();
        let deps = CallDependencies {
            realtime: Arc::new(hub.clone()),
            devices: devices.clone(),
            transport: Arc::new(transport.clone()),
        };
        let controller = CallController::new(deps, config);
        let state = controller.subscribe();
        Self {
            id: pid(id),
            controller,
            state,
            transport,
            devices,
        }
    }

    /// Start a video call and wait until the session is active
    pub async fn join(&mut self, room: &RoomId) {
        self.controller
            .start_call(room.clone(), self.id.clone(), true)
            .await
            .expect("start_call");
        self.wait_for("session to become active", |s| s.state == CallState::Active)
            .await;
    }

    pub async fn wait_for(&mut self, what: &str, condition: impl FnMut(&CallSnapshot) -> bool) -> CallSnapshot {
        wait_for(&mut self.state, &format!("{}: {}", self.id, what), condition).await
    }

    /// Wait until this participant has received media from every peer in `peers`
    pub async fn wait_for_streams(&mut self, peers: &[&ParticipantId]) -> CallSnapshot {
        let peers: Vec<ParticipantId> = peers.iter().map(|p| (*p).clone()).collect();
        self.wait_for("remote streams", move |s| {
            peers.iter().all(|p| s.remote_streams.contains_key(p))
        })
        .await
    }

    pub fn snapshot(&self) -> CallSnapshot {
        self.controller.snapshot()
    }
}

pub async fn wait_for(
    rx: &mut watch::Receiver<CallSnapshot>,
    what: &str,
    condition: impl FnMut(&CallSnapshot) -> bool,
) -> CallSnapshot {
    match tokio::time::timeout(STEP_TIMEOUT, rx.wait_for(condition)).await {
        Ok(Ok(snapshot)) => snapshot.clone(),
        Ok(Err(_)) => panic!("state channel closed while waiting for {}", what),
        Err(_) => panic!("timed out waiting for {}", what),
    }
}

/// Raw subscriber on a call topic that never tracks presence
pub struct TopicObserver {
    subscription: Subscription,
}

impl TopicObserver {
    pub async fn attach(hub: &RealtimeHub, room: &RoomId) -> Self {
        let topic = room.topic(&CallConfig::default().topic_prefix);
        let subscription = hub
            .subscribe(&topic, "observer")
            .await
            .expect("observer subscribe");
        Self { subscription }
    }

    /// Every signaling message broadcast until the topic goes quiet
    pub async fn drain(&mut self) -> Vec<SignalingMessage> {
        let mut messages = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(QUIET_PERIOD, self.subscription.events.recv()).await {
            if let ChannelEvent::Broadcast { event, payload } = event {
                if let Ok(message) = SignalingMessage::from_broadcast(&event, &payload) {
                    messages.push(message);
                }
            }
        }
        messages
    }

    /// Broadcast a message as if another participant had sent it
    pub async fn inject(&self, message: &SignalingMessage) {
        let (event, payload) = message.to_broadcast().expect("encode");
        self.subscription
            .channel
            .send(event, payload)
            .await
            .expect("inject");
    }
}

pub fn offers(messages: &[SignalingMessage]) -> Vec<(String, String)> {
    messages
        .iter()
        .filter(|m| m.kind() == SignalKind::Offer)
        .map(|m| (m.sender().to_string(), m.target().to_string()))
        .collect()
}
