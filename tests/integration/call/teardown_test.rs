//! Hanging up and what happens to work that arrives afterwards

use crate::assert_ok;
use crate::common::*;
use xfcall::backend::realtime::RealtimeHub;
use xfcall::call::CallState;
use xfcall::shared::CallConfig;

#[tokio::test]
async fn test_end_call_releases_everything() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let mut alice = Participant::new(&hub, "alice");
    let mut bob = Participant::new(&hub, "bob");

    alice.join(&room).await;
    bob.join(&room).await;
    alice.wait_for_streams(&[&bob.id]).await;

    let stream = alice.snapshot().local_stream.expect("local stream while active");
    assert_ok!(alice.controller.end_call().await);

    let ended = alice.snapshot();
    assert_eq!(ended.state, CallState::Ended);
    assert!(ended.error.is_none());
    assert!(ended.peers.is_empty());
    assert!(ended.connections.is_empty());
    assert!(ended.remote_streams.is_empty());
    assert!(ended.local_stream.is_none());
    assert_eq!(stream.live_track_count(), 0);
    assert_eq!(alice.transport.open_count(), 0);

    let topic = room.topic(&CallConfig::default().topic_prefix);
    assert_eq!(hub.subscriber_count(&topic), 1, "only bob stays subscribed");
    assert!(!hub.presence_state(&topic).contains_key("alice"));
}

#[tokio::test]
async fn test_end_call_twice_is_harmless() {
    let hub = RealtimeHub::new();
    let mut alice = Participant::new(&hub, "alice");

    alice.join(&room("call-42")).await;
    assert_ok!(alice.controller.end_call().await);
    assert_ok!(alice.controller.end_call().await);
    assert_eq!(alice.snapshot().state, CallState::Ended);
}

#[tokio::test]
async fn test_end_call_without_session_is_noop() {
    let hub = RealtimeHub::new();
    let mut alice = Participant::new(&hub, "alice");

    assert_ok!(alice.controller.end_call().await);
    assert_eq!(alice.snapshot().state, CallState::Idle);
}

#[tokio::test]
async fn test_starting_again_replaces_live_session() {
    let hub = RealtimeHub::new();
    let mut alice = Participant::new(&hub, "alice");

    alice.join(&room("first")).await;
    let first = alice.snapshot().local_stream.expect("local stream");
    alice.join(&room("second")).await;

    assert_eq!(first.live_track_count(), 0);
    let snapshot = alice.snapshot();
    assert_eq!(snapshot.room.as_ref().map(|r| r.as_str()), Some("second"));
    assert_eq!(hub.subscriber_count(&room("first").topic(&CallConfig::default().topic_prefix)), 0);
    assert_eq!(alice.devices.request_count(), 2);
}
