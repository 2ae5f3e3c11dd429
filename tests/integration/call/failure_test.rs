//! Session-fatal and per-peer failures

use crate::common::*;
use crate::{assert_err, assert_peers};
use assert_matches::assert_matches;
use xfcall::backend::realtime::RealtimeHub;
use xfcall::call::{CallError, CallState, MediaAccessError, SyntheticDevices};
use xfcall::shared::CallConfig;

#[tokio::test]
async fn test_media_denied_never_touches_signaling() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let mut alice = Participant::with(
        &hub,
        "alice",
        SyntheticDevices::new().deny_permission(),
        event_only_config(),
    );

    let result = alice.controller.start_call(room.clone(), alice.id.clone(), true).await;
    assert_err!(result, CallError::MediaAccess(MediaAccessError::PermissionDenied));

    let snapshot = alice.snapshot();
    assert_eq!(snapshot.state, CallState::Ended);
    assert!(snapshot.local_stream.is_none());
    assert_eq!(
        snapshot.error_message().as_deref(),
        Some("Failed to access media or connect.")
    );
    assert_eq!(hub.subscriber_count(&room.topic(&CallConfig::default().topic_prefix)), 0);
    assert_eq!(alice.transport.created_count(), 0);
}

#[tokio::test]
async fn test_unreachable_signaling_ends_call_and_releases_media() {
    let hub = RealtimeHub::new();
    hub.set_reachable(false);
    let mut alice = Participant::new(&hub, "alice");

    let result = alice.controller.start_call(room("call-42"), alice.id.clone(), true).await;
    assert_err!(result, CallError::SignalingUnavailable { .. });

    let snapshot = alice.snapshot();
    assert_eq!(snapshot.state, CallState::Ended);
    assert!(snapshot.local_stream.is_none());
    assert_matches!(snapshot.error, Some(CallError::SignalingUnavailable { .. }));
    assert_eq!(snapshot.error_message().as_deref(), Some("Call failed."));
    assert_eq!(alice.devices.request_count(), 1);
    assert!(!alice.controller.is_live());
}

#[tokio::test]
async fn test_topic_dropped_mid_call_ends_session() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let mut alice = Participant::new(&hub, "alice");
    let mut bob = Participant::new(&hub, "bob");

    alice.join(&room).await;
    bob.join(&room).await;
    alice.wait_for_streams(&[&bob.id]).await;
    let stream = alice.snapshot().local_stream.expect("local stream");

    assert!(hub.close_topic(&room.topic(&CallConfig::default().topic_prefix), "service restart"));

    let ended = alice.wait_for("session to end", |s| s.state == CallState::Ended).await;
    assert_matches!(ended.error, Some(CallError::SignalingUnavailable { .. }));
    assert!(ended.peers.is_empty());
    assert_eq!(stream.live_track_count(), 0);
    assert_eq!(alice.transport.open_count(), 0);

    bob.wait_for("session to end", |s| s.state == CallState::Ended).await;

    // reaping a session that ended itself is not an error
    assert!(alice.controller.end_call().await.is_ok());
}

#[tokio::test]
async fn test_rejected_offer_discards_only_that_peer() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let mut alice = Participant::new(&hub, "alice");
    let mut bob = Participant::new(&hub, "bob");
    let mut carol = Participant::new(&hub, "carol");
    carol.transport.reject_descriptions_from(&alice.id);

    alice.join(&room).await;
    bob.join(&room).await;
    carol.join(&room).await;

    carol.wait_for_streams(&[&bob.id]).await;
    let carol_view = carol
        .wait_for("negotiation failure", |s| s.last_peer_error.is_some())
        .await;
    assert_eq!(carol_view.state, CallState::Active);
    assert_peers!(carol_view.connections, ["bob"]);
    assert_peers!(carol_view.peers, ["alice", "bob"]);
    assert_matches!(
        &carol_view.last_peer_error,
        Some(CallError::Negotiation { peer, .. }) if peer == &alice.id
    );

    let alice_view = alice.wait_for_streams(&[&bob.id]).await;
    assert_eq!(alice_view.state, CallState::Active);
    assert!(!alice_view.remote_streams.contains_key(&carol.id));
}

#[tokio::test]
async fn test_failed_connection_is_dropped_without_redial() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let mut alice = Participant::new(&hub, "alice");
    let mut bob = Participant::new(&hub, "bob");

    alice.join(&room).await;
    bob.join(&room).await;
    alice.wait_for_streams(&[&bob.id]).await;

    assert!(alice.transport.fail_connection(&bob.id));

    let view = alice.wait_for("bob to be dropped", |s| s.connections.is_empty()).await;
    assert_eq!(view.state, CallState::Active);
    assert_peers!(view.peers, ["bob"]);
    assert!(view.remote_streams.is_empty());
    assert_matches!(
        &view.last_peer_error,
        Some(CallError::PeerConnectionFailure { peer }) if peer == &bob.id
    );
    assert_eq!(
        view.last_peer_error.as_ref().map(CallError::user_message).as_deref(),
        Some("Lost connection to bob.")
    );

    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(alice.transport.created_count(), 1);
}

#[tokio::test]
async fn test_failed_peer_is_not_redialed_when_room_changes() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let mut alice = Participant::new(&hub, "alice");
    let mut bob = Participant::new(&hub, "bob");
    let mut carol = Participant::new(&hub, "carol");

    alice.join(&room).await;
    bob.join(&room).await;
    alice.wait_for_streams(&[&bob.id]).await;
    assert_eq!(alice.transport.connections_to(&bob.id), 1);

    assert!(alice.transport.fail_connection(&bob.id));
    alice.wait_for("bob to be dropped", |s| s.connections.is_empty()).await;

    carol.join(&room).await;
    let view = alice.wait_for_streams(&[&carol.id]).await;
    tokio::time::sleep(QUIET_PERIOD).await;

    assert_peers!(view.peers, ["bob", "carol"]);
    assert_peers!(alice.snapshot().connections, ["carol"]);
    assert_eq!(alice.transport.created_count(), 2, "only carol got a new connection");
    assert_eq!(alice.transport.connections_to(&bob.id), 0);
}

#[tokio::test]
async fn test_failed_peer_is_dialed_again_after_rejoining() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let mut alice = Participant::new(&hub, "alice");
    let mut bob = Participant::new(&hub, "bob");

    alice.join(&room).await;
    bob.join(&room).await;
    alice.wait_for_streams(&[&bob.id]).await;

    assert!(alice.transport.fail_connection(&bob.id));
    alice.wait_for("bob to be dropped", |s| s.connections.is_empty()).await;

    assert!(bob.controller.end_call().await.is_ok());
    alice.wait_for("bob to leave", |s| s.peers.is_empty()).await;
    bob.join(&room).await;

    alice.wait_for_streams(&[&bob.id]).await;
    assert_eq!(alice.transport.created_count(), 2);
}
