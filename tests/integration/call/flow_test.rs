//! Joining a room and negotiating with the participants already in it

use crate::common::*;
use crate::{assert_ok, assert_peers};
use pretty_assertions::assert_eq;
use serde_json::json;
use xfcall::backend::realtime::{RealtimeClient, RealtimeHub};
use xfcall::call::CallState;
use xfcall::shared::{CallConfig, IceCandidate, SessionDescription, SignalKind, SignalingMessage};

#[tokio::test]
async fn test_first_participant_is_active_alone() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let mut alice = Participant::new(&hub, "alice");

    alice.join(&room).await;

    let snapshot = alice.snapshot();
    assert_eq!(snapshot.state, CallState::Active);
    assert!(snapshot.peers.is_empty());
    assert!(snapshot.remote_streams.is_empty());
    assert!(snapshot.mic_enabled);
    assert!(snapshot.video_enabled);
    assert_eq!(alice.transport.created_count(), 0);
}

#[tokio::test]
async fn test_two_participants_negotiate_once() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let mut observer = TopicObserver::attach(&hub, &room).await;
    let mut alice = Participant::new(&hub, "alice");
    let mut bob = Participant::new(&hub, "bob");

    alice.join(&room).await;
    bob.join(&room).await;

    let alice_view = alice.wait_for_streams(&[&bob.id]).await;
    let bob_view = bob.wait_for_streams(&[&alice.id]).await;
    assert_peers!(alice_view.connections, ["bob"]);
    assert_peers!(bob_view.connections, ["alice"]);
    assert_peers!(alice_view.peers, ["bob"]);
    assert_peers!(bob_view.peers, ["alice"]);

    let messages = observer.drain().await;
    assert_eq!(
        offers(&messages),
        vec![("alice".to_string(), "bob".to_string())],
        "only the lower identity offers"
    );
    assert!(messages
        .iter()
        .any(|m| m.kind() == SignalKind::Answer && m.sender() == &bob.id && m.target() == &alice.id));

    assert_eq!(alice.transport.connections_to(&bob.id), 1);
    assert_eq!(bob.transport.connections_to(&alice.id), 1);
}

#[tokio::test]
async fn test_later_joiner_with_lower_identity_initiates() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let mut observer = TopicObserver::attach(&hub, &room).await;
    let mut bob = Participant::new(&hub, "bob");
    let mut alice = Participant::new(&hub, "alice");

    bob.join(&room).await;
    alice.join(&room).await;

    alice.wait_for_streams(&[&bob.id]).await;
    bob.wait_for_streams(&[&alice.id]).await;

    let messages = observer.drain().await;
    assert_eq!(offers(&messages), vec![("alice".to_string(), "bob".to_string())]);
}

#[tokio::test]
async fn test_three_way_call_forms_full_mesh() {
    let hub = RealtimeHub::new();
    let room = room("standup");
    let mut observer = TopicObserver::attach(&hub, &room).await;
    let mut alice = Participant::new(&hub, "alice");
    let mut bob = Participant::new(&hub, "bob");
    let mut carol = Participant::new(&hub, "carol");

    alice.join(&room).await;
    bob.join(&room).await;
    carol.join(&room).await;

    let alice_view = alice.wait_for_streams(&[&bob.id, &carol.id]).await;
    let bob_view = bob.wait_for_streams(&[&alice.id, &carol.id]).await;
    let carol_view = carol.wait_for_streams(&[&alice.id, &bob.id]).await;
    assert_peers!(alice_view.connections, ["bob", "carol"]);
    assert_peers!(bob_view.connections, ["alice", "carol"]);
    assert_peers!(carol_view.connections, ["alice", "bob"]);

    let mut sent = offers(&observer.drain().await);
    sent.sort();
    assert_eq!(
        sent,
        vec![
            ("alice".to_string(), "bob".to_string()),
            ("alice".to_string(), "carol".to_string()),
            ("bob".to_string(), "carol".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_peer_leaving_removes_its_entry_and_stream() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let mut alice = Participant::new(&hub, "alice");
    let mut bob = Participant::new(&hub, "bob");

    alice.join(&room).await;
    bob.join(&room).await;
    alice.wait_for_streams(&[&bob.id]).await;

    assert_ok!(bob.controller.end_call().await);

    let alice_view = alice
        .wait_for("bob to be removed", |s| {
            s.peers.is_empty() && s.connections.is_empty() && s.remote_streams.is_empty()
        })
        .await;
    assert_eq!(alice_view.state, CallState::Active);
    assert!(alice_view.last_peer_error.is_none());
    assert_eq!(alice.transport.open_count(), 0);
}

#[tokio::test]
async fn test_rejoin_after_leave_negotiates_again() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let mut alice = Participant::new(&hub, "alice");
    let mut bob = Participant::new(&hub, "bob");

    alice.join(&room).await;
    bob.join(&room).await;
    alice.wait_for_streams(&[&bob.id]).await;

    assert_ok!(bob.controller.end_call().await);
    alice
        .wait_for("bob to be removed", |s| s.peers.is_empty() && s.connections.is_empty())
        .await;

    bob.join(&room).await;
    alice.wait_for_streams(&[&bob.id]).await;
    bob.wait_for_streams(&[&alice.id]).await;

    assert_eq!(alice.transport.created_count(), 2);
    assert_eq!(alice.transport.open_count(), 1);
}

#[tokio::test]
async fn test_occupant_is_listed_before_any_negotiation() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let topic = room.topic(&CallConfig::default().topic_prefix);

    // aaron sorts before alice, so alice waits for an offer that never comes
    let aaron = assert_ok!(hub.subscribe(&topic, "aaron").await);
    assert_ok!(aaron.channel.track(json!({ "user_id": "aaron" })).await);

    let mut alice = Participant::new(&hub, "alice");
    alice.join(&room).await;

    let view = alice.wait_for("aaron to be listed", |s| !s.peers.is_empty()).await;
    assert_peers!(view.peers, ["aaron"]);
    assert!(view.connections.is_empty());
    assert!(view.remote_streams.is_empty());
    assert_eq!(alice.transport.created_count(), 0);

    assert_ok!(aaron.channel.untrack().await);
    alice.wait_for("aaron to leave", |s| s.peers.is_empty()).await;
}

#[tokio::test]
async fn test_stray_signals_leave_session_untouched() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let observer = TopicObserver::attach(&hub, &room).await;
    let mut alice = Participant::new(&hub, "alice");
    alice.join(&room).await;

    observer
        .inject(&SignalingMessage::Answer {
            from: pid("zed"),
            target: alice.id.clone(),
            description: SessionDescription::answer("v=0\r\n"),
        })
        .await;
    observer
        .inject(&SignalingMessage::Candidate {
            from: pid("zed"),
            target: alice.id.clone(),
            candidate: IceCandidate {
                candidate: "candidate:1 1 UDP 2122260223 10.0.0.9 54400 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
                username_fragment: None,
            },
        })
        .await;
    observer
        .inject(&SignalingMessage::Offer {
            from: pid("zed"),
            target: pid("carol"),
            description: SessionDescription::offer("v=0\r\n"),
        })
        .await;
    tokio::time::sleep(QUIET_PERIOD).await;

    let snapshot = alice.snapshot();
    assert_eq!(snapshot.state, CallState::Active);
    assert!(snapshot.connections.is_empty());
    assert!(snapshot.last_peer_error.is_none());
    assert_eq!(alice.transport.created_count(), 0);
}
