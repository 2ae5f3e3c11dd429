//! Local mute controls and remote track state

use crate::common::*;
use std::time::Duration;
use xfcall::backend::realtime::RealtimeHub;
use xfcall::call::{SyntheticDevices, TrackKind};

#[tokio::test]
async fn test_toggle_mic_twice_keeps_tracks() {
    let hub = RealtimeHub::new();
    let mut alice = Participant::new(&hub, "alice");
    alice.join(&room("call-42")).await;
    let stream = alice.snapshot().local_stream.expect("local stream");
    let before = stream.track_count();

    assert!(!alice.controller.toggle_mic());
    assert!(!alice.snapshot().mic_enabled);
    assert!(alice.controller.toggle_mic());
    assert!(alice.snapshot().mic_enabled);

    assert_eq!(stream.track_count(), before);
    assert_eq!(stream.live_track_count(), before);
}

#[tokio::test]
async fn test_toggles_do_nothing_without_session() {
    let hub = RealtimeHub::new();
    let alice = Participant::new(&hub, "alice");

    assert!(!alice.controller.toggle_mic());
    assert!(!alice.controller.toggle_video());
    assert!(!alice.snapshot().mic_enabled);
}

#[tokio::test]
async fn test_audio_only_call_has_no_video() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let mut alice = Participant::new(&hub, "alice");
    let mut bob = Participant::new(&hub, "bob");

    alice
        .controller
        .start_call(room.clone(), alice.id.clone(), false)
        .await
        .expect("start_call");
    bob.join(&room).await;

    let view = bob.wait_for_streams(&[&alice.id]).await;
    let stream = &view.remote_streams[&alice.id];
    assert!(!stream.has_video());
    assert!(stream.is_enabled(TrackKind::Audio));
    assert!(!alice.snapshot().video_enabled);
}

#[tokio::test]
async fn test_remote_mute_event_updates_stream() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let mut alice = Participant::new(&hub, "alice");
    let mut bob = Participant::new(&hub, "bob");

    alice.join(&room).await;
    bob.join(&room).await;
    let view = alice.wait_for_streams(&[&bob.id]).await;
    assert!(view.remote_streams[&bob.id].is_enabled(TrackKind::Audio));

    assert_eq!(alice.transport.set_remote_track_enabled(&bob.id, TrackKind::Audio, false), 1);
    let bob_id = bob.id.clone();
    alice
        .wait_for("bob's audio to be muted", |s| {
            s.remote_streams
                .get(&bob_id)
                .map_or(false, |stream| !stream.is_enabled(TrackKind::Audio))
        })
        .await;

    alice.transport.set_remote_track_enabled(&bob.id, TrackKind::Audio, true);
    alice
        .wait_for("bob's audio to come back", |s| {
            s.remote_streams
                .get(&bob_id)
                .map_or(false, |stream| stream.is_enabled(TrackKind::Audio))
        })
        .await;
}

#[tokio::test]
async fn test_polling_notices_silent_remote_change() {
    let hub = RealtimeHub::new();
    let room = room("call-42");
    let config = polling_config(Duration::from_millis(20));
    let mut alice = Participant::with(&hub, "alice", SyntheticDevices::new(), config.clone());
    let mut bob = Participant::with(&hub, "bob", SyntheticDevices::new(), config);

    alice.join(&room).await;
    bob.join(&room).await;
    alice.wait_for_streams(&[&bob.id]).await;

    assert_eq!(
        alice
            .transport
            .set_remote_track_enabled_silently(&bob.id, TrackKind::Video, false),
        1
    );
    let bob_id = bob.id.clone();
    alice
        .wait_for("poll to see bob's camera off", |s| {
            s.remote_streams
                .get(&bob_id)
                .map_or(false, |stream| !stream.is_enabled(TrackKind::Video))
        })
        .await;
}
