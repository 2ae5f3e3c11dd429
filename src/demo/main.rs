/**
 * XFCall Demo Entry Point
 *
 * Runs two participants through a call in one room over the in-process
 * realtime hub and the loopback media transport, printing each side's
 * state as the call progresses.
 *
 * Usage: call-demo [room-id]
 */

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use xfcall::backend::realtime::RealtimeHub;
use xfcall::call::{CallController, CallDependencies, CallSnapshot, LoopbackTransport, SyntheticDevices};
use xfcall::shared::{CallConfig, ParticipantId, RoomId};

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

fn participant(hub: &RealtimeHub, config: &CallConfig) -> CallController {
    let deps = CallDependencies {
        realtime: Arc::new(hub.clone()),
        devices: Arc::new(SyntheticDevices::new()),
        transport: Arc::new(LoopbackTransport::new()),
    };
    CallController::new(deps, config.clone())
}

fn describe(name: &str, snapshot: &CallSnapshot) {
    println!(
        "  {:<6} {:<10} mic={:<5} video={:<5} peers={:?} streams={:?}",
        name,
        snapshot.state.to_string(),
        snapshot.mic_enabled,
        snapshot.video_enabled,
        snapshot
            .peers
            .iter()
            .map(ParticipantId::as_str)
            .collect::<Vec<_>>(),
        snapshot
            .remote_streams
            .keys()
            .map(ParticipantId::as_str)
            .collect::<Vec<_>>(),
    );
}

async fn wait_until(
    rx: &mut watch::Receiver<CallSnapshot>,
    what: &str,
    condition: impl FnMut(&CallSnapshot) -> bool,
) -> Result<(), Box<dyn std::error::Error>> {
    tokio::time::timeout(STEP_TIMEOUT, rx.wait_for(condition))
        .await
        .map_err(|_| format!("timed out waiting for {}", what))??;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let room = RoomId::new(std::env::args().nth(1).unwrap_or_else(|| "call-42".to_string()))?;
    let config = CallConfig::load()?;
    tracing::info!("[Demo] Room {} on topic '{}'", room, room.topic(&config.topic_prefix));

    let hub = RealtimeHub::new();
    let alice_id = ParticipantId::new("alice")?;
    let bob_id = ParticipantId::new("bob")?;

    let mut alice = participant(&hub, &config);
    let mut bob = participant(&hub, &config);
    let mut alice_state = alice.subscribe();
    let mut bob_state = bob.subscribe();

    println!("alice joins {}", room);
    alice.start_call(room.clone(), alice_id.clone(), true).await?;
    wait_until(&mut alice_state, "alice to go active", |s| s.state.is_live() && s.local_stream.is_some()).await?;
    describe("alice", &alice.snapshot());

    println!("bob joins {}", room);
    bob.start_call(room.clone(), bob_id.clone(), true).await?;
    wait_until(&mut alice_state, "alice to receive bob's media", |s| {
        s.remote_streams.contains_key(&bob_id)
    })
    .await?;
    wait_until(&mut bob_state, "bob to receive alice's media", |s| {
        s.remote_streams.contains_key(&alice_id)
    })
    .await?;
    describe("alice", &alice.snapshot());
    describe("bob", &bob.snapshot());

    println!("alice mutes, bob turns the camera off");
    alice.toggle_mic();
    bob.toggle_video();
    describe("alice", &alice.snapshot());
    describe("bob", &bob.snapshot());

    println!("bob hangs up");
    bob.end_call().await?;
    wait_until(&mut alice_state, "alice to drop bob", |s| s.peers.is_empty()).await?;
    describe("alice", &alice.snapshot());
    describe("bob", &bob.snapshot());

    println!("alice hangs up");
    alice.end_call().await?;
    describe("alice", &alice.snapshot());

    Ok(())
}
