//! Backend Module
//!
//! Services the call layer consumes rather than implements. Today that is the
//! realtime presence/broadcast service used as the signaling bus.
//!
//! The call layer only ever sees the traits in `realtime::channel`; the
//! in-process `RealtimeHub` is one implementation of them and is what the demo
//! binary and the test suite run against.

/// Realtime presence and broadcast
pub mod realtime;

pub use realtime::{RealtimeChannel, RealtimeClient, RealtimeError, RealtimeHub};
