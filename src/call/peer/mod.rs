//! Peer connections
//!
//! - **`manager`** - `PeerConnectionManager`, the offer/answer/candidate
//!   state machine for every remote participant
//! - **`table`** - `PeerTable`, the entries and remote streams it owns

pub mod manager;
pub mod table;

pub use manager::{EnsureOutcome, PeerConnectionManager};
pub use table::{PeerEntry, PeerTable, RemoteStream};
