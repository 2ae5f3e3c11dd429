//! Property-based tests

pub mod identity_proptest;
pub mod roster_proptest;
pub mod signaling_proptest;
