//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Participants wired to an in-process realtime hub
//! - A raw topic observer for counting and injecting signaling messages
//! - Custom assertion macros

pub mod assertions;
pub mod fixtures;

pub use fixtures::*;
