//! Integration tests
//!
//! Whole calls run over the in-process hub with loopback media.

pub mod call;
