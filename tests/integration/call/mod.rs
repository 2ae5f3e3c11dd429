//! Call session integration tests

pub mod failure_test;
pub mod flow_test;
pub mod media_test;
pub mod teardown_test;
