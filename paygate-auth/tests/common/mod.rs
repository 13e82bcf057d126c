//! Shared fixtures for integration tests.

mod harness;

pub use harness::*;
