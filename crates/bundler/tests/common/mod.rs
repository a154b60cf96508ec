//! Shared test utilities for bundler integration tests.

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{fast_retry, LaggyStore, TestHarness};
