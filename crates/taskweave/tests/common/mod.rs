//! Shared utilities for taskweave integration tests.
//!
//! - `TestHarness` wraps a running `TaskWeave` with polling helpers
//! - builders create configs and source payloads without boilerplate
//! - fakes stand in for slow or controllable collaborators

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::{GatedBody, SlowTaskStore};
pub use harness::TestHarness;
