//! Shared test utilities for stowage integration tests.
//!
//! This module provides:
//! - `TestHarness`: an orchestrator wired to in-process fakes and a temp directory
//! - `RecordingStore`: a record store that remembers every status it persisted

pub mod harness;
pub mod recording_store;

pub use harness::TestHarness;
pub use recording_store::RecordingStore;
