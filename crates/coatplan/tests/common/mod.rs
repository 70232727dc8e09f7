//! Shared test utilities for coatplan integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a database, temp-dir storage, queue, coordinator and worker
//! - `ScriptedDetector` for replaying detector results
//! - Builders for raw observations and sample documents

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
