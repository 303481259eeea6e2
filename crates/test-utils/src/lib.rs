//! Shared fixtures for the `pkbridge` integration tests.
//!
//! - [`fake_engine::FakeEngine`]: scripted [`pkbridge::engine::Engine`] that
//!   journals every call
//! - [`builders`]: pool items, repositories and configs
//! - [`sink::RecordingSink`]: collects front-end events
//! - [`harness::Harness`]: a coordinator wired to all of the above on a mock
//!   file system

pub mod builders;
pub mod fake_engine;
pub mod harness;
pub mod sink;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Output is captured per test and only shown for failures. `RUST_LOG`
/// overrides the default, e.g. `RUST_LOG=pkbridge::ops=trace`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("pkbridge=debug"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}
