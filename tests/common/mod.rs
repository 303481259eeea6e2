#![allow(dead_code)]

pub use pkbridge_test_utils::builders::{self, package, patch, pattern, repo};
pub use pkbridge_test_utils::fake_engine::{EngineCall, FakeEngine};
pub use pkbridge_test_utils::harness::{self, Harness};
pub use pkbridge_test_utils::init_tracing;
pub use pkbridge_test_utils::sink::RecordingSink;
