#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use pkbridge::cache_root::{CacheRootSwitch, CacheRoots};
use pkbridge::frontend::Outcome;
use pkbridge::fs::mock::MockFileSystem;
use pkbridge::job::{Coordinator, JobSettings};
use pkbridge::ops::Request;

use crate::fake_engine::{FakeEngine, Journal};
use crate::sink::RecordingSink;

pub const REGULAR: &str = "/cache/regular";
pub const DIST_UPGRADE: &str = "/cache/dist-upgrade";
pub const REDIRECT: &str = "/cache/active";
pub const ENGINE_ROOT: &str = "/";
pub const REBUILD_MARKER: &str = "/var/lib/pkbridge/scheduled-rebuilddb";

pub fn cache_roots() -> CacheRoots {
    CacheRoots {
        regular: PathBuf::from(REGULAR),
        dist_upgrade: PathBuf::from(DIST_UPGRADE),
        redirect: PathBuf::from(REDIRECT),
    }
}

pub fn job_settings() -> JobSettings {
    JobSettings {
        engine_root: PathBuf::from(ENGINE_ROOT),
        rebuild_marker: PathBuf::from(REBUILD_MARKER),
        recovery_command: None,
        protected: vec!["glibc".to_string()],
        hide_packages: false,
    }
}

/// A coordinator over a [`FakeEngine`], a mock filesystem and a recording
/// sink.
pub struct Harness {
    pub coordinator: Coordinator,
    pub sink: Arc<RecordingSink>,
    pub fs: MockFileSystem,
    pub journal: Journal,
}

impl Harness {
    pub fn new(engine: FakeEngine) -> Self {
        Self::with_settings(engine, job_settings())
    }

    pub fn with_settings(engine: FakeEngine, settings: JobSettings) -> Self {
        let fs = MockFileSystem::new();
        let sink = RecordingSink::new();
        let journal = engine.journal();
        let shared: Arc<dyn pkbridge::fs::FileSystem> = Arc::new(fs.clone());
        let cache = CacheRootSwitch::new(Arc::clone(&shared), cache_roots());
        let coordinator = Coordinator::new(
            Box::new(engine),
            shared,
            cache,
            settings,
            Arc::clone(&sink) as Arc<dyn pkbridge::frontend::FrontendSink>,
        );
        Self {
            coordinator,
            sink,
            fs,
            journal,
        }
    }

    pub fn run(&self, request: Request) -> Outcome {
        self.coordinator.execute(&request)
    }
}
