// src/job/context.rs

use std::path::PathBuf;

use crate::bridge::{CallbackBridge, EulaStore};
use crate::cache_root::CacheRootSwitch;
use crate::engine::Engine;
use crate::frontend::JobReporter;

/// Knobs every Job sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    /// Root the installed-package database lives under.
    pub engine_root: PathBuf,
    /// Touched when the package database looks broken.
    pub rebuild_marker: PathBuf,
    /// Shell command that tries to repair a broken package database.
    pub recovery_command: Option<String>,
    /// Packages a transaction may never remove.
    pub protected: Vec<String>,
    /// Report only patches from `get-updates`.
    pub hide_packages: bool,
}

impl JobSettings {
    pub fn is_protected(&self, name: &str) -> bool {
        self.protected.iter().any(|p| p == name)
    }
}

/// Everything an operation may touch while its Job holds the engine.
pub struct JobContext<'a> {
    pub engine: &'a mut dyn Engine,
    pub bridge: CallbackBridge<'a>,
    pub settings: &'a JobSettings,
    pub eulas: &'a EulaStore,
    pub cache: &'a CacheRootSwitch,
}

impl std::fmt::Debug for JobContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("bridge", &self.bridge)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<'a> JobContext<'a> {
    pub fn reporter(&self) -> &'a JobReporter {
        self.bridge.reporter()
    }
}
