// src/engine/mod.rs

//! Contract of the resolution / transaction engine.
//!
//! The bridge never talks to a package database directly. Everything goes
//! through the [`Engine`] trait:
//! - pool enumeration and status marking ([`pool`])
//! - repository refresh, cache build and cache load
//! - dependency resolution with a problem list
//! - commit with per-step results
//! - free disk space and local package headers
//!
//! Long-running calls report back through an [`EngineEvents`] sink passed in
//! by the caller, and the caller answers with typed replies.
//!
//! [`local::LocalEngine`] is the file-backed implementation used by the CLI.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ErrorCode;

pub mod local;
pub mod pool;

pub use pool::{
    ItemKind, PackageId, PatchCategory, PatchContent, PatchInfo, Pool, PoolItem, Transact,
};

/// Collaborator failures, each mapped to one front-end error code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("repository '{0}' not found")]
    RepoNotFound(String),

    #[error("repository '{0}' already exists")]
    RepoAlreadyExists(String),

    #[error("invalid repository definition: {0}")]
    RepoConfiguration(String),

    #[error("{0}")]
    Media(String),

    #[error("package database is broken: {0}")]
    BrokenDatabase(String),

    #[error("package database is locked: {0}")]
    Locked(String),

    #[error("{0}")]
    Rpm(String),

    /// A trust callback refused the repository; only the refresh call site
    /// may see this.
    #[error("refresh aborted by signature check")]
    RefreshAborted,

    #[error("operation cancelled")]
    Cancelled,

    #[error("package not found: {0}")]
    PackageNotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::RepoNotFound(_) => ErrorCode::RepoNotFound,
            EngineError::RepoAlreadyExists(_) => ErrorCode::InternalError,
            EngineError::RepoConfiguration(_) => ErrorCode::RepoConfiguration,
            EngineError::Media(_) => ErrorCode::RepoNotAvailable,
            EngineError::BrokenDatabase(_) | EngineError::Locked(_) => {
                ErrorCode::FailedInitialization
            }
            EngineError::Rpm(_) => ErrorCode::PackageDownloadFailed,
            EngineError::RefreshAborted => ErrorCode::GpgFailure,
            EngineError::Cancelled => ErrorCode::TransactionCancelled,
            EngineError::PackageNotFound(_) => ErrorCode::PackageNotFound,
            EngineError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(format!("{err:#}"))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// A configured repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RepoInfo {
    pub alias: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub autorefresh: bool,
    pub baseurl: String,
    #[serde(default = "default_true")]
    pub gpgcheck: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_fingerprint: Option<String>,
    /// 1 is the highest priority.
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Keep downloaded payloads after installing them.
    #[serde(default)]
    pub keep_packages: bool,
}

fn default_true() -> bool {
    true
}

pub const DEFAULT_REPO_PRIORITY: u32 = 99;

fn default_priority() -> u32 {
    DEFAULT_REPO_PRIORITY
}

impl RepoInfo {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.alias
        } else {
            &self.name
        }
    }

    /// A fresh, enabled and autorefreshed definition.
    pub fn new(alias: impl Into<String>, baseurl: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            name: String::new(),
            enabled: true,
            autorefresh: true,
            baseurl: baseurl.into(),
            gpgcheck: true,
            key_id: None,
            key_name: None,
            key_fingerprint: None,
            priority: DEFAULT_REPO_PRIORITY,
            keep_packages: false,
        }
    }

    /// Debug, source and development repositories.
    pub fn is_development(&self) -> bool {
        ["-debuginfo", "-debug", "-source", "-development"]
            .iter()
            .any(|suffix| self.alias.contains(suffix))
    }

    /// Removable media that cannot be refreshed unattended.
    pub fn is_volatile(&self) -> bool {
        ["cd://", "dvd://"]
            .iter()
            .any(|scheme| self.baseurl.starts_with(scheme))
    }
}

/// Public key as presented to trust callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub id: String,
    pub name: String,
    pub fingerprint: String,
}

/// Metadata read from a local package file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageHeader {
    pub name: String,
    pub version: String,
    #[serde(default = "default_arch")]
    pub arch: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub size: u64,
}

fn default_arch() -> String {
    "noarch".to_string()
}

/// Resolver knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Remove conflicting installed items instead of reporting a problem.
    pub force_resolve: bool,
    pub ignore_already_recommended: bool,
    /// Distribution upgrade: every installed name moves to its best candidate.
    pub upgrade_mode: bool,
    /// Update installed items that have newer candidates.
    pub update_mode: bool,
    /// Removing an item also removes dependencies nobody else needs.
    pub cleandeps_on_remove: bool,
}

impl ResolverSettings {
    /// Reset the per-run knobs. Upgrade and update modes survive a reset and
    /// must be cleared explicitly.
    pub fn reset(&mut self) {
        self.force_resolve = false;
        self.ignore_already_recommended = false;
        self.cleandeps_on_remove = false;
    }
}

/// One unsatisfiable constraint found by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub description: String,
    pub details: String,
}

impl Problem {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            details: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Solved,
    Unsatisfiable(Vec<Problem>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    /// Download everything first, then install.
    InHeaps,
    /// Download and stop.
    Only,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPolicy {
    /// `0` lifts any restriction to a single medium.
    pub restrict_to_media: u32,
    pub download_mode: DownloadMode,
    /// Reject packages without a valid signature.
    pub verify_signatures: bool,
    pub sync_pool_after_commit: bool,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            restrict_to_media: 0,
            download_mode: DownloadMode::InHeaps,
            verify_signatures: false,
            sync_pool_after_commit: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Install,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Todo,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitStep {
    pub id: PackageId,
    pub action: StepAction,
    pub state: StepState,
}

/// Per-step outcome of a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitResult {
    pub steps: Vec<CommitStep>,
}

impl CommitResult {
    pub fn all_done(&self) -> bool {
        self.steps.iter().all(|s| s.state == StepState::Done)
    }

    pub fn no_error(&self) -> bool {
        self.steps.iter().all(|s| s.state != StepState::Error)
    }

    pub fn not_done(&self) -> impl Iterator<Item = &CommitStep> {
        self.steps.iter().filter(|s| s.state != StepState::Done)
    }
}

/// Reply to a progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaReply {
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthReply {
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemReply {
    Abort,
}

/// Reply to a trust question raised while refreshing a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    Accept,
    /// Stop the refresh; the engine returns [`EngineError::RefreshAborted`].
    AbortRefresh,
}

/// Event sink handed to every long-running engine call.
pub trait EngineEvents {
    fn download_start(&mut self, id: &PackageId, summary: &str);
    fn download_progress(&mut self, id: &PackageId, percent: u32) -> Flow;
    fn download_finish(&mut self, id: &PackageId, error: Option<&str>);

    fn install_start(&mut self, id: &PackageId, summary: &str);
    fn install_progress(&mut self, id: &PackageId, percent: u32) -> Flow;
    fn install_problem(&mut self, id: &PackageId, description: &str) -> ProblemReply;
    fn install_finish(&mut self, id: &PackageId, error: Option<&str>);

    fn remove_start(&mut self, id: &PackageId);
    fn remove_progress(&mut self, id: &PackageId, percent: u32) -> Flow;
    fn remove_problem(&mut self, id: &PackageId, description: &str) -> ProblemReply;
    fn remove_finish(&mut self, id: &PackageId, error: Option<&str>);

    /// Generic progress of repository refresh and cache building.
    fn progress_start(&mut self, label: &str);
    fn progress(&mut self, label: &str, value: u32) -> Flow;
    fn progress_finish(&mut self, label: &str);

    fn media_change(&mut self, url: &str, description: &str) -> MediaReply;
    fn authenticate(&mut self, url: &str, description: &str) -> AuthReply;

    fn accept_key(&mut self, key: &KeyInfo) -> Trust;
    fn accept_unsigned_file(&mut self, file: &str) -> Trust;
    fn accept_unknown_key(&mut self, file: &str, key_id: &str) -> Trust;
    fn accept_verification_failed(&mut self, file: &str, key: &KeyInfo) -> Trust;
    fn accept_no_digest(&mut self, file: &str) -> Trust;
    fn accept_unknown_digest(&mut self, file: &str, name: &str) -> Trust;
    fn accept_wrong_digest(&mut self, file: &str, requested: &str, found: &str) -> Trust;
}

/// The resolution / transaction engine.
///
/// The engine is a single non-reentrant resource; callers serialise access.
pub trait Engine: Send {
    /// Open the installed-package database under `root`.
    fn initialize_target(&mut self, root: &Path) -> EngineResult<()>;

    /// (Re)load installed items into the pool.
    fn load_installed(&mut self) -> EngineResult<()>;

    fn pool(&self) -> &Pool;
    fn pool_mut(&mut self) -> &mut Pool;

    fn known_repos(&self) -> EngineResult<Vec<RepoInfo>>;

    /// Store a new repository definition. Fails if the alias is taken.
    fn add_repo(&mut self, repo: &RepoInfo) -> EngineResult<()>;
    /// Replace the definition stored under `alias`.
    fn modify_repo(&mut self, alias: &str, repo: &RepoInfo) -> EngineResult<()>;
    /// Forget the definition and cached data of `alias`.
    fn remove_repo(&mut self, alias: &str) -> EngineResult<()>;

    fn refresh_metadata(
        &mut self,
        repo: &RepoInfo,
        force: bool,
        events: &mut dyn EngineEvents,
    ) -> EngineResult<()>;
    fn build_cache(
        &mut self,
        repo: &RepoInfo,
        force: bool,
        events: &mut dyn EngineEvents,
    ) -> EngineResult<()>;
    fn clean_cache(&mut self, repo: &RepoInfo) -> EngineResult<()>;
    fn is_cached(&self, repo: &RepoInfo) -> bool;
    fn load_from_cache(&mut self, repo: &RepoInfo) -> EngineResult<()>;

    fn resolver(&self) -> &ResolverSettings;
    fn resolver_mut(&mut self) -> &mut ResolverSettings;

    /// Complete the pool's marks into a consistent plan.
    fn resolve(&mut self) -> EngineResult<Resolution>;

    fn commit(
        &mut self,
        policy: &CommitPolicy,
        events: &mut dyn EngineEvents,
    ) -> EngineResult<CommitResult>;

    fn free_space(&self, path: &Path) -> EngineResult<u64>;

    fn read_package_header(&self, path: &Path) -> EngineResult<PackageHeader>;
}
