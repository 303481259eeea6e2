// src/bridge/mod.rs

//! Callback Bridge: engine events in, front-end events out.
//!
//! One bridge is bound per Job. It borrows the job's reporter, the
//! coordinator-owned progress counters, the job's cancellation token and the
//! process-wide accepted signatures, and is handed to every long-running
//! engine call as `&mut dyn EngineEvents`.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{
    AuthReply, EngineEvents, Flow, KeyInfo, MediaReply, PackageId, ProblemReply, RepoInfo, Trust,
};
use crate::frontend::JobReporter;
use crate::progress::ProgressAggregator;
use crate::types::{ErrorCode, InfoKind, Status};

pub mod trust;

pub use trust::{Approvals, EulaStore, SignaturePrompt, SignatureStore, signature_required};

pub struct CallbackBridge<'a> {
    reporter: &'a JobReporter,
    progress: &'a mut ProgressAggregator,
    cancel: &'a CancellationToken,
    signatures: &'a SignatureStore,
    /// Repository being refreshed, for trust prompts.
    repo: Option<RepoInfo>,
    current: Option<PackageId>,
    sub_percentage: u32,
}

impl std::fmt::Debug for CallbackBridge<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackBridge")
            .field("job", &self.reporter.job())
            .field("repo", &self.repo.as_ref().map(|r| r.alias.as_str()))
            .field("current", &self.current)
            .field("sub_percentage", &self.sub_percentage)
            .finish_non_exhaustive()
    }
}

impl<'a> CallbackBridge<'a> {
    pub fn new(
        reporter: &'a JobReporter,
        progress: &'a mut ProgressAggregator,
        cancel: &'a CancellationToken,
        signatures: &'a SignatureStore,
    ) -> Self {
        Self {
            reporter,
            progress,
            cancel,
            signatures,
            repo: None,
            current: None,
            sub_percentage: 0,
        }
    }

    pub fn reporter(&self) -> &'a JobReporter {
        self.reporter
    }

    pub fn counters(&self) -> &ProgressAggregator {
        &*self.progress
    }

    pub fn counters_mut(&mut self) -> &mut ProgressAggregator {
        &mut *self.progress
    }

    pub fn signatures(&self) -> &'a SignatureStore {
        self.signatures
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Repository the following trust questions are about.
    pub fn set_repo(&mut self, repo: Option<RepoInfo>) {
        self.repo = repo;
    }

    pub fn current_item(&self) -> Option<&PackageId> {
        self.current.as_ref()
    }

    fn start_item(&mut self, id: &PackageId) {
        self.current = Some(id.clone());
        self.sub_percentage = 0;
    }

    fn clear_item(&mut self) {
        self.current = None;
    }

    fn update_sub_percentage(&mut self, percent: u32, status: Status) {
        if percent == self.sub_percentage {
            return;
        }
        let Some(id) = self.current.as_ref() else {
            debug!(percent, "percentage without package");
            return;
        };
        if percent > 100 {
            debug!(package = %id, percent, "dropping out-of-range percentage");
            return;
        }
        self.sub_percentage = percent;
        self.reporter.item_progress(id, status, percent);
    }

    fn ask(&self, prompt: SignaturePrompt) -> Trust {
        signature_required(self.signatures, self.reporter, self.repo.as_ref(), prompt)
    }
}

impl EngineEvents for CallbackBridge<'_> {
    fn download_start(&mut self, id: &PackageId, summary: &str) {
        debug!(package = %id, "download start");
        self.start_item(id);
        self.reporter.status(Status::Download);
        self.reporter.package(InfoKind::Downloading, id, summary);
    }

    fn download_progress(&mut self, _id: &PackageId, percent: u32) -> Flow {
        if self.cancel.is_cancelled() {
            info!(job = %self.reporter.job(), "download cancelled");
            return Flow::Cancel;
        }
        self.update_sub_percentage(percent, Status::Download);
        Flow::Continue
    }

    fn download_finish(&mut self, id: &PackageId, error: Option<&str>) {
        if let Some(err) = error {
            warn!(package = %id, "download failed: {err}");
        }
        self.update_sub_percentage(100, Status::Download);
        self.progress.download_finished(self.reporter);
        self.clear_item();
    }

    fn install_start(&mut self, id: &PackageId, summary: &str) {
        debug!(package = %id, "install start");
        self.start_item(id);
        self.reporter.status(Status::Install);
        self.reporter.package(InfoKind::Installing, id, summary);
    }

    fn install_progress(&mut self, _id: &PackageId, percent: u32) -> Flow {
        self.update_sub_percentage(percent, Status::Install);
        Flow::Continue
    }

    fn install_problem(&mut self, id: &PackageId, description: &str) -> ProblemReply {
        warn!(package = %id, "install problem: {description}");
        self.reporter
            .fail(ErrorCode::PackageFailedToInstall, description);
        ProblemReply::Abort
    }

    fn install_finish(&mut self, id: &PackageId, error: Option<&str>) {
        if let Some(err) = error {
            warn!(package = %id, "install finished with error: {err}");
        }
        if self.current.is_none() {
            return;
        }
        self.progress.installation_finished(self.reporter);
        self.update_sub_percentage(100, Status::Install);
        self.clear_item();
    }

    fn remove_start(&mut self, id: &PackageId) {
        debug!(package = %id, "remove start");
        self.start_item(id);
        self.reporter.status(Status::Remove);
        self.reporter.package(InfoKind::Removing, id, "");
    }

    fn remove_progress(&mut self, _id: &PackageId, percent: u32) -> Flow {
        self.update_sub_percentage(percent, Status::Remove);
        Flow::Continue
    }

    fn remove_problem(&mut self, id: &PackageId, description: &str) -> ProblemReply {
        warn!(package = %id, "remove problem: {description}");
        self.reporter
            .fail(ErrorCode::CannotRemoveSystemPackage, description);
        ProblemReply::Abort
    }

    fn remove_finish(&mut self, id: &PackageId, error: Option<&str>) {
        if let Some(err) = error {
            warn!(package = %id, "remove finished with error: {err}");
        }
        let Some(current) = self.current.take() else {
            return;
        };
        self.progress.removal_finished(self.reporter);
        self.reporter.package(InfoKind::Finished, &current, "");
    }

    fn progress_start(&mut self, label: &str) {
        debug!(label, "progress start");
        self.sub_percentage = 0;
    }

    fn progress(&mut self, _label: &str, value: u32) -> Flow {
        self.update_sub_percentage(value, Status::Unknown);
        Flow::Continue
    }

    fn progress_finish(&mut self, label: &str) {
        debug!(label, "progress finish");
    }

    fn media_change(&mut self, url: &str, description: &str) -> MediaReply {
        info!(url, "media change requested; aborting");
        self.reporter.fail(ErrorCode::RepoNotAvailable, description);
        MediaReply::Abort
    }

    fn authenticate(&mut self, url: &str, _description: &str) -> AuthReply {
        info!(url, "authentication requested; not supported");
        AuthReply::Abort
    }

    fn accept_key(&mut self, key: &KeyInfo) -> Trust {
        self.ask(SignaturePrompt::for_key(key))
    }

    fn accept_unsigned_file(&mut self, file: &str) -> Trust {
        self.ask(SignaturePrompt::for_file(file))
    }

    fn accept_unknown_key(&mut self, _file: &str, key_id: &str) -> Trust {
        self.ask(SignaturePrompt::for_key_id(key_id))
    }

    fn accept_verification_failed(&mut self, _file: &str, key: &KeyInfo) -> Trust {
        self.ask(SignaturePrompt::for_key(key))
    }

    fn accept_no_digest(&mut self, file: &str) -> Trust {
        self.ask(SignaturePrompt::for_file(file))
    }

    fn accept_unknown_digest(&mut self, file: &str, name: &str) -> Trust {
        self.reporter
            .fail(ErrorCode::GpgFailure, format!("Repo: {file} Digest: {name}"));
        self.ask(SignaturePrompt::for_file(file))
    }

    fn accept_wrong_digest(&mut self, file: &str, requested: &str, found: &str) -> Trust {
        self.reporter.fail(
            ErrorCode::GpgFailure,
            format!("For repo {file} {requested} is requested but {found} was found!"),
        );
        self.ask(SignaturePrompt::for_file(file))
    }
}
