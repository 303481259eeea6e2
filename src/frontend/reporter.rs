// src/frontend/reporter.rs

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, warn};

use crate::engine::PackageId;
use crate::errors::JobError;
use crate::types::{ErrorCode, InfoKind, Percentage, RestartKind, Status};

use super::{FrontendEvent, FrontendSink, JobId, Outcome};

/// Front-end handle of one Job.
///
/// The first error reported wins and becomes the job outcome; later errors
/// are logged and dropped.
///
/// Every overall percentage of the job goes through [`JobReporter::percentage`],
/// which puts `Invalid` in front of any value lower than the last one sent.
pub struct JobReporter {
    job: JobId,
    sink: Arc<dyn FrontendSink>,
    error: Mutex<Option<JobError>>,
    last_percentage: Mutex<Option<u8>>,
}

impl std::fmt::Debug for JobReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobReporter")
            .field("job", &self.job)
            .field("error", &self.error)
            .field("last_percentage", &self.last_percentage)
            .finish_non_exhaustive()
    }
}

impl JobReporter {
    pub fn new(job: JobId, sink: Arc<dyn FrontendSink>) -> Self {
        Self {
            job,
            sink,
            error: Mutex::new(None),
            last_percentage: Mutex::new(None),
        }
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn emit(&self, event: FrontendEvent) {
        self.sink.emit(self.job, event);
    }

    pub fn status(&self, status: Status) {
        debug!(job = %self.job, ?status, "status");
        self.emit(FrontendEvent::Status(status));
    }

    pub fn percentage(&self, value: Percentage) {
        let mut last = self
            .last_percentage
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match value {
            Percentage::Invalid => *last = None,
            Percentage::Value(pct) => {
                if last.is_some_and(|prev| pct < prev) {
                    debug!(job = %self.job, last = ?*last, next = pct, "percentage going back; re-arming");
                    self.emit(FrontendEvent::Percentage(Percentage::Invalid));
                }
                *last = Some(pct);
            }
        }
        self.emit(FrontendEvent::Percentage(value));
    }

    /// Last overall percentage sent; `None` before the first one or right
    /// after `Invalid`.
    pub fn last_percentage(&self) -> Option<u8> {
        *self
            .last_percentage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn item_progress(&self, id: &PackageId, status: Status, percent: u32) {
        self.emit(FrontendEvent::ItemProgress {
            package_id: id.to_string(),
            status,
            percent,
        });
    }

    pub fn package(&self, info: InfoKind, id: &PackageId, summary: &str) {
        self.emit(FrontendEvent::Package {
            info,
            package_id: id.to_string(),
            summary: summary.to_string(),
        });
    }

    /// Size report keyed by a pseudo package id such as `::DOWNLOAD`.
    pub fn size_details(&self, name: &str, bytes: u64) {
        debug!(job = %self.job, name = %name.trim_start_matches(':'), bytes, "reporting size");
        self.emit(FrontendEvent::Details {
            package_id: name.to_string(),
            summary: String::new(),
            license: String::new(),
            group: String::new(),
            url: String::new(),
            size: bytes,
        });
    }

    pub fn details(&self, id: &PackageId, summary: &str, license: &str, group: &str, url: &str, size: u64) {
        self.emit(FrontendEvent::Details {
            package_id: id.to_string(),
            summary: summary.to_string(),
            license: license.to_string(),
            group: group.to_string(),
            url: url.to_string(),
            size,
        });
    }

    pub fn files(&self, id: &PackageId, files: Vec<String>) {
        self.emit(FrontendEvent::Files {
            package_id: id.to_string(),
            files,
        });
    }

    pub fn repo_detail(&self, alias: &str, name: &str, enabled: bool) {
        self.emit(FrontendEvent::Repo {
            alias: alias.to_string(),
            name: name.to_string(),
            enabled,
        });
    }

    pub fn require_restart(&self, restart: RestartKind, id: &PackageId) {
        self.emit(FrontendEvent::RequireRestart {
            restart,
            package_id: id.to_string(),
        });
    }

    pub fn warning(&self, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        warn!(job = %self.job, %code, "{message}");
        self.emit(FrontendEvent::Warning { code, message });
    }

    /// Record a job failure. Only the first one is kept.
    pub fn error(&self, err: JobError) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(first) => {
                debug!(job = %self.job, first = %first, dropped = %err, "error already set");
            }
            None => {
                error!(job = %self.job, code = %err.code, "{}", err.message);
                *slot = Some(err);
            }
        }
    }

    pub fn fail(&self, code: ErrorCode, message: impl Into<String>) {
        self.error(JobError::new(code, message));
    }

    pub fn has_error(&self) -> bool {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn first_error(&self) -> Option<JobError> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Outcome as it stands now.
    pub fn outcome(&self) -> Outcome {
        match self.first_error() {
            None => Outcome::Success,
            Some(err) => Outcome::Failed {
                code: err.code,
                message: err.message,
            },
        }
    }
}
