// src/frontend/mod.rs

//! Everything the front-end gets to see.
//!
//! Jobs never print. They emit [`FrontendEvent`]s into a [`FrontendSink`];
//! the CLI installs a [`ChannelSink`] whose receiving end is drained by
//! [`printer::print_events`]. Tests install a recording sink instead.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::types::{ErrorCode, InfoKind, Percentage, RestartKind, Status};

pub mod printer;
pub mod reporter;

pub use reporter::JobReporter;

/// Identifier of one front-end request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Final result of a Job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum Outcome {
    Success,
    Failed { code: ErrorCode, message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Outcome::Success => None,
            Outcome::Failed { code, .. } => Some(*code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum FrontendEvent {
    /// The engine is held by this job.
    Locked(bool),
    Status(Status),
    Percentage(Percentage),
    ItemProgress {
        package_id: String,
        status: Status,
        percent: u32,
    },
    Package {
        info: InfoKind,
        package_id: String,
        summary: String,
    },
    /// Package details; also used for the `::DOWNLOAD`-style size reports.
    Details {
        package_id: String,
        summary: String,
        license: String,
        group: String,
        url: String,
        size: u64,
    },
    /// Files owned by a package.
    Files {
        package_id: String,
        files: Vec<String>,
    },
    UpdateDetail {
        package_id: String,
        /// Package ids the update replaces.
        obsoletes: Vec<String>,
        bugzilla: Vec<String>,
        cve: Vec<String>,
        restart: RestartKind,
        update_text: String,
    },
    /// One configured repository.
    Repo {
        alias: String,
        name: String,
        enabled: bool,
    },
    EulaRequired {
        eula_id: String,
        package_id: String,
        vendor: String,
        license: String,
    },
    RepoSignatureRequired {
        package_id: String,
        repo: String,
        url: String,
        key_name: String,
        key_id: String,
        fingerprint: String,
    },
    RequireRestart {
        restart: RestartKind,
        package_id: String,
    },
    /// A problem that does not end the job.
    Warning {
        code: ErrorCode,
        message: String,
    },
    Finished(Outcome),
}

/// Where job events go.
pub trait FrontendSink: Send + Sync {
    fn emit(&self, job: JobId, event: FrontendEvent);
}

/// Forwards events over an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(JobId, FrontendEvent)>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(JobId, FrontendEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FrontendSink for ChannelSink {
    fn emit(&self, job: JobId, event: FrontendEvent) {
        // The printer going away only means nobody is listening any more.
        let _ = self.tx.send((job, event));
    }
}
