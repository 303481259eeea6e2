// src/bridge/trust.rs

//! Accepted signatures and the "signature required" answer.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::engine::{KeyInfo, RepoInfo, Trust};
use crate::frontend::{FrontendEvent, JobReporter};
use crate::types::ErrorCode;

/// Placeholder package id carried by repository signature prompts.
pub const SIGNATURE_PACKAGE_ID: &str = "dummy;0.0.1;i386;data";

/// Stand-in for key fields the engine could not provide.
pub const UNKNOWN: &str = "UNKNOWN";

/// Identifiers the front-end pre-approved: signing keys for repositories,
/// license ids for packages. Lives for the process lifetime only.
#[derive(Debug)]
pub struct Approvals {
    kind: &'static str,
    accepted: Mutex<HashSet<String>>,
}

/// Accepted key ids and file names.
pub type SignatureStore = Approvals;

/// Accepted license agreements, keyed by eula id.
pub type EulaStore = Approvals;

impl Approvals {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            accepted: Mutex::new(HashSet::new()),
        }
    }

    pub fn signatures() -> Self {
        Self::new("signature")
    }

    pub fn eulas() -> Self {
        Self::new("eula")
    }

    pub fn accept(&self, id: impl Into<String>) {
        let id = id.into();
        info!(kind = self.kind, id = %id, "accepted");
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    pub fn is_accepted(&self, id: &str) -> bool {
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    pub fn len(&self) -> usize {
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a trust question presented to the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePrompt {
    /// Identifier looked up in the accepted set.
    pub lookup: String,
    pub key_name: String,
    pub key_id: String,
    pub fingerprint: String,
}

impl SignaturePrompt {
    pub fn for_key(key: &KeyInfo) -> Self {
        Self {
            lookup: key.id.clone(),
            key_name: key.name.clone(),
            key_id: key.id.clone(),
            fingerprint: key.fingerprint.clone(),
        }
    }

    /// Key id known, nothing else.
    pub fn for_key_id(id: &str) -> Self {
        Self {
            lookup: id.to_string(),
            key_name: id.to_string(),
            key_id: id.to_string(),
            fingerprint: UNKNOWN.to_string(),
        }
    }

    /// Only the file in question is known.
    pub fn for_file(file: &str) -> Self {
        Self {
            lookup: file.to_string(),
            key_name: UNKNOWN.to_string(),
            key_id: file.to_string(),
            fingerprint: UNKNOWN.to_string(),
        }
    }
}

/// Trust `prompt` if pre-approved; otherwise tell the front-end and abort
/// the refresh.
pub fn signature_required(
    store: &SignatureStore,
    reporter: &JobReporter,
    repo: Option<&RepoInfo>,
    prompt: SignaturePrompt,
) -> Trust {
    if store.is_accepted(&prompt.lookup) {
        debug!(key = %prompt.lookup, "pre-approved signature");
        return Trust::Accept;
    }

    match repo {
        None => reporter.fail(ErrorCode::InternalError, "Repository unknown"),
        Some(repo) => {
            info!(repo = %repo.alias, key = %prompt.key_id, "signature required");
            reporter.emit(FrontendEvent::RepoSignatureRequired {
                package_id: SIGNATURE_PACKAGE_ID.to_string(),
                repo: repo.alias.clone(),
                url: repo.baseurl.clone(),
                key_name: prompt.key_name,
                key_id: prompt.key_id,
                fingerprint: prompt.fingerprint,
            });
            reporter.fail(
                ErrorCode::GpgFailure,
                format!("Signature verification for Repository {} failed", repo.alias),
            );
        }
    }

    Trust::AbortRefresh
}
