// src/ops/mod.rs

//! Front-end operations.
//!
//! Each [`Request`] maps to one function here that runs while its Job holds
//! the engine. Operations mark the pool and hand over to the Transaction
//! Executor; queries only read the pool and emit package notifications.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::bridge::SignatureStore;
use crate::engine::{Engine, PackageId, PoolItem};
use crate::errors::{JobError, JobResult};
use crate::frontend::JobReporter;
use crate::job::JobContext;
use crate::types::{ErrorCode, Filter, SearchKind, Status, TransactionFlags, UpgradeKind};

pub mod info;
pub mod packages;
pub mod query;
pub mod refresh;
pub mod repos;
pub mod upgrade;

pub use refresh::refresh_sources;

/// One front-end request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Refresh {
        force: bool,
    },
    Install {
        package_ids: Vec<PackageId>,
        flags: TransactionFlags,
    },
    Remove {
        package_ids: Vec<PackageId>,
        flags: TransactionFlags,
        /// Let the resolver remove whatever depends on the removed items.
        allow_deps: bool,
        /// Also remove dependencies nothing else needs.
        autoremove: bool,
    },
    Update {
        package_ids: Vec<PackageId>,
        flags: TransactionFlags,
    },
    UpgradeSystem {
        distro_id: String,
        kind: UpgradeKind,
        flags: TransactionFlags,
    },
    GetUpdates {
        filter: Filter,
    },
    Search {
        kind: SearchKind,
        terms: Vec<String>,
        filter: Filter,
    },
    Download {
        package_ids: Vec<PackageId>,
    },
    DetailsLocal {
        paths: Vec<PathBuf>,
    },
    InstallSignature {
        key_id: String,
    },
    Resolve {
        names: Vec<String>,
        filter: Filter,
        /// Keep only the installed and the newest edition of each name.
        newest: bool,
    },
    GetDetails {
        package_ids: Vec<PackageId>,
    },
    GetFiles {
        package_ids: Vec<PackageId>,
    },
    DependsOn {
        package_ids: Vec<PackageId>,
        filter: Filter,
    },
    RequiredBy {
        package_ids: Vec<PackageId>,
        filter: Filter,
    },
    WhatProvides {
        terms: Vec<String>,
        filter: Filter,
    },
    GetPackages {
        filter: Filter,
    },
    GetUpdateDetail {
        package_ids: Vec<PackageId>,
    },
    GetRepoList {
        /// Leave out debug, source and development repositories.
        hide_development: bool,
    },
    RepoEnable {
        alias: String,
        enabled: bool,
    },
    RepoSetData {
        alias: String,
        parameter: String,
        value: String,
    },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Refresh { .. } => "refresh",
            Request::Install { .. } => "install",
            Request::Remove { .. } => "remove",
            Request::Update { .. } => "update",
            Request::UpgradeSystem { .. } => "upgrade-system",
            Request::GetUpdates { .. } => "get-updates",
            Request::Search { .. } => "search",
            Request::Download { .. } => "download",
            Request::DetailsLocal { .. } => "details-local",
            Request::InstallSignature { .. } => "install-signature",
            Request::Resolve { .. } => "resolve",
            Request::GetDetails { .. } => "get-details",
            Request::GetFiles { .. } => "get-files",
            Request::DependsOn { .. } => "depends-on",
            Request::RequiredBy { .. } => "required-by",
            Request::WhatProvides { .. } => "what-provides",
            Request::GetPackages { .. } => "get-packages",
            Request::GetUpdateDetail { .. } => "get-update-detail",
            Request::GetRepoList { .. } => "get-repo-list",
            Request::RepoEnable { .. } => "repo-enable",
            Request::RepoSetData { .. } => "repo-set-data",
        }
    }

    /// Runs against the dist-upgrade cache root.
    pub fn requires_dist_upgrade(&self) -> bool {
        matches!(self, Request::UpgradeSystem { .. })
    }
}

/// Run `request` with the engine held.
pub fn dispatch(ctx: &mut JobContext<'_>, request: &Request) -> JobResult<()> {
    debug!(request = request.name(), "dispatching");
    match request {
        Request::Refresh { force } => {
            let result = refresh_sources(ctx, *force);
            if ctx.bridge.is_cancelled() {
                info!("package refresh was cancelled on user request");
                return Err(cancelled("Refresh was cancelled"));
            }
            result
        }
        Request::Install { package_ids, flags } => packages::install(ctx, package_ids, *flags),
        Request::Remove {
            package_ids,
            flags,
            allow_deps,
            autoremove,
        } => packages::remove(ctx, package_ids, *flags, *allow_deps, *autoremove),
        Request::Update { package_ids, flags } => packages::update(ctx, package_ids, *flags),
        Request::UpgradeSystem {
            distro_id,
            kind,
            flags,
        } => upgrade::upgrade_system(ctx, distro_id, *kind, *flags),
        Request::GetUpdates { filter } => query::report_updates(ctx, *filter),
        Request::Search {
            kind,
            terms,
            filter,
        } => query::search(ctx, *kind, terms, *filter),
        Request::Download { package_ids } => packages::download(ctx, package_ids),
        Request::DetailsLocal { paths } => packages::details_local(ctx, paths),
        Request::InstallSignature { key_id } => {
            install_signature(ctx.reporter(), ctx.bridge.signatures(), key_id)
        }
        Request::Resolve {
            names,
            filter,
            newest,
        } => info::resolve(ctx, names, *filter, *newest),
        Request::GetDetails { package_ids } => info::get_details(ctx, package_ids),
        Request::GetFiles { package_ids } => info::get_files(ctx, package_ids),
        Request::DependsOn {
            package_ids,
            filter,
        } => info::depends_on(ctx, package_ids, *filter),
        Request::RequiredBy {
            package_ids,
            filter,
        } => info::required_by(ctx, package_ids, *filter),
        Request::WhatProvides { terms, filter } => info::what_provides(ctx, terms, *filter),
        Request::GetPackages { filter } => info::get_packages(ctx, *filter),
        Request::GetUpdateDetail { package_ids } => info::get_update_detail(ctx, package_ids),
        Request::GetRepoList { hide_development } => {
            repos::get_repo_list(ctx, *hide_development)
        }
        Request::RepoEnable { alias, enabled } => repos::repo_enable(ctx, alias, *enabled),
        Request::RepoSetData {
            alias,
            parameter,
            value,
        } => repos::repo_set_data(ctx, alias, parameter, value),
    }
}

/// Pre-approve a signing key for the rest of the process lifetime.
pub fn install_signature(
    reporter: &JobReporter,
    signatures: &SignatureStore,
    key_id: &str,
) -> JobResult<()> {
    reporter.status(Status::SigCheck);
    signatures.accept(key_id);
    Ok(())
}

pub(crate) fn cancelled(message: &str) -> JobError {
    JobError::new(ErrorCode::TransactionCancelled, message)
}

/// Make sure installed items and every enabled, cached repository are in
/// the pool. Repositories already loaded are left alone.
pub fn build_pool(engine: &mut dyn Engine) -> JobResult<()> {
    if !engine.pool().iter().any(|item| item.installed) {
        engine
            .load_installed()
            .map_err(|e| JobError::new(e.code(), e.to_string()))?;
    }

    let repos = engine
        .known_repos()
        .map_err(|e| JobError::new(ErrorCode::RepoNotFound, e.to_string()))?;
    let loaded = engine.pool().repo_aliases();

    for repo in repos.iter().filter(|r| r.enabled) {
        if !engine.is_cached(repo) {
            warn!(repo = %repo.alias, "repository is not cached, do a refresh");
            continue;
        }
        if loaded.contains(&repo.alias) {
            continue;
        }
        if let Err(e) = engine.load_from_cache(repo) {
            warn!(repo = %repo.alias, "could not load repository from cache: {e}");
        }
    }
    Ok(())
}

/// Look up an item by its exact package id.
pub fn find_item<'p>(engine: &'p dyn Engine, id: &PackageId) -> JobResult<&'p PoolItem> {
    engine.pool().find(id).ok_or_else(|| {
        debug!(package = %id, "no pool item for package id");
        JobError::new(ErrorCode::PackageNotFound, "couldn't find package")
    })
}
