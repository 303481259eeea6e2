// src/transaction/mod.rs

//! Transaction Executor.
//!
//! Drives whatever the operation marked in the pool through resolution,
//! license and space preflights and, unless simulating, the engine commit.
//! Every failure ends up as one [`JobError`]; the force-resolve override is
//! cleared on every way out.

use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::engine::{
    CommitPolicy, DownloadMode, Engine, EngineError, PoolItem, Resolution, Transact,
};
use crate::errors::{JobError, JobResult};
use crate::frontend::{FrontendEvent, JobReporter};
use crate::job::JobContext;
use crate::types::{ErrorCode, InfoKind, PerformType, Percentage, Status, TransactionFlags};

pub mod space;

pub use space::{PlanTotals, SpaceCheck};

/// One run of the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    pub kind: PerformType,
    /// Let the resolver remove whatever stands in the way.
    pub force: bool,
    pub flags: TransactionFlags,
}

impl Transaction {
    pub fn new(kind: PerformType, flags: TransactionFlags) -> Self {
        Self {
            kind,
            force: false,
            flags,
        }
    }

    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Resolve, check and commit the marks currently in the pool.
pub fn perform(ctx: &mut JobContext<'_>, tx: Transaction) -> JobResult<()> {
    info!(kind = ?tx.kind, force = tx.force, flags = %tx.flags, "performing transaction");

    let result = run(ctx, tx);

    // Per-run resolver switches.
    let resolver = ctx.engine.resolver_mut();
    resolver.force_resolve = false;
    resolver.ignore_already_recommended = false;

    if let Err(err) = &result {
        debug!(code = %err.code, "transaction ended with error");
    }
    result
}

fn run(ctx: &mut JobContext<'_>, tx: Transaction) -> JobResult<()> {
    let reporter = ctx.reporter();

    if tx.force {
        ctx.engine.resolver_mut().force_resolve = true;
    }

    reporter.status(Status::DepResolve);
    ctx.engine.resolver_mut().ignore_already_recommended = true;

    match ctx.engine.resolve().map_err(engine_failure)? {
        Resolution::Solved => debug!("resolver found a plan"),
        Resolution::Unsatisfiable(problems) => {
            let message = problems
                .iter()
                .map(|p| p.description.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            ctx.engine.pool_mut().reset_pending_installs();
            warn!(problems = problems.len(), "dependency resolution failed");
            return Err(JobError::new(ErrorCode::DepResolutionFailed, message));
        }
    }

    reporter.status(match tx.kind {
        PerformType::Install => Status::Install,
        PerformType::Remove => Status::Remove,
        PerformType::Update | PerformType::UpgradeSystem => Status::Update,
    });

    if tx.flags.is_simulate() && !tx.flags.contains(TransactionFlags::EXT_DOWNLOAD_SIZE) {
        return simulate(ctx.engine, reporter, &ctx.settings.protected, tx.kind);
    }

    check_licenses(ctx)?;

    let only_download = tx.flags.is_only_download();
    let policy = CommitPolicy {
        restrict_to_media: 0,
        download_mode: if only_download {
            DownloadMode::Only
        } else {
            DownloadMode::InHeaps
        },
        verify_signatures: tx.flags.contains(TransactionFlags::ONLY_TRUSTED),
        sync_pool_after_commit: true,
    };

    let totals = PlanTotals::count(ctx.engine.pool(), only_download);
    {
        let counters = ctx.bridge.counters_mut();
        counters.reset();
        counters.total_downloads = totals.downloads;
        counters.total_installs = totals.installs;
        counters.total_removals = totals.removals;
    }

    if tx.flags.is_size_query() {
        info!("size query: reporting sizes and resetting the pool");
        ctx.engine.pool_mut().reset_all();
        reporter.size_details("::DOWNLOAD", totals.download_bytes);
        reporter.size_details("::INSTALL", totals.install_bytes);
        reporter.size_details("::REMOVE", totals.remove_bytes);
        reporter.size_details("::CACHED", totals.cached_bytes);
        return Ok(());
    }

    let download_target = ctx.cache.active_path();
    let space = SpaceCheck::new(
        &totals,
        tx.kind,
        free_space(ctx.engine, &download_target),
        free_space(ctx.engine, &ctx.settings.engine_root),
    );
    if !space.download_fits() {
        reporter.warning(ErrorCode::NoSpaceOnDevice, space.download_message());
    }
    if !space.install_fits() {
        return Err(JobError::new(
            ErrorCode::NoSpaceOnDevice,
            space.install_message(),
        ));
    }

    let result = ctx
        .engine
        .commit(&policy, &mut ctx.bridge)
        .map_err(engine_failure)?;

    let worked = if only_download {
        result.no_error()
    } else {
        result.all_done()
    };

    if !worked {
        let todo = result
            .not_done()
            .map(|step| step.id.ident())
            .collect::<Vec<_>>()
            .join("\n");
        error!(steps = %todo.replace('\n', ", "), "transaction incomplete");
        return Err(JobError::new(
            ErrorCode::TransactionError,
            format!("Transaction could not be completed.\n These packages could not be installed: {todo}"),
        ));
    }

    reporter.percentage(Percentage::Value(100));
    Ok(())
}

/// Walk the plan without committing: report what each item would go
/// through and leave the pool untouched.
fn simulate(
    engine: &mut dyn Engine,
    reporter: &JobReporter,
    protected: &[String],
    kind: PerformType,
) -> JobResult<()> {
    info!("simulating");
    let mut refused: Option<JobError> = None;

    for item in engine.pool_mut().iter_mut() {
        let skip = match kind {
            PerformType::Remove => !item.installed,
            PerformType::Install | PerformType::Update => {
                item.status == Transact::ToRemoveDueToUpgrade
            }
            PerformType::UpgradeSystem => false,
        };

        if !skip {
            if let Err(err) = notify(reporter, item, protected) {
                refused.get_or_insert(err);
            }
        }
        item.reset_status();
    }

    match refused {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Tell the front-end what state `item` is headed for.
pub fn notify(reporter: &JobReporter, item: &PoolItem, protected: &[String]) -> JobResult<()> {
    let info = match item.status {
        Transact::Untouched => return Ok(()),
        Transact::ToRemoveDueToUpgrade => InfoKind::Updating,
        Transact::ToRemoveDueToObsolete => InfoKind::Obsoleting,
        Transact::ToInstall => InfoKind::Installing,
        Transact::ToRemove => {
            if protected.iter().any(|p| p == item.name()) {
                let message = format!(
                    "The package {} is essential to correct operation and cannot be removed using this tool.",
                    item.name()
                );
                reporter.fail(ErrorCode::CannotRemoveSystemPackage, message.clone());
                return Err(JobError::new(ErrorCode::CannotRemoveSystemPackage, message));
            }
            InfoKind::Removing
        }
    };

    reporter.package(info, &item.id, &item.summary);
    Ok(())
}

/// Stop at the first pending install whose license was never accepted.
fn check_licenses(ctx: &mut JobContext<'_>) -> JobResult<()> {
    let reporter = ctx.reporter();

    for item in ctx.engine.pool().iter().filter(|i| i.status.is_to_install()) {
        let Some(license) = item.license_to_confirm.as_deref() else {
            continue;
        };
        if license.is_empty() {
            continue;
        }
        let eula_id = item.name();
        if ctx.eulas.is_accepted(eula_id) {
            debug!(eula = %eula_id, "license already accepted");
            continue;
        }

        info!(eula = %eula_id, package = %item.id, "license agreement required");
        reporter.emit(FrontendEvent::EulaRequired {
            eula_id: eula_id.to_string(),
            package_id: item.id.to_string(),
            vendor: item.vendor.clone(),
            license: license.to_string(),
        });
        return Err(JobError::new(
            ErrorCode::NoLicenseAgreement,
            "You've to agree/decline a license",
        ));
    }
    Ok(())
}

/// Free bytes at `path`; unreadable counts as full.
fn free_space(engine: &dyn Engine, path: &Path) -> u64 {
    match engine.free_space(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(path = %path.display(), "cannot get free disk space: {e}");
            0
        }
    }
}

/// Map a collaborator failure raised inside a transaction.
pub fn engine_failure(err: EngineError) -> JobError {
    let code = match &err {
        EngineError::RepoNotFound(_) => ErrorCode::RepoNotFound,
        EngineError::Rpm(_) => ErrorCode::PackageDownloadFailed,
        EngineError::Cancelled => ErrorCode::TransactionCancelled,
        _ => ErrorCode::InternalError,
    };
    JobError::new(code, err.to_string())
}
