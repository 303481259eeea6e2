// src/ops/packages.rs

//! Install, remove, update and download of explicit package ids, plus
//! metadata of local package files.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::engine::pool::compare_versions;
use crate::engine::{ItemKind, PackageId, Pool, Transact};
use crate::errors::{JobError, JobResult};
use crate::frontend::FrontendEvent;
use crate::job::JobContext;
use crate::transaction::{perform, Transaction};
use crate::types::{ErrorCode, PerformType, Percentage, RestartKind, Status, TransactionFlags};

use super::{build_pool, find_item, refresh_sources};

/// How a requested edition relates to what is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRelation {
    /// Nothing installed, or only older editions.
    Newer,
    Equal,
    /// A newer edition is installed already.
    Older { installed: String },
}

/// Compare `id` with the installed editions of the same name and arch.
/// Returns the relation and how many editions are installed.
pub fn version_relation(pool: &Pool, id: &PackageId) -> (VersionRelation, usize) {
    let installed: Vec<&str> = pool
        .iter()
        .filter(|i| i.installed && i.id.name == id.name && i.id.arch == id.arch)
        .map(|i| i.id.version.as_str())
        .collect();

    let mut relation = VersionRelation::Newer;
    for version in &installed {
        match compare_versions(version, &id.version) {
            std::cmp::Ordering::Less => {}
            std::cmp::Ordering::Equal => {
                relation = VersionRelation::Equal;
                break;
            }
            std::cmp::Ordering::Greater => {
                let newest = match &relation {
                    VersionRelation::Older { installed } if compare_versions(installed, version).is_ge() => {
                        installed.clone()
                    }
                    _ => version.to_string(),
                };
                relation = VersionRelation::Older { installed: newest };
            }
        }
    }
    (relation, installed.len())
}

/// Install `ids`, honouring the reinstall and downgrade flags.
pub fn install(
    ctx: &mut JobContext<'_>,
    ids: &[PackageId],
    flags: TransactionFlags,
) -> JobResult<()> {
    refresh_sources(ctx, false)?;
    let reporter = ctx.reporter();

    reporter.status(Status::Query);
    reporter.percentage(Percentage::Value(0));

    build_pool(ctx.engine)?;
    ctx.engine.pool_mut().save_state();
    reporter.percentage(Percentage::Value(10));

    let result = mark_installs(ctx, ids, flags).and_then(|marked| {
        reporter.percentage(Percentage::Value(40));
        if marked.is_empty() {
            return Err(JobError::new(
                ErrorCode::AllPackagesAlreadyInstalled,
                "The packages are already all installed",
            ));
        }

        if let Err(err) = perform(ctx, Transaction::new(PerformType::Install, flags)) {
            reset_marks(ctx.engine.pool_mut(), &marked);
            return Err(err);
        }
        Ok(())
    });

    ctx.engine.pool_mut().restore_state();
    result?;

    reporter.percentage(Percentage::Value(100));
    Ok(())
}

fn mark_installs(
    ctx: &mut JobContext<'_>,
    ids: &[PackageId],
    flags: TransactionFlags,
) -> JobResult<Vec<PackageId>> {
    let mut marked = Vec::new();

    for id in ids {
        debug!(package = %id, "marking for installation");
        find_item(ctx.engine, id)?;

        let (relation, installed) = version_relation(ctx.engine.pool(), id);
        match &relation {
            VersionRelation::Equal if !flags.contains(TransactionFlags::ALLOW_REINSTALL) => {
                info!(package = %id, "already installed, skipping");
                continue;
            }
            VersionRelation::Older { installed } if !flags.contains(TransactionFlags::ALLOW_DOWNGRADE) => {
                return Err(JobError::new(
                    ErrorCode::PackageAlreadyInstalled,
                    format!(
                        "higher version \"{installed}\" of package {}.{} is already installed",
                        id.name, id.arch
                    ),
                ));
            }
            _ => {}
        }

        if relation != VersionRelation::Equal
            && installed > 0
            && flags.contains(TransactionFlags::JUST_REINSTALL)
        {
            return Err(JobError::new(
                ErrorCode::NotAuthorized,
                "missing authorization to update or downgrade software",
            ));
        }

        if let Some(item) = ctx.engine.pool_mut().find_mut(id) {
            item.status = Transact::ToInstall;
            marked.push(id.clone());
        }
    }
    Ok(marked)
}

/// Remove installed `ids`. `allow_deps` forces the resolver, `autoremove`
/// also drops dependencies nothing else needs.
pub fn remove(
    ctx: &mut JobContext<'_>,
    ids: &[PackageId],
    flags: TransactionFlags,
    allow_deps: bool,
    autoremove: bool,
) -> JobResult<()> {
    let reporter = ctx.reporter();
    reporter.status(Status::Remove);
    reporter.percentage(Percentage::Value(0));

    ctx.engine.resolver_mut().cleandeps_on_remove = autoremove;
    ctx.engine
        .load_installed()
        .map_err(|e| JobError::new(e.code(), e.to_string()))?;
    reporter.percentage(Percentage::Value(10));

    ctx.engine.pool_mut().save_state();
    let result = mark_and_remove(ctx, ids, flags, allow_deps);
    ctx.engine.pool_mut().restore_state();
    ctx.engine.resolver_mut().cleandeps_on_remove = false;
    result?;

    reporter.percentage(Percentage::Value(100));
    Ok(())
}

fn mark_and_remove(
    ctx: &mut JobContext<'_>,
    ids: &[PackageId],
    flags: TransactionFlags,
    allow_deps: bool,
) -> JobResult<()> {
    let reporter = ctx.reporter();
    let mut marked = Vec::new();

    for id in ids {
        find_item(ctx.engine, id)?;
        if let Some(item) = ctx.engine.pool_mut().find_mut(id) {
            if item.installed {
                item.status = Transact::ToRemove;
                marked.push(id.clone());
            } else {
                debug!(package = %id, "not installed, nothing to remove");
                item.reset_status();
            }
        }
    }
    reporter.percentage(Percentage::Value(40));

    let tx = Transaction::new(PerformType::Remove, flags).forced(allow_deps);
    if let Err(err) = perform(ctx, tx) {
        reset_marks(ctx.engine.pool_mut(), &marked);
        reporter.error(err);
        return Err(JobError::new(
            ErrorCode::TransactionError,
            "Couldn't remove the package",
        ));
    }
    Ok(())
}

/// Update installed `ids` to their best candidate. Patch ids are applied
/// as they are.
pub fn update(
    ctx: &mut JobContext<'_>,
    ids: &[PackageId],
    flags: TransactionFlags,
) -> JobResult<()> {
    build_pool(ctx.engine)?;
    ctx.engine.pool_mut().save_state();

    let result = mark_updates(ctx, ids)
        .and_then(|()| perform(ctx, Transaction::new(PerformType::Update, flags)));

    ctx.engine.pool_mut().restore_state();
    result
}

fn mark_updates(ctx: &mut JobContext<'_>, ids: &[PackageId]) -> JobResult<()> {
    let reporter = ctx.reporter();

    for id in ids {
        let item = find_item(ctx.engine, id)?;
        let pool = ctx.engine.pool();

        let target = if item.kind == ItemKind::Patch {
            item.id.clone()
        } else {
            let Some(installed) = pool.installed_named(&id.name, &id.arch) else {
                return Err(JobError::new(
                    ErrorCode::DepResolutionFailed,
                    format!("Package {id} is not installed"),
                ));
            };
            match pool.best_available(&installed.id.name, &installed.id.arch) {
                Some(best) if compare_versions(&best.id.version, &installed.id.version).is_gt() => {
                    best.id.clone()
                }
                _ => {
                    return Err(JobError::new(
                        ErrorCode::DepResolutionFailed,
                        format!("There is no update candidate for {}", installed.id.ident()),
                    ));
                }
            }
        };

        let Some(item) = ctx.engine.pool_mut().find_mut(&target) else {
            continue;
        };
        item.status = Transact::ToInstall;
        debug!(package = %target, "marked for update");

        let restart = item
            .patch
            .as_ref()
            .map_or(RestartKind::None, |patch| patch.restart());
        if restart != RestartKind::None {
            reporter.require_restart(restart, id);
        }
    }
    Ok(())
}

/// Fetch `ids` into the package cache without installing them.
pub fn download(ctx: &mut JobContext<'_>, ids: &[PackageId]) -> JobResult<()> {
    refresh_sources(ctx, false)?;
    build_pool(ctx.engine)?;
    ctx.reporter().status(Status::Download);

    ctx.engine.pool_mut().save_state();
    let mut result = Ok(());
    for id in ids {
        if let Err(err) = find_item(ctx.engine, id) {
            result = Err(err);
            break;
        }
        if let Some(item) = ctx.engine.pool_mut().find_mut(id) {
            item.status = Transact::ToInstall;
        }
    }

    if result.is_ok() {
        let tx = Transaction::new(PerformType::Install, TransactionFlags::ONLY_DOWNLOAD);
        result = perform(ctx, tx);
    }
    ctx.engine.pool_mut().restore_state();
    result
}

/// Report the metadata of local package files.
pub fn details_local(ctx: &mut JobContext<'_>, paths: &[PathBuf]) -> JobResult<()> {
    let reporter = ctx.reporter();
    reporter.status(Status::Query);

    for path in paths {
        let header = ctx.engine.read_package_header(path).map_err(|e| {
            debug!(path = %path.display(), "unreadable package header: {e}");
            JobError::new(
                ErrorCode::InternalError,
                format!("{} is not a valid package file", path.display()),
            )
        })?;

        let id = PackageId::new(&header.name, &header.version, &header.arch, "local");
        reporter.emit(FrontendEvent::Details {
            package_id: id.to_string(),
            summary: header.summary,
            license: header.license,
            group: header.group,
            url: header.url,
            size: header.size,
        });
    }
    Ok(())
}

fn reset_marks(pool: &mut Pool, marked: &[PackageId]) {
    for id in marked {
        if let Some(item) = pool.find_mut(id) {
            item.reset_status();
        }
    }
}
