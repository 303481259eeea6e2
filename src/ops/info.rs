// src/ops/info.rs

//! Per-package queries: resolve names, details, files, dependencies and
//! providers. None of these change the pool for good; queries that need a
//! resolver run save the pool state and put it back.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::engine::pool::compare_versions;
use crate::engine::{Engine, ItemKind, PackageId, PoolItem, Resolution, Transact};
use crate::errors::{JobError, JobResult};
use crate::frontend::{FrontendEvent, JobReporter};
use crate::job::JobContext;
use crate::types::{ErrorCode, Filter, InfoKind, Percentage, RestartKind, Status};

use super::{build_pool, find_item};

/// Repository tag of package ids that name a local file.
pub const LOCAL_REPO: &str = "local";

/// Pseudo capability asking for drivers of the attached hardware.
pub const HARDWARE_DRIVERS: &str = "drivers_for_attached_hardware";

/// Capability namespaces a plain `what-provides` term is also looked up in.
const PROVIDE_NAMESPACES: [&str; 7] = [
    "gstreamer0.10",
    "gstreamer1",
    "font",
    "mimehandler",
    "postscriptdriver",
    "plasma4",
    "plasma5",
];

/// Installed items first, then available ones whose edition is not
/// installed already.
fn emit_filtered(reporter: &JobReporter, filter: Filter, items: &[&PoolItem]) -> usize {
    let mut emitted: Vec<&PackageId> = Vec::new();

    for item in items.iter().filter(|i| i.installed && filter.accepts(true)) {
        reporter.package(InfoKind::Installed, &item.id, &item.summary);
        emitted.push(&item.id);
    }
    for item in items.iter().filter(|i| !i.installed && filter.accepts(false)) {
        if emitted.iter().any(|id| id.same_edition(&item.id)) {
            continue;
        }
        reporter.package(InfoKind::Available, &item.id, &item.summary);
        emitted.push(&item.id);
    }
    emitted.len()
}

/// Items called exactly `names`, packages, patches and patterns alike.
///
/// With `newest`, only the installed edition and the newest edition of
/// each name are reported.
pub fn resolve(
    ctx: &mut JobContext<'_>,
    names: &[String],
    filter: Filter,
    newest: bool,
) -> JobResult<()> {
    let reporter = ctx.reporter();
    reporter.status(Status::Query);
    build_pool(ctx.engine)?;

    let pool = ctx.engine.pool();
    for name in names {
        let found: Vec<&PoolItem> = pool
            .iter()
            .filter(|i| &i.id.name == name)
            .filter(|i| filter.accepts(i.installed))
            .collect();
        debug!(%name, found = found.len(), "resolving");

        let picked = if newest {
            let installed = found.iter().rev().find(|i| i.installed).copied();
            let best = found.iter().copied().reduce(|best, item| {
                let newer = compare_versions(&item.id.version, &best.id.version)
                    .then_with(|| item.id.arch.cmp(&best.id.arch));
                if newer.is_gt() {
                    item
                } else {
                    best
                }
            });
            let mut picked: Vec<&PoolItem> = installed.into_iter().collect();
            if let Some(best) = best {
                if !picked.iter().any(|p| p.id == best.id) {
                    picked.push(best);
                }
            }
            picked
        } else {
            found
        };

        emit_filtered(reporter, filter, &picked);
    }
    Ok(())
}

/// Size shown in a details report: the install size of installed items,
/// the download size of the shipped packages for patches, and the download
/// size otherwise.
fn details_size(engine: &dyn Engine, item: &PoolItem) -> u64 {
    match (&item.patch, item.kind) {
        (Some(patch), ItemKind::Patch) => patch
            .contents
            .iter()
            .filter_map(|content| {
                engine
                    .pool()
                    .iter()
                    .find(|i| !i.installed && content.is(&i.id))
            })
            .map(|i| i.download_size)
            .sum(),
        _ if item.installed => item.install_size,
        _ => item.download_size,
    }
}

pub fn get_details(ctx: &mut JobContext<'_>, package_ids: &[PackageId]) -> JobResult<()> {
    let reporter = ctx.reporter();
    build_pool(ctx.engine)?;
    reporter.status(Status::Query);

    for id in package_ids {
        if id.data == LOCAL_REPO {
            reporter.details(id, "", "", "", "", 0);
            return Ok(());
        }
        let item = find_item(ctx.engine, id)?;
        let size = details_size(ctx.engine, item);
        // Patches and patterns only carry a description.
        let summary = if item.kind == ItemKind::Package {
            item.summary.as_str()
        } else {
            ""
        };
        reporter.details(id, summary, &item.license, &item.group, &item.url, size);
    }
    Ok(())
}

/// Files of installed items. Items that are only available have no file
/// list to show.
pub fn get_files(ctx: &mut JobContext<'_>, package_ids: &[PackageId]) -> JobResult<()> {
    let reporter = ctx.reporter();
    build_pool(ctx.engine)?;

    for id in package_ids {
        reporter.status(Status::Query);
        let item = find_item(ctx.engine, id)?;
        let files = if item.installed {
            item.files.clone()
        } else {
            vec!["Only available for installed packages".to_string()]
        };
        reporter.files(id, files);
    }
    Ok(())
}

/// Pick one provider per requirement of `item`.
///
/// A provider whose name was already picked for another requirement wins,
/// then an installed provider, then the first one found.
fn pick_providers<'p>(engine: &'p dyn Engine, item: &PoolItem) -> BTreeMap<String, &'p PoolItem> {
    let mut picked: BTreeMap<String, &PoolItem> = BTreeMap::new();
    let mut names: Vec<&str> = Vec::new();

    for capability in &item.requires {
        if picked.contains_key(capability) {
            continue;
        }
        let mut preferred: Option<&PoolItem> = None;
        for provider in engine.pool().iter().filter(|i| i.provides_name(capability)) {
            if names.contains(&provider.name()) {
                preferred = Some(provider);
                break;
            }
            match preferred {
                None => preferred = Some(provider),
                Some(_) if provider.installed => {
                    preferred = Some(provider);
                    break;
                }
                Some(_) => {}
            }
        }

        match preferred {
            Some(provider) if !names.contains(&provider.name()) => {
                names.push(provider.name());
                picked.insert(capability.clone(), provider);
            }
            Some(_) => {}
            None => debug!(%capability, "nothing provides requirement"),
        }
    }
    picked
}

pub fn depends_on(
    ctx: &mut JobContext<'_>,
    package_ids: &[PackageId],
    filter: Filter,
) -> JobResult<()> {
    let reporter = ctx.reporter();
    reporter.status(Status::Query);
    reporter.percentage(Percentage::Value(0));
    build_pool(ctx.engine)?;

    for id in package_ids {
        let item = ctx.engine.pool().find(id).ok_or_else(|| {
            JobError::new(
                ErrorCode::DepResolutionFailed,
                "Did not find the specified package.",
            )
        })?;
        reporter.percentage(Percentage::Value(20));

        reporter.status(Status::DepResolve);
        reporter.percentage(Percentage::Value(60));

        let providers = pick_providers(ctx.engine, item);
        for provider in providers.values().filter(|p| filter.accepts(p.installed)) {
            let info = if provider.installed {
                InfoKind::Installed
            } else {
                InfoKind::Available
            };
            reporter.package(info, &provider.id, &provider.summary);
        }
        debug!(package = %id, dependencies = providers.len(), "dependencies listed");
    }

    reporter.percentage(Percentage::Value(100));
    Ok(())
}

/// How an item takes part in a resolved plan, if at all.
fn plan_info(status: Transact) -> Option<InfoKind> {
    match status {
        Transact::Untouched => None,
        Transact::ToInstall => Some(InfoKind::Installing),
        Transact::ToRemove => Some(InfoKind::Removing),
        Transact::ToRemoveDueToUpgrade => Some(InfoKind::Updating),
        Transact::ToRemoveDueToObsolete => Some(InfoKind::Obsoleting),
    }
}

/// Installed packages that would have to go along with each of
/// `package_ids`. Only installed items can be required by anything.
pub fn required_by(
    ctx: &mut JobContext<'_>,
    package_ids: &[PackageId],
    filter: Filter,
) -> JobResult<()> {
    let reporter = ctx.reporter();
    reporter.status(Status::Query);
    reporter.percentage(Percentage::Value(10));
    build_pool(ctx.engine)?;

    for id in package_ids {
        let Some(item) = ctx.engine.pool().find(id) else {
            return Err(JobError::new(
                ErrorCode::PackageNotFound,
                "Package couldn't be found",
            ));
        };
        if !item.installed {
            debug!(package = %id, "not installed, nothing can require it");
            continue;
        }

        ctx.engine.pool_mut().save_state();
        if let Some(item) = ctx.engine.pool_mut().find_mut(id) {
            item.status = Transact::ToRemove;
        }
        ctx.engine.resolver_mut().force_resolve = true;
        ctx.engine.resolver_mut().ignore_already_recommended = true;

        let result = ctx.engine.resolve();
        let outcome = match result {
            Ok(Resolution::Solved) => {
                for other in ctx
                    .engine
                    .pool()
                    .iter()
                    .filter(|i| i.kind == ItemKind::Package && &i.id != id)
                    .filter(|i| filter.accepts(i.installed))
                {
                    if let Some(info) = plan_info(other.status) {
                        reporter.package(info, &other.id, &other.summary);
                    }
                }
                Ok(())
            }
            Ok(Resolution::Unsatisfiable(problems)) => {
                let described: String = problems.iter().map(|p| p.description.as_str()).collect();
                Err(JobError::new(
                    ErrorCode::DepResolutionFailed,
                    format!("Resolution failed: {described}"),
                ))
            }
            Err(e) => Err(JobError::new(e.code(), e.to_string())),
        };

        let resolver = ctx.engine.resolver_mut();
        resolver.force_resolve = false;
        resolver.ignore_already_recommended = false;
        ctx.engine.pool_mut().restore_state();
        outcome?;
    }

    reporter.percentage(Percentage::Value(100));
    Ok(())
}

/// Every capability a `what-provides` term stands for.
pub fn provide_terms(term: &str) -> Vec<String> {
    std::iter::once(term.to_string())
        .chain(PROVIDE_NAMESPACES.iter().map(|ns| format!("{ns}({term})")))
        .collect()
}

pub fn what_provides(ctx: &mut JobContext<'_>, terms: &[String], filter: Filter) -> JobResult<()> {
    let reporter = ctx.reporter();
    reporter.status(Status::Query);
    build_pool(ctx.engine)?;

    if terms.first().is_some_and(|t| t.eq_ignore_ascii_case(HARDWARE_DRIVERS)) {
        return hardware_drivers(ctx, filter);
    }

    let mut found = 0usize;
    for capability in terms.iter().flat_map(|t| provide_terms(t)) {
        debug!(%capability, "querying provide");
        let providers: Vec<&PoolItem> = ctx
            .engine
            .pool()
            .iter()
            .filter(|i| i.provides_name(&capability))
            .collect();
        let installed_summaries: Vec<&str> = providers
            .iter()
            .filter(|p| p.installed)
            .map(|p| p.summary.as_str())
            .collect();

        for provider in providers.iter().filter(|p| filter.accepts(p.installed)) {
            // Available twins of installed providers are not worth offering.
            if filter == Filter::NotInstalled && installed_summaries.contains(&provider.summary.as_str()) {
                continue;
            }
            let info = if provider.installed {
                InfoKind::Installed
            } else {
                InfoKind::Available
            };
            reporter.package(info, &provider.id, &provider.summary);
            found += 1;
        }
    }

    info!(found, "what-provides finished");
    Ok(())
}

/// Packages a resolver run would pull in on its own, which is how
/// hardware supplements surface.
fn hardware_drivers(ctx: &mut JobContext<'_>, filter: Filter) -> JobResult<()> {
    let reporter = ctx.reporter();
    ctx.engine.pool_mut().save_state();
    ctx.engine.resolver_mut().ignore_already_recommended = true;

    let result = ctx.engine.resolve();
    let outcome = match result {
        Ok(Resolution::Solved) => {
            for item in ctx
                .engine
                .pool()
                .iter()
                .filter(|i| i.kind == ItemKind::Package && i.status.is_to_install())
                .filter(|i| filter.accepts(i.installed))
            {
                reporter.package(InfoKind::Available, &item.id, &item.summary);
            }
            Ok(())
        }
        Ok(Resolution::Unsatisfiable(problems)) => {
            for problem in &problems {
                warn!("solver problem: {}", problem.description);
            }
            Err(JobError::new(ErrorCode::DepResolutionFailed, "Resolution failed"))
        }
        Err(e) => Err(JobError::new(e.code(), e.to_string())),
    };

    ctx.engine.resolver_mut().ignore_already_recommended = false;
    ctx.engine.pool_mut().restore_state();
    outcome
}

/// All packages and patterns.
pub fn get_packages(ctx: &mut JobContext<'_>, filter: Filter) -> JobResult<()> {
    let reporter = ctx.reporter();
    reporter.status(Status::Query);
    build_pool(ctx.engine)?;

    let items: Vec<&PoolItem> = ctx
        .engine
        .pool()
        .iter()
        .filter(|i| matches!(i.kind, ItemKind::Package | ItemKind::Pattern))
        .collect();
    let emitted = emit_filtered(reporter, filter, &items);
    debug!(emitted, "packages listed");
    Ok(())
}

/// Ids of every item providing one of `capabilities`.
fn providers_of(engine: &dyn Engine, capabilities: &[String]) -> Vec<String> {
    engine
        .pool()
        .iter()
        .filter(|i| capabilities.iter().any(|c| i.provides_name(c)))
        .map(|i| i.id.to_string())
        .collect()
}

/// What an update replaces and which advisories it answers.
pub fn get_update_detail(ctx: &mut JobContext<'_>, package_ids: &[PackageId]) -> JobResult<()> {
    let reporter = ctx.reporter();
    reporter.status(Status::Query);
    build_pool(ctx.engine)?;

    for id in package_ids {
        let item = find_item(ctx.engine, id)?;
        let mut obsoletes = providers_of(ctx.engine, &item.obsoletes);
        let mut restart = RestartKind::None;
        let mut bugzilla = Vec::new();
        let mut cve = Vec::new();

        if let Some(patch) = item.patch.as_ref().filter(|_| item.kind == ItemKind::Patch) {
            restart = patch.restart();
            bugzilla = patch.bugzilla.clone();
            cve = patch.cve.clone();
            for content in &patch.contents {
                let shipped = ctx
                    .engine
                    .pool()
                    .iter()
                    .find(|i| content.is(&i.id));
                if let Some(shipped) = shipped {
                    obsoletes.extend(providers_of(ctx.engine, &shipped.obsoletes));
                }
            }
        }

        reporter.emit(FrontendEvent::UpdateDetail {
            package_id: id.to_string(),
            obsoletes,
            bugzilla,
            cve,
            restart,
            update_text: item.description.clone(),
        });
    }
    Ok(())
}
