// src/ops/query.rs

//! Read-only queries: pending updates and package search.
//!
//! # Self-update shadowing
//!
//! A needed patch that suggests a restart updates the package management
//! stack itself. When one exists it shadows every other update: only
//! restart-suggesting patches are offered until it is installed. If a
//! security patch got shadowed that way, everything offered is raised to
//! security priority so the front-end still pushes the update.

use std::collections::BTreeSet;

use globset::{Glob, GlobSetBuilder};
use regex::{Regex, RegexBuilder};
use tracing::{debug, info, warn};

use crate::engine::pool::compare_versions;
use crate::engine::{Engine, ItemKind, PatchCategory, PatchContent, PoolItem};
use crate::errors::{JobError, JobResult};
use crate::job::JobContext;
use crate::types::{ErrorCode, Filter, InfoKind, Percentage, SearchKind, Status};

use super::{build_pool, refresh_sources};

/// Whether a pending stack update shadows the other updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfUpdate {
    No,
    Yes,
    YesAndShadowsSecurity,
}

/// A patch is needed when it is not applied and ships a newer edition of
/// an installed package.
pub fn patch_is_needed(engine: &dyn Engine, patch: &PoolItem) -> bool {
    if patch.kind != ItemKind::Patch || patch.installed {
        return false;
    }
    let Some(info) = patch.patch.as_ref() else {
        return false;
    };
    info.contents.iter().any(|content| {
        engine.pool().iter().any(|item| {
            item.installed
                && item.kind == ItemKind::Package
                && item.id.name == content.name
                && item.id.arch == content.arch
                && compare_versions(&item.id.version, &content.version).is_lt()
        })
    })
}

/// Needed patches, narrowed down to the self-update ones if any exist.
pub fn get_patches(engine: &dyn Engine) -> (SelfUpdate, Vec<PoolItem>) {
    let mut detail = SelfUpdate::No;
    let mut saw_security = false;
    let mut patches: Vec<PoolItem> = Vec::new();

    for item in engine.pool().iter().filter(|i| patch_is_needed(engine, i)) {
        let Some(info) = item.patch.as_ref() else {
            continue;
        };
        if info.category == PatchCategory::Security {
            saw_security = true;
        }

        if detail == SelfUpdate::Yes {
            if info.restart_suggested {
                patches.push(item.clone());
            }
        } else {
            patches.push(item.clone());
        }

        if info.restart_suggested && detail == SelfUpdate::No {
            info!(patch = %item.id, "stack update shadows other updates");
            detail = SelfUpdate::Yes;
            patches.clear();
            patches.push(item.clone());
        }
    }

    if detail == SelfUpdate::Yes && saw_security {
        detail = SelfUpdate::YesAndShadowsSecurity;
    }
    (detail, patches)
}

/// Installed packages with a newer candidate, as the resolver's update mode
/// sees them. The pool is left as it was.
pub fn package_updates(engine: &mut dyn Engine) -> Vec<PoolItem> {
    engine.pool_mut().save_state();
    engine.resolver_mut().update_mode = true;

    let updates = match engine.resolve() {
        Ok(_) => {
            let pool = engine.pool();
            pool.iter()
                .filter(|i| i.kind == ItemKind::Package && i.status.is_to_install())
                .filter(|i| pool.installed_named(&i.id.name, &i.id.arch).is_some())
                .cloned()
                .collect()
        }
        Err(e) => {
            warn!("update resolution failed: {e}");
            Vec::new()
        }
    };

    engine.resolver_mut().update_mode = false;
    engine.pool_mut().restore_state();
    updates
}

/// Patches plus, unless a stack update shadows them or `hide_packages` is
/// set, plain package updates not already brought in by a patch. A patch
/// only covers the exact editions it ships.
pub fn get_updates(engine: &mut dyn Engine, hide_packages: bool) -> (SelfUpdate, Vec<PoolItem>) {
    let (detail, mut candidates) = get_patches(engine);

    if detail == SelfUpdate::No && !hide_packages {
        let in_patches: BTreeSet<PatchContent> = candidates
            .iter()
            .filter_map(|c| c.patch.as_ref())
            .flat_map(|p| p.contents.iter().cloned())
            .collect();

        for package in package_updates(engine) {
            if in_patches.iter().any(|content| content.is(&package.id)) {
                debug!(package = %package.id, "covered by a patch");
                continue;
            }
            if !candidates.iter().any(|c| c.id == package.id) {
                candidates.push(package);
            }
        }
    }

    debug!(?detail, count = candidates.len(), "update candidates");
    (detail, candidates)
}

/// Priority shown for an update candidate. `None` hides it.
pub fn update_info(detail: SelfUpdate, item: &PoolItem) -> Option<InfoKind> {
    if detail == SelfUpdate::YesAndShadowsSecurity {
        return Some(InfoKind::Security);
    }
    let Some(patch) = item.patch.as_ref().filter(|_| item.kind == ItemKind::Patch) else {
        return Some(InfoKind::Enhancement);
    };
    match patch.category {
        PatchCategory::Recommended => Some(InfoKind::Bugfix),
        PatchCategory::Optional => Some(InfoKind::Low),
        PatchCategory::Security => Some(InfoKind::Security),
        PatchCategory::Distupgrade => None,
        PatchCategory::Other => Some(InfoKind::Normal),
    }
}

/// Report pending updates.
pub fn report_updates(ctx: &mut JobContext<'_>, filter: Filter) -> JobResult<()> {
    let reporter = ctx.reporter();
    reporter.status(Status::Query);
    reporter.percentage(Percentage::Value(0));

    refresh_sources(ctx, false)?;
    build_pool(ctx.engine)?;
    reporter.percentage(Percentage::Value(40));

    let (detail, candidates) = get_updates(ctx.engine, ctx.settings.hide_packages);
    reporter.percentage(Percentage::Value(80));

    for item in &candidates {
        let Some(info) = update_info(detail, item) else {
            continue;
        };
        if filter.accepts(item.installed) {
            reporter.package(info, &item.id, &item.summary);
        }
    }

    reporter.percentage(Percentage::Value(100));
    Ok(())
}

/// Compiled search terms.
#[derive(Debug)]
enum Matcher {
    Text(Vec<Regex>),
    Files(globset::GlobSet),
}

impl Matcher {
    fn new(kind: SearchKind, terms: &[String]) -> JobResult<Self> {
        match kind {
            SearchKind::Name | SearchKind::Details => terms
                .iter()
                .map(|term| {
                    let term = term.strip_prefix("pattern:").unwrap_or(term);
                    RegexBuilder::new(&regex::escape(term))
                        .case_insensitive(true)
                        .build()
                        .map_err(invalid_term)
                })
                .collect::<JobResult<Vec<_>>>()
                .map(Matcher::Text),
            SearchKind::File => {
                let mut builder = GlobSetBuilder::new();
                for term in terms {
                    builder.add(Glob::new(term).map_err(invalid_term)?);
                }
                builder.build().map(Matcher::Files).map_err(invalid_term)
            }
        }
    }

    fn matches(&self, kind: SearchKind, item: &PoolItem) -> bool {
        match (self, kind) {
            (Matcher::Text(res), SearchKind::Name) => res.iter().any(|re| {
                re.is_match(item.name()) || item.provides.iter().any(|p| re.is_match(p))
            }),
            (Matcher::Text(res), _) => res.iter().any(|re| {
                re.is_match(item.name())
                    || re.is_match(&item.summary)
                    || re.is_match(&item.description)
            }),
            (Matcher::Files(set), _) => item.files.iter().any(|f| set.is_match(f)),
        }
    }
}

fn invalid_term(e: impl std::fmt::Display) -> JobError {
    JobError::new(ErrorCode::InternalError, format!("invalid search term: {e}"))
}

/// Packages and patterns matching any of `terms`.
pub fn search(
    ctx: &mut JobContext<'_>,
    kind: SearchKind,
    terms: &[String],
    filter: Filter,
) -> JobResult<()> {
    if terms.iter().all(|t| t.is_empty()) {
        return Err(JobError::new(
            ErrorCode::InternalError,
            "Empty search string is not supported.",
        ));
    }
    let matcher = Matcher::new(kind, terms)?;

    refresh_sources(ctx, false)?;
    let reporter = ctx.reporter();
    reporter.status(Status::Query);
    reporter.percentage(Percentage::Invalid);

    build_pool(ctx.engine)?;

    let mut found = 0usize;
    for item in ctx
        .engine
        .pool()
        .iter()
        .filter(|i| matches!(i.kind, ItemKind::Package | ItemKind::Pattern))
        .filter(|i| filter.accepts(i.installed))
        .filter(|i| matcher.matches(kind, i))
    {
        let info = if item.installed {
            InfoKind::Installed
        } else {
            InfoKind::Available
        };
        reporter.package(info, &item.id, &item.summary);
        found += 1;
    }

    info!(?kind, found, "search finished");
    Ok(())
}
