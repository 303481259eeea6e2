// src/ops/refresh.rs

//! Repository refresh.
//!
//! Loads the installed items, drops repositories that disappeared from the
//! configuration and then refreshes metadata and cache of every enabled
//! repository in turn. A repository that fails is noted and skipped; a trust
//! prompt, a reported error or cancellation stop the whole refresh.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::engine::{Engine, EngineError, EngineEvents, EngineResult, RepoInfo};
use crate::errors::{JobError, JobResult};
use crate::job::JobContext;
use crate::types::{ErrorCode, Percentage, Status};

use super::cancelled;

/// Refresh every enabled repository. `force` also refreshes repositories
/// without autorefresh and rebuilds caches that look current.
pub fn refresh_sources(ctx: &mut JobContext<'_>, force: bool) -> JobResult<()> {
    let reporter = ctx.reporter();
    info!(force, "refreshing repositories");

    ctx.engine
        .load_installed()
        .map_err(|e| JobError::new(e.code(), e.to_string()))?;

    reporter.status(Status::RefreshCache);
    reporter.percentage(Percentage::Value(0));

    let repos = ctx
        .engine
        .known_repos()
        .map_err(|e| JobError::new(ErrorCode::RepoNotFound, e.to_string()))?;

    drop_unconfigured(ctx.engine, &repos);

    let total = repos.len();
    let mut messages = String::new();

    for (index, repo) in repos.iter().enumerate() {
        let done = index + 1;

        if ctx.bridge.is_cancelled() {
            info!("aborting refresh, job is cancelled");
            return Err(cancelled("Refresh was cancelled"));
        }
        if repo.alias.is_empty() {
            return Err(JobError::new(
                ErrorCode::RepoConfiguration,
                format!(
                    "{}: Repository has no or invalid repo name defined.",
                    repo.display_name()
                ),
            ));
        }
        if reporter.has_error() {
            break;
        }

        if !repo.enabled {
            debug!(repo = %repo.alias, "skipping disabled repository");
            ctx.engine.pool_mut().erase_repo(&repo.alias);
            continue;
        }
        if !force && !repo.autorefresh {
            debug!(repo = %repo.alias, "skipping repository without autorefresh");
            continue;
        }
        if repo.is_volatile() {
            debug!(repo = %repo.alias, url = %repo.baseurl, "skipping removable media");
            ctx.engine.pool_mut().erase_repo(&repo.alias);
            continue;
        }

        ctx.bridge.set_repo(Some(repo.clone()));
        let result = refresh_meta_and_cache(ctx.engine, repo, force, &mut ctx.bridge);
        ctx.bridge.set_repo(None);

        match result {
            Ok(()) => {}
            Err(EngineError::RefreshAborted) => {
                info!(repo = %repo.alias, "refresh aborted by trust check");
                return Err(reporter.first_error().unwrap_or_else(|| {
                    JobError::new(
                        ErrorCode::GpgFailure,
                        format!("Signature verification for Repository {} failed", repo.alias),
                    )
                }));
            }
            Err(EngineError::Cancelled) => {
                return Err(cancelled("Refresh was cancelled"));
            }
            Err(e) => {
                warn!(repo = %repo.alias, "refresh failed: {e}");
                messages.push_str(&format!("{}: {e}\n", repo.alias));
                continue;
            }
        }

        let percent = if done >= total { 100 } else { 100 * done / total };
        reporter.percentage(Percentage::Value(percent as u8));
    }

    if !messages.is_empty() {
        warn!("some repositories could not be refreshed:\n{}", messages.trim_end());
    }

    if let Some(err) = reporter.first_error() {
        return Err(err);
    }

    reporter.percentage(Percentage::Value(100));
    Ok(())
}

/// Erase pool items of repositories that are no longer configured.
fn drop_unconfigured(engine: &mut dyn Engine, repos: &[RepoInfo]) {
    let configured: BTreeSet<&str> = repos.iter().map(|r| r.alias.as_str()).collect();
    let stale: Vec<String> = engine
        .pool()
        .repo_aliases()
        .into_iter()
        .filter(|alias| !configured.contains(alias.as_str()))
        .collect();

    for alias in stale {
        let erased = engine.pool_mut().erase_repo(&alias);
        info!(repo = %alias, erased, "dropped unconfigured repository");
    }
}

/// Refresh metadata, build the cache and load it, rebuilding a cache that
/// does not load once.
pub fn refresh_meta_and_cache(
    engine: &mut dyn Engine,
    repo: &RepoInfo,
    force: bool,
    events: &mut dyn EngineEvents,
) -> EngineResult<()> {
    engine.refresh_metadata(repo, force, events)?;
    engine.build_cache(repo, force, events)?;

    if let Err(e) = engine.load_from_cache(repo) {
        warn!(repo = %repo.alias, "cache does not load, rebuilding: {e}");
        engine.clean_cache(repo)?;
        engine.build_cache(repo, force, events)?;
        engine.load_from_cache(repo)?;
    }
    Ok(())
}
