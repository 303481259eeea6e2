// src/ops/repos.rs

//! Repository setup: listing, enabling and editing repository definitions.

use tracing::{debug, info};

use crate::engine::{EngineError, RepoInfo};
use crate::errors::{JobError, JobResult};
use crate::job::JobContext;
use crate::types::{ErrorCode, Status};

use super::refresh::refresh_meta_and_cache;

/// Map a repository-manager failure to the job error the front-end sees.
fn repo_error(e: EngineError) -> JobError {
    match e {
        EngineError::RepoNotFound(_) => JobError::new(
            ErrorCode::RepoNotFound,
            "Couldn't find the specified repository",
        ),
        EngineError::RepoAlreadyExists(_) => {
            JobError::new(ErrorCode::InternalError, "This repo already exists")
        }
        other => JobError::new(other.code(), other.to_string()),
    }
}

fn lookup(ctx: &JobContext<'_>, alias: &str) -> JobResult<RepoInfo> {
    let repos = ctx.engine.known_repos().map_err(repo_error)?;
    let repo = repos
        .into_iter()
        .find(|r| r.alias == alias)
        .ok_or_else(|| repo_error(EngineError::RepoNotFound(alias.to_string())))?;
    validate(&repo)?;
    Ok(repo)
}

fn validate(repo: &RepoInfo) -> JobResult<()> {
    if repo.alias.trim().is_empty() {
        return Err(JobError::new(
            ErrorCode::RepoConfiguration,
            format!(
                "{}: Repository has no or invalid repo name defined.",
                repo.alias
            ),
        ));
    }
    if repo.baseurl.trim().is_empty() {
        return Err(JobError::new(
            ErrorCode::RepoConfiguration,
            format!("{}: Repository has no or invalid url defined.", repo.alias),
        ));
    }
    Ok(())
}

/// Every configured repository, optionally without debug, source and
/// development ones.
pub fn get_repo_list(ctx: &mut JobContext<'_>, hide_development: bool) -> JobResult<()> {
    let reporter = ctx.reporter();
    reporter.status(Status::Query);

    let repos = ctx.engine.known_repos().map_err(repo_error)?;
    for repo in repos
        .iter()
        .filter(|r| !(hide_development && r.is_development()))
    {
        reporter.repo_detail(&repo.alias, repo.display_name(), repo.enabled);
    }
    Ok(())
}

/// Enable or disable `alias`. Disabling also drops its cached metadata and
/// its items from the pool.
pub fn repo_enable(ctx: &mut JobContext<'_>, alias: &str, enabled: bool) -> JobResult<()> {
    let reporter = ctx.reporter();
    reporter.status(Status::Query);

    let mut repo = lookup(ctx, alias)?;
    repo.enabled = enabled;
    ctx.engine.modify_repo(alias, &repo).map_err(repo_error)?;

    if !enabled {
        ctx.engine.clean_cache(&repo).map_err(repo_error)?;
        let erased = ctx.engine.pool_mut().erase_repo(alias);
        debug!(repo = %alias, erased, "dropped disabled repository from pool");
    }
    info!(repo = %alias, enabled, "repository state changed");
    Ok(())
}

fn parse_switch(value: &str, message: &str) -> JobResult<bool> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(JobError::new(ErrorCode::NotSupported, message))
    }
}

/// Priority from one or two digits. `0` leaves the priority alone.
pub fn parse_priority(value: &str) -> JobResult<Option<u32>> {
    if value.len() > 2 {
        return Err(JobError::new(
            ErrorCode::NotSupported,
            "Priorities has to be between 1 (highest) and 99",
        ));
    }
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(JobError::new(
            ErrorCode::NotSupported,
            "Priorities has to be a number between 1 (highest) and 99",
        ));
    }
    let prio: u32 = value.parse().map_err(|_| {
        JobError::new(
            ErrorCode::NotSupported,
            "Priorities has to be a number between 1 (highest) and 99",
        )
    })?;
    Ok((prio != 0).then_some(prio))
}

/// Change one property of a repository, or add or remove one.
///
/// `parameter` is one of `add`, `remove`, `refresh`, `keep`, `url`, `name`,
/// `refresh-now` and `prio`, matched case-insensitively.
pub fn repo_set_data(
    ctx: &mut JobContext<'_>,
    alias: &str,
    parameter: &str,
    value: &str,
) -> JobResult<()> {
    let reporter = ctx.reporter();
    reporter.status(Status::Setup);
    let parameter = parameter.to_ascii_lowercase();

    if parameter == "add" {
        let repo = RepoInfo::new(alias, value);
        validate(&repo)?;
        ctx.engine.add_repo(&repo).map_err(repo_error)?;
        info!(repo = %alias, url = %value, "repository added");
        return Ok(());
    }

    let mut repo = lookup(ctx, alias)?;
    match parameter.as_str() {
        "remove" => {
            ctx.engine.remove_repo(alias).map_err(repo_error)?;
            info!(repo = %alias, "repository removed");
            return Ok(());
        }
        "refresh" => {
            repo.autorefresh = parse_switch(value, "Autorefresh a repo: Enter true or false")?;
        }
        "keep" => {
            repo.keep_packages =
                parse_switch(value, "Keep downloaded packages: Enter true or false")?;
        }
        "url" => repo.baseurl = value.to_string(),
        "name" => repo.name = value.to_string(),
        "refresh-now" => {
            let force = value.eq_ignore_ascii_case("true");
            info!(repo = %alias, url = %repo.baseurl, force, "refreshing single repository");
            reporter.status(Status::RefreshCache);
            ctx.bridge.set_repo(Some(repo.clone()));
            let result = refresh_meta_and_cache(ctx.engine, &repo, force, &mut ctx.bridge);
            ctx.bridge.set_repo(None);
            if let Some(err) = reporter.first_error() {
                return Err(err);
            }
            return result.map_err(repo_error);
        }
        "prio" => match parse_priority(value)? {
            Some(prio) => repo.priority = prio,
            None => return Ok(()),
        },
        _ => {
            return Err(JobError::new(
                ErrorCode::NotSupported,
                "Valid parameters for set_repo_data are remove/add/refresh/prio/keep/url/name/refresh-now",
            ))
        }
    }

    ctx.engine.modify_repo(alias, &repo).map_err(repo_error)?;
    debug!(repo = %alias, %parameter, %value, "repository modified");
    Ok(())
}
