// src/engine/local/commit.rs

//! Carrying out a resolved plan: downloads first, then removals and installs.

use std::path::Path;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, info, warn};

use crate::engine::pool::{arch_compatible, ItemKind, Pool, PoolItem, Transact, INSTALLED_REPO};
use crate::engine::{
    CommitPolicy, CommitResult, CommitStep, DownloadMode, EngineError, EngineEvents, EngineResult,
    Flow, ProblemReply, RepoInfo, StepAction, StepState,
};
use crate::fs::FileSystem;

use super::installed;
use super::repo::{self, hash_bytes, package_file_name, CacheLayout};

const CHUNKS: [u32; 4] = [25, 50, 75, 100];

pub struct CommitTarget<'a> {
    pub fs: &'a dyn FileSystem,
    pub layout: &'a CacheLayout,
    pub repos: &'a [RepoInfo],
    pub installed_db: &'a Path,
}

pub fn commit(
    target: &CommitTarget<'_>,
    pool: &mut Pool,
    policy: &CommitPolicy,
    events: &mut dyn EngineEvents,
) -> EngineResult<CommitResult> {
    let installs = install_order(pool);
    let removals: Vec<usize> = pool
        .iter()
        .enumerate()
        .filter(|(_, item)| {
            item.installed
                && matches!(
                    item.status,
                    Transact::ToRemove | Transact::ToRemoveDueToObsolete
                )
        })
        .map(|(i, _)| i)
        .collect();

    let mut result = CommitResult::default();
    for &i in &installs {
        push_step(&mut result, pool, i, StepAction::Install);
    }
    if policy.download_mode == DownloadMode::InHeaps {
        for &i in &removals {
            push_step(&mut result, pool, i, StepAction::Remove);
        }
    }

    info!(
        installs = installs.len(),
        removals = removals.len(),
        mode = ?policy.download_mode,
        "committing plan"
    );

    let mut download_failed = false;
    for (step, &index) in installs.iter().enumerate() {
        let Some(item) = pool.get(index).cloned() else {
            continue;
        };
        if item.kind != ItemKind::Package || item.cached {
            continue;
        }
        match download(target, &item, policy, events)? {
            Ok(()) => {
                if let Some(item) = pool.get_mut(index) {
                    item.cached = true;
                }
            }
            Err(reason) => {
                warn!(package = %item.id, %reason, "download failed");
                result.steps[step].state = StepState::Error;
                download_failed = true;
                break;
            }
        }
    }

    if policy.download_mode == DownloadMode::Only || download_failed {
        if policy.sync_pool_after_commit {
            pool.reset_all();
        }
        return Ok(result);
    }

    let mut database: Vec<PoolItem> = pool.iter().filter(|i| i.installed).cloned().collect();

    for &index in &removals {
        let Some(item) = pool.get(index).cloned() else {
            continue;
        };
        events.remove_start(&item.id);
        for percent in [50, 100] {
            events.remove_progress(&item.id, percent);
        }
        database.retain(|i| i.id != item.id);
        events.remove_finish(&item.id, None);
        set_state(&mut result, &item, StepAction::Remove, StepState::Done);
    }

    for &index in &installs {
        let Some(item) = pool.get(index).cloned() else {
            continue;
        };
        events.install_start(&item.id, &item.summary);

        if item.kind == ItemKind::Package && !target.fs.is_file(&target.layout.package_file(&item.id)) {
            let description = format!("{}: package payload is missing from the cache", item.id.ident());
            match events.install_problem(&item.id, &description) {
                ProblemReply::Abort => {
                    events.install_finish(&item.id, Some(&description));
                    set_state(&mut result, &item, StepAction::Install, StepState::Error);
                    break;
                }
            }
        }

        for percent in [50, 100] {
            events.install_progress(&item.id, percent);
        }

        database.retain(|installed| {
            let replaced = installed.id.name == item.id.name
                && arch_compatible(&installed.id.arch, &item.id.arch);
            let obsoleted = item.obsoletes.iter().any(|o| o == &installed.id.name);
            !(replaced || obsoleted)
        });
        let mut record = item.clone();
        record.installed = true;
        record.id.data = INSTALLED_REPO.to_string();
        record.status = Transact::Untouched;
        database.push(record);

        events.install_finish(&item.id, None);
        set_state(&mut result, &item, StepAction::Install, StepState::Done);
    }

    installed::write(target.fs, target.installed_db, database.iter())?;

    if policy.sync_pool_after_commit {
        pool.erase_installed();
        pool.extend(database);
        pool.reset_all();
    }

    Ok(result)
}

fn push_step(result: &mut CommitResult, pool: &Pool, index: usize, action: StepAction) {
    if let Some(item) = pool.get(index) {
        result.steps.push(CommitStep {
            id: item.id.clone(),
            action,
            state: StepState::Todo,
        });
    }
}

fn set_state(result: &mut CommitResult, item: &PoolItem, action: StepAction, state: StepState) {
    if let Some(step) = result
        .steps
        .iter_mut()
        .find(|s| s.id == item.id && s.action == action)
    {
        step.state = state;
    }
}

/// To-install items with providers ahead of the items that require them.
fn install_order(pool: &Pool) -> Vec<usize> {
    let pending: Vec<usize> = pool
        .iter()
        .enumerate()
        .filter(|(_, item)| item.status.is_to_install())
        .map(|(i, _)| i)
        .collect();

    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
    for &i in &pending {
        graph.add_node(i);
    }
    for &dependent in &pending {
        let Some(item) = pool.get(dependent) else {
            continue;
        };
        for &provider in &pending {
            if provider != dependent
                && pool
                    .get(provider)
                    .is_some_and(|p| item.requires.iter().any(|cap| p.provides_name(cap)))
            {
                graph.add_edge(provider, dependent, ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => order,
        Err(cycle) => {
            debug!(node = cycle.node_id(), "dependency cycle; installing in pool order");
            pending
        }
    }
}

/// Fetch one payload into the package cache. The inner error is a
/// per-package failure; the outer one aborts the whole commit.
fn download(
    target: &CommitTarget<'_>,
    item: &PoolItem,
    policy: &CommitPolicy,
    events: &mut dyn EngineEvents,
) -> EngineResult<Result<(), String>> {
    let id = &item.id;
    events.download_start(id, &item.summary);

    let repo = target
        .repos
        .iter()
        .find(|r| r.alias == id.data)
        .ok_or_else(|| EngineError::RepoNotFound(id.data.clone()))?;
    let source = repo::source_dir(repo, events)?;
    let location = item
        .location
        .clone()
        .unwrap_or_else(|| package_file_name(id));

    let payload = match target.fs.read_to_string(&source.join(&location)) {
        Ok(payload) => payload,
        Err(e) => {
            let reason = format!("{location}: {e:#}");
            events.download_finish(id, Some(&reason));
            return Ok(Err(reason));
        }
    };

    for percent in CHUNKS {
        if events.download_progress(id, percent) == Flow::Cancel {
            debug!(package = %id, "download cancelled");
            return Err(EngineError::Cancelled);
        }
    }

    let failure = match &item.checksum {
        Some(expected) if &hash_bytes(payload.as_bytes()) != expected => {
            Some(format!("{location}: digest mismatch"))
        }
        _ if policy.verify_signatures && !item.signed => {
            Some(format!("{location}: package is not signed"))
        }
        _ => None,
    };
    if let Some(reason) = failure {
        events.download_finish(id, Some(&reason));
        return Ok(Err(reason));
    }

    let destination = target.layout.package_file(id);
    target
        .fs
        .create_dir_all(&target.layout.packages_dir(&id.data))?;
    target.fs.write(&destination, payload.as_bytes())?;
    events.download_finish(id, None);
    Ok(Ok(()))
}
