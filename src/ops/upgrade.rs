// src/ops/upgrade.rs

//! Distribution upgrade.
//!
//! Always runs on the dist-upgrade cache root (the coordinator switches
//! before dispatching here). A real default or complete upgrade promotes
//! that root over the regular one once it went through.

use tracing::{error, info};

use crate::engine::{ItemKind, Transact};
use crate::errors::{JobError, JobResult};
use crate::job::JobContext;
use crate::transaction::{perform, Transaction};
use crate::types::{ErrorCode, PerformType, TransactionFlags, UpgradeKind};

use super::query::get_updates;
use super::{build_pool, refresh_sources};

/// Distro-id prefixes that turn the request into a size query.
const SIZE_QUERY_PREFIXES: [&str; 2] = ["nemo::query-size:", "ext::query-sizes:"];

/// What an upgrade request boils down to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePlan {
    pub distro_id: String,
    pub flags: TransactionFlags,
    /// Force-refresh repositories first.
    pub refresh: bool,
    /// Promote the dist-upgrade cache after the run.
    pub sync_cache: bool,
    /// Also install the distro pattern.
    pub install_pattern: bool,
}

impl UpgradePlan {
    pub fn new(distro_id: &str, kind: UpgradeKind, mut flags: TransactionFlags) -> Self {
        let mut refresh = false;
        let mut sync_cache = false;
        let mut install_pattern = false;

        let distro_id = match SIZE_QUERY_PREFIXES
            .iter()
            .find_map(|prefix| distro_id.strip_prefix(prefix))
        {
            Some(rest) => {
                flags.insert(TransactionFlags::SIMULATE | TransactionFlags::EXT_DOWNLOAD_SIZE);
                info!(pattern = %rest, "getting size of distro upgrade");
                refresh = true;
                rest
            }
            None => distro_id,
        };

        match kind {
            UpgradeKind::Minimal | UpgradeKind::Complete => {
                if kind == UpgradeKind::Minimal {
                    flags.insert(TransactionFlags::ONLY_DOWNLOAD);
                }
                if flags.is_only_download() {
                    info!("downloading upgrades (no installation)");
                    refresh = true;
                } else if flags.is_simulate() {
                    refresh = true;
                    info!(distro = %distro_id, "simulating upgrade with distro pattern");
                } else {
                    info!(distro = %distro_id, "installing upgrades with distro pattern");
                    sync_cache = true;
                }
                install_pattern = true;
            }
            UpgradeKind::Default => {
                info!("downloading and installing upgrades");
                sync_cache = !flags.is_simulate();
            }
        }

        Self {
            distro_id: distro_id.to_string(),
            flags,
            refresh,
            sync_cache,
            install_pattern,
        }
    }
}

pub fn upgrade_system(
    ctx: &mut JobContext<'_>,
    distro_id: &str,
    kind: UpgradeKind,
    flags: TransactionFlags,
) -> JobResult<()> {
    let plan = UpgradePlan::new(distro_id, kind, flags);
    let reporter = ctx.reporter();

    if let Err(err) = refresh_sources(ctx, plan.refresh) {
        reporter.error(err);
        return Err(JobError::new(
            ErrorCode::RepoNotAvailable,
            "Cannot refresh package cache.",
        ));
    }
    build_pool(ctx.engine)?;

    let (_, candidates) = get_updates(ctx.engine, ctx.settings.hide_packages);

    ctx.engine.pool_mut().save_state();
    if plan.install_pattern {
        mark_pattern(ctx, &plan.distro_id);
    }

    if candidates.is_empty() {
        ctx.engine.pool_mut().restore_state();
        return Err(JobError::new(
            ErrorCode::NoDistroUpgradeData,
            "No Distribution Upgrade Available.",
        ));
    }

    ctx.engine.resolver_mut().upgrade_mode = true;
    let tx = Transaction::new(PerformType::UpgradeSystem, plan.flags).forced(true);
    let result = perform(ctx, tx);

    if plan.sync_cache && result.is_ok() {
        info!("updating regular package cache");
        if let Err(e) = ctx.cache.promote_alternate() {
            error!("failed to update the regular package cache: {e:#}");
        }
    }

    ctx.engine.resolver_mut().upgrade_mode = false;
    ctx.engine.pool_mut().restore_state();
    result
}

fn mark_pattern(ctx: &mut JobContext<'_>, distro_id: &str) {
    let mut found = false;
    for item in ctx
        .engine
        .pool_mut()
        .iter_mut()
        .filter(|i| i.kind == ItemKind::Pattern && !i.installed && i.name() == distro_id)
    {
        info!(pattern = %item.id, "marking pattern for installation");
        item.status = Transact::ToInstall;
        found = true;
    }
    if !found {
        info!(pattern = %format!("pattern:{distro_id}"), "pattern not found, ignoring");
    }
}
