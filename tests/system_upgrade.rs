mod common;

use std::path::Path;

use common::harness::{DIST_UPGRADE, REDIRECT, REGULAR};
use common::{builders, init_tracing, package, pattern, repo, FakeEngine, Harness};
use pkbridge::cache_root::CacheRoot;
use pkbridge::engine::{DownloadMode, EngineError};
use pkbridge::frontend::Outcome;
use pkbridge::fs::FileSystem;
use pkbridge::ops::upgrade::UpgradePlan;
use pkbridge::ops::Request;
use pkbridge::types::{ErrorCode, InfoKind, TransactionFlags, UpgradeKind};

fn engine() -> FakeEngine {
    FakeEngine::new()
        .with_installed([package("hello", "2.10").installed().build()])
        .with_repo(
            repo("oss"),
            [package("hello", "2.12").build(), pattern("leap-16", "1").build()],
        )
}

fn upgrade(distro_id: &str, kind: UpgradeKind, flags: TransactionFlags) -> Request {
    Request::UpgradeSystem {
        distro_id: distro_id.to_string(),
        kind,
        flags,
    }
}

fn solv(root: &str) -> String {
    format!("{root}/solv/oss.toml")
}

#[test]
fn upgrade_runs_on_the_dist_upgrade_root_and_promotes_it() {
    init_tracing();
    let h = Harness::new(engine());
    h.fs.add_file(solv(DIST_UPGRADE), "fresh");

    let outcome = h.run(upgrade("", UpgradeKind::Default, TransactionFlags::NONE));

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(
        h.fs.read_link(Path::new(REDIRECT)).unwrap(),
        Some(DIST_UPGRADE.into())
    );
    assert_eq!(h.journal.commits().len(), 1);
    assert_eq!(
        h.fs.read_to_string(Path::new(&solv(REGULAR))).unwrap(),
        "fresh"
    );
    let resolver = h.coordinator.with_engine(|e| e.resolver().clone());
    assert!(!resolver.upgrade_mode);
    assert!(!resolver.force_resolve);
}

#[test]
fn simulated_upgrade_keeps_the_regular_cache() {
    init_tracing();
    let h = Harness::new(engine());
    h.fs.add_file(solv(DIST_UPGRADE), "fresh");

    let outcome = h.run(upgrade("", UpgradeKind::Default, TransactionFlags::SIMULATE));

    assert_eq!(outcome, Outcome::Success);
    assert!(h.journal.commits().is_empty());
    assert!(!h.fs.exists(Path::new(&solv(REGULAR))));
    let packages = h.sink.packages();
    assert!(packages.contains(&(InfoKind::Installing, "hello;2.12;x86_64;oss".to_string())));
    assert!(packages.contains(&(InfoKind::Updating, "hello;2.10;x86_64;installed".to_string())));
}

#[test]
fn complete_upgrade_brings_in_the_distro_pattern() {
    init_tracing();
    let h = Harness::new(engine());

    let outcome = h.run(upgrade(
        "leap-16",
        UpgradeKind::Complete,
        TransactionFlags::SIMULATE,
    ));

    assert_eq!(outcome, Outcome::Success);
    assert!(h
        .sink
        .packages()
        .contains(&(InfoKind::Installing, "leap-16;1;noarch;oss".to_string())));
}

#[test]
fn minimal_upgrade_only_downloads() {
    init_tracing();
    let h = Harness::new(engine());
    h.fs.add_file(solv(DIST_UPGRADE), "fresh");

    let outcome = h.run(upgrade("", UpgradeKind::Minimal, TransactionFlags::NONE));

    assert_eq!(outcome, Outcome::Success);
    let commits = h.journal.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].download_mode, DownloadMode::Only);
    assert!(!h.fs.exists(Path::new(&solv(REGULAR))));
}

#[test]
fn size_query_prefix_reports_sizes_only() {
    init_tracing();
    let h = Harness::new(engine());

    let outcome = h.run(upgrade(
        "ext::query-sizes:leap-16",
        UpgradeKind::Default,
        TransactionFlags::NONE,
    ));

    assert_eq!(outcome, Outcome::Success);
    assert!(h.journal.commits().is_empty());
    let names: Vec<String> = h.sink.details().into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["::DOWNLOAD", "::INSTALL", "::REMOVE", "::CACHED"]);
}

#[test]
fn nothing_to_upgrade_is_reported() {
    let engine = FakeEngine::new()
        .with_installed([package("hello", "2.12").installed().build()])
        .with_repo(repo("oss"), [package("hello", "2.12").build()]);
    let h = Harness::new(engine);

    let outcome = h.run(upgrade("", UpgradeKind::Default, TransactionFlags::NONE));

    assert_eq!(
        outcome,
        Outcome::Failed {
            code: ErrorCode::NoDistroUpgradeData,
            message: "No Distribution Upgrade Available.".to_string(),
        }
    );
    assert!(!h.coordinator.with_engine(|e| e.pool().has_pending()));
}

#[test]
fn refresh_failure_keeps_its_own_error() {
    let mut engine = engine();
    engine
        .repo_keys
        .insert("oss".to_string(), builders::key("4A8B"));
    let h = Harness::new(engine);

    let outcome = h.run(upgrade("", UpgradeKind::Default, TransactionFlags::NONE));

    assert_eq!(outcome.code(), Some(ErrorCode::GpgFailure));
    assert!(h.journal.commits().is_empty());
}

#[test]
fn plan_for_each_kind() {
    let plan = UpgradePlan::new("leap-16", UpgradeKind::Default, TransactionFlags::NONE);
    assert!(plan.sync_cache);
    assert!(!plan.refresh);
    assert!(!plan.install_pattern);

    let plan = UpgradePlan::new("leap-16", UpgradeKind::Default, TransactionFlags::SIMULATE);
    assert!(!plan.sync_cache);

    let plan = UpgradePlan::new("leap-16", UpgradeKind::Minimal, TransactionFlags::NONE);
    assert!(plan.flags.is_only_download());
    assert!(plan.refresh);
    assert!(!plan.sync_cache);
    assert!(plan.install_pattern);

    let plan = UpgradePlan::new("leap-16", UpgradeKind::Complete, TransactionFlags::NONE);
    assert!(plan.sync_cache);
    assert!(!plan.refresh);
    assert!(plan.install_pattern);

    let plan = UpgradePlan::new("leap-16", UpgradeKind::Complete, TransactionFlags::SIMULATE);
    assert!(plan.refresh);
    assert!(!plan.sync_cache);
}

#[test]
fn size_query_prefixes_are_stripped() {
    for prefix in ["nemo::query-size:", "ext::query-sizes:"] {
        let plan = UpgradePlan::new(
            &format!("{prefix}leap-16"),
            UpgradeKind::Default,
            TransactionFlags::NONE,
        );
        assert_eq!(plan.distro_id, "leap-16");
        assert!(plan.flags.is_size_query());
        assert!(plan.refresh);
    }
}

#[test]
fn unreloadable_pool_keeps_the_regular_root_active() {
    init_tracing();
    let mut engine = engine().with_available([package("stale", "1").build()]);
    engine.repos_error = Some(EngineError::RepoConfiguration("unreadable".to_string()));
    let h = Harness::new(engine);
    h.fs.add_dir(REGULAR);
    h.fs.add_symlink(REDIRECT, REGULAR);

    for _ in 0..2 {
        let outcome = h.run(upgrade("", UpgradeKind::Default, TransactionFlags::NONE));

        assert_eq!(
            outcome,
            Outcome::Failed {
                code: ErrorCode::NoDistroUpgradeData,
                message: "Could not configure package cache.".to_string(),
            }
        );
        assert_eq!(h.coordinator.cache().active(), Ok(Some(CacheRoot::Regular)));
    }
    assert!(h.journal.commits().is_empty());
}
