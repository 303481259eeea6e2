mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::harness::{cache_roots, DIST_UPGRADE, REDIRECT, REGULAR};
use common::{init_tracing, package, repo, EngineCall, FakeEngine};
use pkbridge::cache_root::{reset_pool, CacheRoot, CacheRootSwitch, RootSwitch};
use pkbridge::engine::Engine;
use pkbridge::fs::mock::MockFileSystem;
use pkbridge::fs::FileSystem;
use pkbridge::types::ErrorCode;

fn switch(fs: &MockFileSystem) -> CacheRootSwitch {
    CacheRootSwitch::new(Arc::new(fs.clone()), cache_roots())
}

fn engine() -> FakeEngine {
    FakeEngine::new().with_repo(repo("oss"), [package("hello", "2.12").build()])
}

#[test]
fn first_selection_creates_directory_and_redirect() {
    init_tracing();
    let fs = MockFileSystem::new();
    let cache = switch(&fs);
    let mut engine = engine();

    let outcome = cache.select_root(CacheRoot::Regular, &mut engine).unwrap();

    assert_eq!(outcome, RootSwitch::Created);
    assert!(fs.is_dir(Path::new(REGULAR)));
    assert_eq!(
        fs.read_link(Path::new(REDIRECT)).unwrap(),
        Some(PathBuf::from(REGULAR))
    );
    assert_eq!(cache.active().unwrap(), Some(CacheRoot::Regular));
    assert_eq!(cache.active_path(), PathBuf::from(REGULAR));
    assert!(engine.journal().calls().is_empty());
}

#[test]
fn selecting_the_active_root_is_a_no_op() {
    init_tracing();
    let fs = MockFileSystem::new();
    let cache = switch(&fs);
    let mut engine = engine();
    let journal = engine.journal();

    cache.select_root(CacheRoot::DistUpgrade, &mut engine).unwrap();
    let again = cache.select_root(CacheRoot::DistUpgrade, &mut engine).unwrap();

    assert_eq!(again, RootSwitch::Unchanged);
    assert_eq!(journal.count(|c| matches!(c, EngineCall::LoadFromCache(_))), 0);
}

#[test]
fn switching_reloads_repositories_and_clears_modes() {
    init_tracing();
    let fs = MockFileSystem::new();
    let cache = switch(&fs);
    let mut engine = engine();
    let journal = engine.journal();

    cache.select_root(CacheRoot::Regular, &mut engine).unwrap();
    engine.resolver_mut().upgrade_mode = true;
    engine.resolver_mut().force_resolve = true;

    let outcome = cache.select_root(CacheRoot::DistUpgrade, &mut engine).unwrap();

    assert_eq!(outcome, RootSwitch::Switched);
    assert_eq!(cache.active(), Ok(Some(CacheRoot::DistUpgrade)));
    assert!(journal
        .calls()
        .contains(&EngineCall::LoadFromCache("oss".to_string())));
    assert!(!engine.resolver().upgrade_mode);
    assert!(!engine.resolver().force_resolve);
    assert_eq!(engine.pool().len(), 1);
}

#[test]
fn uncached_repositories_are_only_dropped() {
    let fs = MockFileSystem::new();
    let cache = switch(&fs);
    let mut engine = FakeEngine::new().with_available([package("stale", "1").build()]);
    engine.repos.push(repo("oss"));

    cache.select_root(CacheRoot::Regular, &mut engine).unwrap();
    cache.select_root(CacheRoot::DistUpgrade, &mut engine).unwrap();

    assert!(engine.pool().is_empty());
}

#[test]
fn redirect_that_is_a_directory_fails_closed() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir(REDIRECT);
    let cache = switch(&fs);
    let mut engine = engine();

    let err = cache
        .select_root(CacheRoot::Regular, &mut engine)
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::NoDistroUpgradeData);
    assert_eq!(err.message, "Could not configure package cache.");
    assert!(fs.is_dir(Path::new(REDIRECT)));
    assert!(engine.journal().calls().is_empty());
}

#[test]
fn unreadable_redirect_falls_back_to_its_own_path() {
    let fs = MockFileSystem::new();
    fs.add_file(REDIRECT, "not a link");
    let cache = switch(&fs);
    assert_eq!(cache.active_path(), PathBuf::from(REDIRECT));
}

#[test]
fn promote_alternate_replaces_the_regular_root() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file(format!("{REGULAR}/solv/old.toml"), "old");
    fs.add_file(format!("{DIST_UPGRADE}/solv/oss.toml"), "new");
    let cache = switch(&fs);

    cache.promote_alternate().unwrap();
    // Promoting again is harmless.
    cache.promote_alternate().unwrap();

    assert_eq!(
        fs.read_to_string(Path::new(&format!("{REGULAR}/solv/oss.toml")))
            .unwrap(),
        "new"
    );
    assert!(!fs.exists(Path::new(&format!("{REGULAR}/solv/old.toml"))));
    assert!(fs.exists(Path::new(&format!("{DIST_UPGRADE}/solv/oss.toml"))));
}

#[test]
fn reset_pool_propagates_repository_errors() {
    let mut engine = engine();
    engine.repos_error = Some(pkbridge::engine::EngineError::RepoConfiguration(
        "broken".to_string(),
    ));
    assert!(reset_pool(&mut engine).is_err());
}

#[test]
fn root_helpers() {
    assert_eq!(CacheRoot::for_dist_upgrade(true), CacheRoot::DistUpgrade);
    assert_eq!(CacheRoot::Regular.other(), CacheRoot::DistUpgrade);
    let roots = cache_roots();
    assert_eq!(roots.root_at(Path::new(DIST_UPGRADE)), Some(CacheRoot::DistUpgrade));
    assert_eq!(roots.root_at(Path::new("/elsewhere")), None);
}

#[test]
fn failed_reload_points_the_redirect_back() {
    init_tracing();
    let fs = MockFileSystem::new();
    let cache = switch(&fs);
    let mut engine = engine().with_available([package("stale", "1").build()]);
    let journal = engine.journal();

    cache.select_root(CacheRoot::Regular, &mut engine).unwrap();
    engine.repos_error = Some(pkbridge::engine::EngineError::RepoConfiguration(
        "unreadable".to_string(),
    ));

    let err = cache
        .select_root(CacheRoot::DistUpgrade, &mut engine)
        .unwrap_err();

    assert_eq!(err.message, "Could not configure package cache.");
    assert_eq!(cache.active(), Ok(Some(CacheRoot::Regular)));

    // Once the repositories are readable the switch happens and reloads.
    engine.repos_error = None;
    let outcome = cache.select_root(CacheRoot::DistUpgrade, &mut engine).unwrap();

    assert_eq!(outcome, RootSwitch::Switched);
    assert!(journal
        .calls()
        .contains(&EngineCall::LoadFromCache("oss".to_string())));
    assert!(engine.pool().iter().all(|item| item.id.name != "stale"));
}
