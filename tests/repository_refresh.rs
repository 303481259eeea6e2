mod common;

use common::{builders, init_tracing, package, repo, EngineCall, FakeEngine, Harness};
use pkbridge::engine::{EngineError, ItemKind};
use pkbridge::frontend::{FrontendEvent, Outcome};
use pkbridge::ops::Request;
use pkbridge::types::{ErrorCode, Percentage, Status};

fn refresh(force: bool) -> Request {
    Request::Refresh { force }
}

fn refreshed(calls: &[EngineCall], alias: &str) -> bool {
    calls.iter().any(|c| {
        matches!(c, EngineCall::RefreshMetadata { alias: a, .. } if a == alias)
    })
}

#[test]
fn refresh_loads_every_enabled_repository() {
    init_tracing();
    let engine = FakeEngine::new()
        .with_repo(repo("oss"), [package("hello", "2.12").build()])
        .with_repo(repo("non-oss"), [package("unrar", "7.0").repo("non-oss").build()]);
    let h = Harness::new(engine);

    assert_eq!(h.run(refresh(false)), Outcome::Success);

    assert_eq!(h.sink.statuses(), vec![Status::RefreshCache]);
    assert_eq!(
        h.sink.percentages(),
        vec![
            Percentage::Value(0),
            Percentage::Value(50),
            Percentage::Value(100),
            Percentage::Value(100),
        ]
    );
    let aliases = h.coordinator.with_engine(|e| e.pool().repo_aliases());
    assert!(aliases.contains("oss"));
    assert!(aliases.contains("non-oss"));
}

#[test]
fn force_also_refreshes_manual_repositories() {
    init_tracing();
    let mut manual = repo("debug");
    manual.autorefresh = false;
    let engine = FakeEngine::new()
        .with_repo(repo("oss"), [])
        .with_repo(manual, []);
    let h = Harness::new(engine);

    h.run(refresh(false));
    assert!(!refreshed(&h.journal.calls(), "debug"));

    h.run(refresh(true));
    let calls = h.journal.calls();
    assert!(refreshed(&calls, "debug"));
    assert!(calls.contains(&EngineCall::RefreshMetadata {
        alias: "oss".to_string(),
        force: true,
    }));
}

#[test]
fn disabled_and_removable_repositories_are_dropped_from_the_pool() {
    init_tracing();
    let mut disabled = repo("debug");
    disabled.enabled = false;
    let mut dvd = repo("dvd");
    dvd.baseurl = "dvd:///?devices=/dev/sr0".to_string();

    let mut engine = FakeEngine::new()
        .with_available([
            package("gdb", "14").repo("debug").build(),
            package("kernel", "6.4").repo("dvd").build(),
            package("orphan", "1").repo("gone").build(),
        ])
        .with_repo(repo("oss"), [package("hello", "2.12").build()]);
    engine.repos.push(disabled);
    engine.repos.push(dvd);
    let h = Harness::new(engine);

    assert_eq!(h.run(refresh(true)), Outcome::Success);

    let calls = h.journal.calls();
    assert!(!refreshed(&calls, "debug"));
    assert!(!refreshed(&calls, "dvd"));
    let aliases = h.coordinator.with_engine(|e| e.pool().repo_aliases());
    assert_eq!(aliases.into_iter().collect::<Vec<_>>(), vec!["oss".to_string()]);
}

#[test]
fn corrupt_cache_is_rebuilt_once() {
    init_tracing();
    let mut engine = FakeEngine::new().with_repo(repo("oss"), [package("hello", "2.12").build()]);
    engine.corrupt_caches.insert("oss".to_string());
    let h = Harness::new(engine);

    assert_eq!(h.run(refresh(false)), Outcome::Success);

    let calls: Vec<EngineCall> = h
        .journal
        .calls()
        .into_iter()
        .filter(|c| {
            matches!(
                c,
                EngineCall::BuildCache(_) | EngineCall::CleanCache(_) | EngineCall::LoadFromCache(_)
            )
        })
        .collect();
    assert_eq!(
        calls,
        vec![
            EngineCall::BuildCache("oss".to_string()),
            EngineCall::LoadFromCache("oss".to_string()),
            EngineCall::CleanCache("oss".to_string()),
            EngineCall::BuildCache("oss".to_string()),
            EngineCall::LoadFromCache("oss".to_string()),
        ]
    );
    assert_eq!(h.coordinator.with_engine(|e| e.pool().len()), 1);
}

#[test]
fn one_failing_repository_does_not_stop_the_others() {
    init_tracing();
    let mut engine = FakeEngine::new()
        .with_repo(repo("mirror"), [])
        .with_repo(repo("oss"), [package("hello", "2.12").build()]);
    engine.refresh_errors.insert(
        "mirror".to_string(),
        EngineError::Media("cannot reach remote repository url".to_string()),
    );
    let h = Harness::new(engine);

    assert_eq!(h.run(refresh(false)), Outcome::Success);
    assert!(refreshed(&h.journal.calls(), "oss"));
    assert!(h.coordinator.with_engine(|e| e.pool().repo_aliases().contains("oss")));
}

#[test]
fn repository_without_alias_is_a_configuration_error() {
    let mut nameless = repo("");
    nameless.name = "Broken".to_string();
    let mut engine = FakeEngine::new();
    engine.repos.push(nameless);
    let h = Harness::new(engine);

    assert_eq!(
        h.run(refresh(false)),
        Outcome::Failed {
            code: ErrorCode::RepoConfiguration,
            message: "Broken: Repository has no or invalid repo name defined.".to_string(),
        }
    );
}

#[test]
fn unreadable_repository_list_is_repo_not_found() {
    let mut engine = FakeEngine::new();
    engine.repos_error = Some(EngineError::RepoConfiguration("bad toml".to_string()));
    let h = Harness::new(engine);

    assert_eq!(h.run(refresh(false)).code(), Some(ErrorCode::RepoNotFound));
}

#[test]
fn untrusted_key_stops_refresh_until_installed() {
    init_tracing();
    let mut engine = FakeEngine::new()
        .with_repo(repo("oss"), [package("hello", "2.12").build()])
        .with_repo(repo("updates"), []);
    engine
        .repo_keys
        .insert("oss".to_string(), builders::key("4A8B"));
    let h = Harness::new(engine);

    let outcome = h.run(refresh(false));

    assert_eq!(
        outcome,
        Outcome::Failed {
            code: ErrorCode::GpgFailure,
            message: "Signature verification for Repository oss failed".to_string(),
        }
    );
    assert_eq!(
        h.sink.count(|e| matches!(e, FrontendEvent::RepoSignatureRequired { .. })),
        1
    );
    // Refresh stops at the untrusted repository.
    assert!(!refreshed(&h.journal.calls(), "updates"));

    assert_eq!(
        h.run(Request::InstallSignature {
            key_id: "4A8B".to_string()
        }),
        Outcome::Success
    );
    assert_eq!(h.run(refresh(false)), Outcome::Success);
    assert!(refreshed(&h.journal.calls(), "updates"));
    assert!(h.coordinator.with_engine(|e| {
        e.pool()
            .iter()
            .any(|i| i.kind == ItemKind::Package && i.id.name == "hello")
    }));
}
