mod common;

use std::path::Path;

use common::harness::{job_settings, REBUILD_MARKER, REDIRECT};
use common::{init_tracing, package, repo, EngineCall, FakeEngine, Harness};
use pkbridge::engine::{EngineError, PackageId};
use pkbridge::frontend::{FrontendEvent, JobId, Outcome};
use pkbridge::fs::FileSystem;
use pkbridge::ops::Request;
use pkbridge::types::{ErrorCode, Status, TransactionFlags};

fn engine() -> FakeEngine {
    FakeEngine::new()
        .with_installed([package("hello", "2.10").installed().build()])
        .with_repo(repo("oss"), [package("hello", "2.12").build()])
}

fn refresh() -> Request {
    Request::Refresh { force: false }
}

fn update_hello() -> Request {
    Request::Update {
        package_ids: vec![PackageId::new("hello", "2.10", "x86_64", "installed")],
        flags: TransactionFlags::NONE,
    }
}

#[test]
fn every_job_is_bracketed_by_lock_events() {
    init_tracing();
    let h = Harness::new(engine());

    let outcome = h.run(refresh());

    assert_eq!(outcome, Outcome::Success);
    let events = h.sink.events();
    assert_eq!(events.first(), Some(&FrontendEvent::Locked(true)));
    let n = events.len();
    assert_eq!(events[n - 2], FrontendEvent::Locked(false));
    assert_eq!(events[n - 1], FrontendEvent::Finished(Outcome::Success));
    assert_eq!(h.coordinator.in_use(), None);
}

#[test]
fn concurrent_jobs_hold_the_engine_one_at_a_time() {
    init_tracing();
    let h = Harness::new(engine());

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                assert_eq!(h.run(refresh()), Outcome::Success);
            });
        }
    });

    let locks: Vec<(JobId, bool)> = h
        .sink
        .all()
        .into_iter()
        .filter_map(|(job, e)| match e {
            FrontendEvent::Locked(locked) => Some((job, locked)),
            _ => None,
        })
        .collect();
    assert_eq!(locks.len(), 8);
    for pair in locks.chunks(2) {
        assert!(pair[0].1, "lock must come first");
        assert!(!pair[1].1, "unlock must follow");
        assert_eq!(pair[0].0, pair[1].0, "no other job in between");
    }
    // The target is initialised once and then reused.
    assert_eq!(
        h.journal
            .count(|c| matches!(c, EngineCall::InitializeTarget(_))),
        1
    );
}

#[test]
fn cancelling_a_job_aborts_its_download() {
    init_tracing();
    let h = Harness::new(engine());
    let id = h.coordinator.create_job();

    assert!(h.coordinator.cancel(id));
    let outcome = h.coordinator.run(id, &update_hello());

    assert_eq!(
        outcome,
        Outcome::Failed {
            code: ErrorCode::TransactionCancelled,
            message: "operation cancelled".to_string(),
        }
    );
    assert!(!h.coordinator.cancel(id), "finished jobs are forgotten");
    assert!(!h.coordinator.with_engine(|e| e.pool().has_pending()));
}

#[test]
fn cancelled_refresh_reports_cancellation() {
    let h = Harness::new(engine());
    let id = h.coordinator.create_job();
    h.coordinator.cancel(id);

    let outcome = h.coordinator.run(id, &refresh());

    assert_eq!(
        outcome,
        Outcome::Failed {
            code: ErrorCode::TransactionCancelled,
            message: "Refresh was cancelled".to_string(),
        }
    );
}

#[test]
fn cancelling_an_unknown_job_does_nothing() {
    let h = Harness::new(engine());
    assert!(!h.coordinator.cancel(JobId(999)));
}

#[test]
fn broken_database_schedules_a_rebuild() {
    init_tracing();
    let mut engine = engine();
    engine
        .init_results
        .push(Err(EngineError::BrokenDatabase("rpmdb".to_string())));
    let h = Harness::new(engine);

    let outcome = h.run(refresh());

    assert_eq!(
        outcome,
        Outcome::Failed {
            code: ErrorCode::FailedInitialization,
            message: "package database is broken: rpmdb".to_string(),
        }
    );
    assert!(h.fs.exists(Path::new(REBUILD_MARKER)));

    // Nothing was initialised, so the next job tries again.
    assert_eq!(h.run(refresh()), Outcome::Success);
}

#[test]
fn successful_recovery_retries_initialisation() {
    init_tracing();
    let mut engine = engine();
    engine
        .init_results
        .push(Err(EngineError::BrokenDatabase("rpmdb".to_string())));
    let mut settings = job_settings();
    settings.recovery_command = Some("true".to_string());
    let h = Harness::with_settings(engine, settings);

    assert_eq!(h.run(refresh()), Outcome::Success);
    assert_eq!(
        h.journal
            .count(|c| matches!(c, EngineCall::InitializeTarget(_))),
        2
    );
}

#[test]
fn failed_recovery_fails_initialisation() {
    let mut engine = engine();
    engine
        .init_results
        .push(Err(EngineError::BrokenDatabase("rpmdb".to_string())));
    let mut settings = job_settings();
    settings.recovery_command = Some("false".to_string());
    let h = Harness::with_settings(engine, settings);

    assert_eq!(
        h.run(refresh()).code(),
        Some(ErrorCode::FailedInitialization)
    );
    assert_eq!(
        h.journal
            .count(|c| matches!(c, EngineCall::InitializeTarget(_))),
        1
    );
}

#[test]
fn locked_database_is_not_recovered() {
    init_tracing();
    let mut engine = engine();
    engine
        .init_results
        .push(Err(EngineError::Locked("held by another process".to_string())));
    let h = Harness::new(engine);

    let outcome = h.run(refresh());

    assert_eq!(
        outcome,
        Outcome::Failed {
            code: ErrorCode::FailedInitialization,
            message: "package database is locked: held by another process".to_string(),
        }
    );
    assert!(!h.fs.exists(Path::new(REBUILD_MARKER)));
}

#[test]
fn install_signature_needs_no_engine() {
    init_tracing();
    let h = Harness::new(engine());

    let outcome = h.run(Request::InstallSignature {
        key_id: "4A8B".to_string(),
    });

    assert_eq!(outcome, Outcome::Success);
    assert!(h.coordinator.signatures().is_accepted("4A8B"));
    assert_eq!(h.sink.statuses(), vec![Status::SigCheck]);
    assert!(h.journal.calls().is_empty());
    assert!(!h.fs.exists(Path::new(REDIRECT)));
}

#[test]
fn switching_cache_roots_reinitialises_the_target() {
    init_tracing();
    let h = Harness::new(engine());

    h.run(refresh());
    h.run(Request::UpgradeSystem {
        distro_id: String::new(),
        kind: pkbridge::types::UpgradeKind::Default,
        flags: TransactionFlags::SIMULATE,
    });
    h.run(refresh());

    assert_eq!(
        h.journal
            .count(|c| matches!(c, EngineCall::InitializeTarget(_))),
        3
    );
}
