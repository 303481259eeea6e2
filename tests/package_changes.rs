mod common;

use common::{init_tracing, package, patch, repo, FakeEngine, Harness};
use pkbridge::engine::{PackageId, PatchCategory};
use pkbridge::frontend::{FrontendEvent, Outcome};
use pkbridge::ops::packages::{version_relation, VersionRelation};
use pkbridge::ops::Request;
use pkbridge::types::{ErrorCode, Percentage, RestartKind, TransactionFlags};

fn oss(name: &str, version: &str) -> PackageId {
    PackageId::new(name, version, "x86_64", "oss")
}

fn installed(name: &str, version: &str) -> PackageId {
    PackageId::new(name, version, "x86_64", "installed")
}

fn engine(installed_version: &str, available: &[&str]) -> FakeEngine {
    FakeEngine::new()
        .with_installed([package("hello", installed_version).installed().build()])
        .with_repo(
            repo("oss"),
            available.iter().map(|v| package("hello", v).build()),
        )
}

fn install(id: PackageId, flags: TransactionFlags) -> Request {
    Request::Install {
        package_ids: vec![id],
        flags,
    }
}

fn update(id: PackageId) -> Request {
    Request::Update {
        package_ids: vec![id],
        flags: TransactionFlags::NONE,
    }
}

fn failed(code: ErrorCode, message: &str) -> Outcome {
    Outcome::Failed {
        code,
        message: message.to_string(),
    }
}

#[test]
fn installing_the_installed_edition_does_nothing() {
    init_tracing();
    let h = Harness::new(engine("2.12", &["2.12"]));

    let outcome = h.run(install(oss("hello", "2.12"), TransactionFlags::NONE));

    assert_eq!(
        outcome,
        failed(
            ErrorCode::AllPackagesAlreadyInstalled,
            "The packages are already all installed"
        )
    );
    assert!(h.journal.commits().is_empty());
}

#[test]
fn reinstall_is_allowed_on_request() {
    let h = Harness::new(engine("2.12", &["2.12"]));
    let outcome = h.run(install(oss("hello", "2.12"), TransactionFlags::ALLOW_REINSTALL));
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(h.journal.commits().len(), 1);
}

#[test]
fn downgrade_needs_the_downgrade_flag() {
    init_tracing();
    let h = Harness::new(engine("2.12", &["2.10"]));

    let outcome = h.run(install(oss("hello", "2.10"), TransactionFlags::NONE));
    assert_eq!(
        outcome,
        failed(
            ErrorCode::PackageAlreadyInstalled,
            "higher version \"2.12\" of package hello.x86_64 is already installed"
        )
    );

    let outcome = h.run(install(oss("hello", "2.10"), TransactionFlags::ALLOW_DOWNGRADE));
    assert_eq!(outcome, Outcome::Success);
}

#[test]
fn just_reinstall_refuses_version_changes() {
    let h = Harness::new(engine("2.10", &["2.12"]));

    let outcome = h.run(install(oss("hello", "2.12"), TransactionFlags::JUST_REINSTALL));

    assert_eq!(
        outcome,
        failed(
            ErrorCode::NotAuthorized,
            "missing authorization to update or downgrade software"
        )
    );
}

#[test]
fn unknown_package_id_is_not_found() {
    let h = Harness::new(engine("2.10", &["2.12"]));

    let outcome = h.run(install(oss("nano", "8.0"), TransactionFlags::NONE));

    assert_eq!(
        outcome,
        failed(ErrorCode::PackageNotFound, "couldn't find package")
    );
}

#[test]
fn failed_install_leaves_no_marks_behind() {
    let h = Harness::new(engine("2.10", &["2.12"]).with_problems(["hello-2.12 conflicts"]));
    h.run(install(oss("hello", "2.12"), TransactionFlags::NONE));
    assert!(!h.coordinator.with_engine(|e| e.pool().has_pending()));
}

#[test]
fn update_installs_the_best_candidate() {
    init_tracing();
    let h = Harness::new(engine("2.10", &["2.11", "2.12"]));

    let outcome = h.run(update(installed("hello", "2.10")));

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(h.journal.commits().len(), 1);
    let installing: Vec<String> = h
        .sink
        .packages()
        .into_iter()
        .filter(|(info, _)| *info == pkbridge::types::InfoKind::Installing)
        .map(|(_, id)| id)
        .collect();
    assert_eq!(installing, vec![oss("hello", "2.12").to_string()]);
}

#[test]
fn update_of_a_package_that_is_not_installed_fails() {
    let engine = engine("2.10", &["2.12"])
        .with_repo(repo("extra"), [package("vim", "9.1").repo("extra").build()]);
    let h = Harness::new(engine);
    let vim = PackageId::new("vim", "9.1", "x86_64", "extra");

    let outcome = h.run(update(vim.clone()));

    assert_eq!(
        outcome,
        failed(
            ErrorCode::DepResolutionFailed,
            &format!("Package {vim} is not installed")
        )
    );
}

#[test]
fn update_without_candidate_fails() {
    let h = Harness::new(engine("2.12", &["2.12"]));

    let outcome = h.run(update(installed("hello", "2.12")));

    assert_eq!(
        outcome,
        failed(
            ErrorCode::DepResolutionFailed,
            "There is no update candidate for hello-2.12.x86_64"
        )
    );
}

#[test]
fn patch_update_announces_its_restart() {
    init_tracing();
    let fix = patch("kernel-fix", "3", PatchCategory::Security)
        .repo("updates")
        .patch_contents(&["hello-2.12.x86_64"])
        .reboot_suggested()
        .build();
    let fix_id = fix.id.clone();
    let h = Harness::new(engine("2.10", &[]).with_repo(repo("updates"), [fix]));

    let outcome = h.run(update(fix_id.clone()));

    assert_eq!(outcome, Outcome::Success);
    assert!(h.sink.events().contains(&FrontendEvent::RequireRestart {
        restart: RestartKind::System,
        package_id: fix_id.to_string(),
    }));
    assert_eq!(h.journal.commits().len(), 1);
}

#[test]
fn version_relation_against_installed_editions() {
    let engine = FakeEngine::new().with_installed([
        package("kernel", "6.4").installed().build(),
        package("kernel", "6.6").installed().build(),
    ]);
    let pool = &engine.pool;

    assert_eq!(
        version_relation(pool, &oss("kernel", "6.8")),
        (VersionRelation::Newer, 2)
    );
    assert_eq!(
        version_relation(pool, &oss("kernel", "6.6")),
        (VersionRelation::Equal, 2)
    );
    assert_eq!(
        version_relation(pool, &oss("kernel", "6.1")),
        (
            VersionRelation::Older {
                installed: "6.6".to_string()
            },
            2
        )
    );
    assert_eq!(
        version_relation(pool, &oss("hello", "1")),
        (VersionRelation::Newer, 0)
    );
}

#[test]
fn job_percentages_never_drop_without_invalid() {
    init_tracing();
    let engine = FakeEngine::new().with_repo(
        repo("oss"),
        [
            package("a", "1").build(),
            package("b", "1").build(),
            package("c", "1").build(),
        ],
    );
    let h = Harness::new(engine);

    let outcome = h.run(Request::Install {
        package_ids: vec![oss("a", "1"), oss("b", "1"), oss("c", "1")],
        flags: TransactionFlags::NONE,
    });

    assert_eq!(outcome, Outcome::Success);
    let emitted = h.sink.percentages();
    assert!(emitted.contains(&Percentage::Invalid));
    let mut last: Option<u8> = None;
    for (i, pct) in emitted.iter().enumerate() {
        match pct {
            Percentage::Invalid => last = None,
            Percentage::Value(v) => {
                if let Some(prev) = last {
                    assert!(*v >= prev, "{prev} -> {v} at {i} in {emitted:?}");
                }
                last = Some(*v);
            }
        }
    }
}
