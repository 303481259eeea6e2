mod common;

use common::harness::{ENGINE_ROOT, REGULAR};
use common::{init_tracing, package, repo, FakeEngine, Harness};
use pkbridge::engine::{DownloadMode, PackageId};
use pkbridge::frontend::{FrontendEvent, Outcome};
use pkbridge::ops::Request;
use pkbridge::types::{ErrorCode, InfoKind, Percentage, TransactionFlags};

fn oss(name: &str, version: &str) -> PackageId {
    PackageId::new(name, version, "x86_64", "oss")
}

fn installed(name: &str, version: &str) -> PackageId {
    PackageId::new(name, version, "x86_64", "installed")
}

fn engine() -> FakeEngine {
    FakeEngine::new()
        .with_installed([
            package("hello", "2.10").installed().sizes(0, 1000).build(),
            package("glibc", "2.38").installed().build(),
        ])
        .with_repo(
            repo("oss"),
            [
                package("hello", "2.12").sizes(400, 1200).build(),
                package("vim", "9.1").sizes(2000, 8000).build(),
            ],
        )
}

fn install(ids: &[PackageId], flags: TransactionFlags) -> Request {
    Request::Install {
        package_ids: ids.to_vec(),
        flags,
    }
}

fn failed(code: ErrorCode, message: &str) -> Outcome {
    Outcome::Failed {
        code,
        message: message.to_string(),
    }
}

#[test]
fn install_commits_and_ends_at_100() {
    init_tracing();
    let h = Harness::new(engine());

    let outcome = h.run(install(&[oss("vim", "9.1")], TransactionFlags::NONE));

    assert_eq!(outcome, Outcome::Success);
    let commits = h.journal.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].download_mode, DownloadMode::InHeaps);
    assert!(commits[0].sync_pool_after_commit);
    assert!(!commits[0].verify_signatures);

    let vim = oss("vim", "9.1").to_string();
    let packages = h.sink.packages();
    assert!(packages.contains(&(InfoKind::Downloading, vim.clone())));
    assert!(packages.contains(&(InfoKind::Installing, vim)));
    assert_eq!(h.sink.percentages().last(), Some(&Percentage::Value(100)));

    let events = h.sink.events();
    assert_eq!(events.first(), Some(&FrontendEvent::Locked(true)));
    assert_eq!(events.last(), Some(&FrontendEvent::Finished(Outcome::Success)));
    assert!(!h.coordinator.with_engine(|e| e.pool().has_pending()));
    let resolver = h.coordinator.with_engine(|e| e.resolver().clone());
    assert!(!resolver.ignore_already_recommended);
}

#[test]
fn only_trusted_asks_the_engine_to_verify_signatures() {
    let h = Harness::new(engine());
    h.run(install(&[oss("vim", "9.1")], TransactionFlags::ONLY_TRUSTED));
    assert!(h.journal.commits()[0].verify_signatures);
}

#[test]
fn simulate_reports_the_plan_and_changes_nothing() {
    init_tracing();
    let h = Harness::new(engine());

    let outcome = h.run(install(&[oss("hello", "2.12")], TransactionFlags::SIMULATE));

    assert_eq!(outcome, Outcome::Success);
    assert!(h.journal.commits().is_empty());
    // The replaced edition is not reported separately.
    assert_eq!(
        h.sink.packages(),
        vec![(InfoKind::Installing, oss("hello", "2.12").to_string())]
    );
    assert!(!h.coordinator.with_engine(|e| e.pool().has_pending()));
}

#[test]
fn size_query_reports_the_four_sizes() {
    init_tracing();
    let h = Harness::new(engine());

    let outcome = h.run(install(
        &[oss("hello", "2.12")],
        TransactionFlags::SIMULATE | TransactionFlags::EXT_DOWNLOAD_SIZE,
    ));

    assert_eq!(outcome, Outcome::Success);
    assert!(h.journal.commits().is_empty());
    assert_eq!(
        h.sink.details(),
        vec![
            ("::DOWNLOAD".to_string(), 400),
            ("::INSTALL".to_string(), 1200),
            ("::REMOVE".to_string(), 1000),
            ("::CACHED".to_string(), 0),
        ]
    );
}

#[test]
fn cached_payloads_are_reported_separately() {
    let engine = FakeEngine::new().with_repo(
        repo("oss"),
        [package("vim", "9.1").sizes(2000, 8000).cached().build()],
    );
    let h = Harness::new(engine);

    h.run(install(
        &[oss("vim", "9.1")],
        TransactionFlags::SIMULATE | TransactionFlags::EXT_DOWNLOAD_SIZE,
    ));

    assert!(h.sink.details().contains(&("::DOWNLOAD".to_string(), 0)));
    assert!(h.sink.details().contains(&("::CACHED".to_string(), 2000)));
}

#[test]
fn missing_install_space_fails_before_commit() {
    init_tracing();
    let h = Harness::new(engine().with_free_space(ENGINE_ROOT, 100));

    let outcome = h.run(install(&[oss("vim", "9.1")], TransactionFlags::NONE));

    assert_eq!(
        outcome,
        failed(
            ErrorCode::NoSpaceOnDevice,
            "Not enough space for installation. Need 0.01 MiB, have 0.00 MiB."
        )
    );
    assert!(h.journal.commits().is_empty());
}

#[test]
fn missing_download_space_only_warns() {
    init_tracing();
    let h = Harness::new(engine().with_free_space(REGULAR, 10));

    let outcome = h.run(install(&[oss("vim", "9.1")], TransactionFlags::NONE));

    assert_eq!(outcome, Outcome::Success);
    let warnings = h.sink.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].0, ErrorCode::NoSpaceOnDevice);
    assert!(warnings[0].1.starts_with("Not enough space for download."));
    assert_eq!(h.journal.commits().len(), 1);
}

#[test]
fn unreadable_free_space_counts_as_full() {
    let mut engine = engine();
    engine.free_space_error = true;
    let h = Harness::new(engine);

    let outcome = h.run(install(&[oss("vim", "9.1")], TransactionFlags::NONE));

    assert_eq!(outcome.code(), Some(ErrorCode::NoSpaceOnDevice));
}

#[test]
fn license_must_be_accepted_before_installing() {
    init_tracing();
    let engine = FakeEngine::new().with_repo(
        repo("oss"),
        [package("vim", "9.1")
            .eula("Vim Foundation", "Charityware")
            .build()],
    );
    let h = Harness::new(engine);
    let request = install(&[oss("vim", "9.1")], TransactionFlags::NONE);

    let outcome = h.run(request.clone());

    assert_eq!(
        outcome,
        failed(
            ErrorCode::NoLicenseAgreement,
            "You've to agree/decline a license"
        )
    );
    assert!(h.sink.events().contains(&FrontendEvent::EulaRequired {
        eula_id: "vim".to_string(),
        package_id: oss("vim", "9.1").to_string(),
        vendor: "Vim Foundation".to_string(),
        license: "Charityware".to_string(),
    }));
    assert!(h.journal.commits().is_empty());

    h.coordinator.eulas().accept("vim");
    assert_eq!(h.run(request), Outcome::Success);
    assert_eq!(h.journal.commits().len(), 1);
}

#[test]
fn unsatisfiable_plan_lists_every_problem() {
    init_tracing();
    let h = Harness::new(engine().with_problems([
        "nothing provides 'libfoo' needed by vim-9.1.x86_64",
        "vim-9.1.x86_64 conflicts with ed-1.0.x86_64",
    ]));

    let outcome = h.run(install(&[oss("vim", "9.1")], TransactionFlags::NONE));

    assert_eq!(
        outcome,
        failed(
            ErrorCode::DepResolutionFailed,
            "nothing provides 'libfoo' needed by vim-9.1.x86_64\nvim-9.1.x86_64 conflicts with ed-1.0.x86_64"
        )
    );
    assert!(!h.coordinator.with_engine(|e| e.pool().has_pending()));
}

#[test]
fn steps_left_undone_fail_the_transaction() {
    init_tracing();
    let mut engine = engine();
    engine.failing_steps.insert(oss("vim", "9.1"));
    let h = Harness::new(engine);

    let outcome = h.run(install(&[oss("vim", "9.1")], TransactionFlags::NONE));

    assert_eq!(
        outcome,
        failed(
            ErrorCode::TransactionError,
            "Transaction could not be completed.\n These packages could not be installed: vim-9.1.x86_64"
        )
    );
}

#[test]
fn download_only_commits_in_download_mode() {
    init_tracing();
    let h = Harness::new(engine());

    let outcome = h.run(Request::Download {
        package_ids: vec![oss("vim", "9.1")],
    });

    assert_eq!(outcome, Outcome::Success);
    let commits = h.journal.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].download_mode, DownloadMode::Only);
    assert!(h
        .sink
        .packages()
        .contains(&(InfoKind::Downloading, oss("vim", "9.1").to_string())));
    assert!(!h
        .sink
        .packages()
        .iter()
        .any(|(info, _)| *info == InfoKind::Installing));
}

#[test]
fn simulated_removal_of_a_protected_package_is_refused() {
    init_tracing();
    let h = Harness::new(engine());

    let outcome = h.run(Request::Remove {
        package_ids: vec![installed("glibc", "2.38")],
        flags: TransactionFlags::SIMULATE,
        allow_deps: false,
        autoremove: false,
    });

    assert_eq!(
        outcome,
        failed(
            ErrorCode::CannotRemoveSystemPackage,
            "The package glibc is essential to correct operation and cannot be removed using this tool."
        )
    );
    assert!(h.journal.commits().is_empty());
}

#[test]
fn removal_commits_and_clears_resolver_overrides() {
    init_tracing();
    let h = Harness::new(engine());
    let hello = installed("hello", "2.10");

    let outcome = h.run(Request::Remove {
        package_ids: vec![hello.clone()],
        flags: TransactionFlags::NONE,
        allow_deps: true,
        autoremove: true,
    });

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(
        h.sink.packages(),
        vec![
            (InfoKind::Removing, hello.to_string()),
            (InfoKind::Finished, hello.to_string()),
        ]
    );
    let resolver = h.coordinator.with_engine(|e| e.resolver().clone());
    assert!(!resolver.force_resolve);
    assert!(!resolver.ignore_already_recommended);
    assert!(!resolver.cleandeps_on_remove);
}

#[test]
fn failed_removal_keeps_the_first_error() {
    let h = Harness::new(engine().with_problems(["glibc-2.38.x86_64 is required"]));

    let outcome = h.run(Request::Remove {
        package_ids: vec![installed("hello", "2.10")],
        flags: TransactionFlags::NONE,
        allow_deps: false,
        autoremove: false,
    });

    assert_eq!(
        outcome,
        failed(ErrorCode::DepResolutionFailed, "glibc-2.38.x86_64 is required")
    );
}
