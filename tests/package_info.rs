// tests/package_info.rs

mod common;

use common::{init_tracing, package, patch, pattern, repo, FakeEngine, Harness};
use pkbridge::engine::{PackageId, PatchCategory};
use pkbridge::frontend::{FrontendEvent, Outcome};
use pkbridge::ops::Request;
use pkbridge::types::{ErrorCode, Filter, InfoKind, RestartKind};

const HELLO_INSTALLED: &str = "hello;2.10;x86_64;installed";
const HELLO_NEW: &str = "hello;2.12;x86_64;oss";
const HELLO_OLD: &str = "hello;2.11;x86_64;oss";

fn id(text: &str) -> PackageId {
    text.parse().unwrap()
}

fn engine() -> FakeEngine {
    FakeEngine::new()
        .with_installed([
            package("hello", "2.10")
                .installed()
                .details("GPL-3.0-or-later", "Amusements/Toys", "https://www.gnu.org/software/hello")
                .sizes(40_000, 160_000)
                .file("/usr/bin/hello")
                .file("/usr/share/man/man1/hello.1.gz")
                .requires("libc.so.6")
                .build(),
            package("glibc", "2.39")
                .installed()
                .provides("libc.so.6")
                .build(),
            package("cowsay", "3.7")
                .installed()
                .requires("hello")
                .build(),
        ])
        .with_repo(
            repo("oss"),
            [
                package("hello", "2.11").build(),
                package("hello", "2.12")
                    .sizes(52_000, 170_000)
                    .requires("libc.so.6")
                    .requires("info")
                    .build(),
                package("texinfo", "7.1").provides("info").build(),
                package("info", "7.1").build(),
                package("vlc-codecs", "3.0")
                    .summary("codecs for vlc")
                    .provides("gstreamer1(mp3)")
                    .build(),
                patch("sec-1", "1", PatchCategory::Security)
                    .description("Fixes a buffer overflow in hello")
                    .patch_contents(&["hello-2.12.x86_64"])
                    .references(&["https://bugzilla.example.org/1"], &["CVE-2026-0001"])
                    .reboot_suggested()
                    .build(),
                package("hello-ng", "1.0").obsoletes("hello").build(),
                pattern("base", "1").build(),
            ],
        )
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn resolve_reports_every_edition_of_a_name() {
    init_tracing();
    let h = Harness::new(engine());

    let outcome = h.run(Request::Resolve {
        names: names(&["hello"]),
        filter: Filter::None,
        newest: false,
    });

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(
        h.sink.packages(),
        vec![
            (InfoKind::Installed, HELLO_INSTALLED.to_string()),
            (InfoKind::Available, HELLO_OLD.to_string()),
            (InfoKind::Available, HELLO_NEW.to_string()),
        ]
    );
}

#[test]
fn resolve_newest_keeps_installed_and_best() {
    let h = Harness::new(engine());

    h.run(Request::Resolve {
        names: names(&["hello", "base", "nothing"]),
        filter: Filter::None,
        newest: true,
    });

    assert_eq!(
        h.sink.packages(),
        vec![
            (InfoKind::Installed, HELLO_INSTALLED.to_string()),
            (InfoKind::Available, HELLO_NEW.to_string()),
            (InfoKind::Available, "base;1;noarch;oss".to_string()),
        ]
    );
}

#[test]
fn resolve_honours_the_installed_filter() {
    let h = Harness::new(engine());
    h.run(Request::Resolve {
        names: names(&["hello"]),
        filter: Filter::Installed,
        newest: false,
    });
    assert_eq!(
        h.sink.packages(),
        vec![(InfoKind::Installed, HELLO_INSTALLED.to_string())]
    );
}

#[test]
fn details_use_install_size_for_installed_packages() {
    let h = Harness::new(engine());

    let outcome = h.run(Request::GetDetails {
        package_ids: vec![id(HELLO_INSTALLED), id(HELLO_NEW)],
    });

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(
        h.sink.details(),
        vec![
            (HELLO_INSTALLED.to_string(), 160_000),
            (HELLO_NEW.to_string(), 52_000),
        ]
    );
    let first = h
        .sink
        .events()
        .into_iter()
        .find(|e| matches!(e, FrontendEvent::Details { .. }))
        .unwrap();
    assert_eq!(
        first,
        FrontendEvent::Details {
            package_id: HELLO_INSTALLED.to_string(),
            summary: "hello summary".to_string(),
            license: "GPL-3.0-or-later".to_string(),
            group: "Amusements/Toys".to_string(),
            url: "https://www.gnu.org/software/hello".to_string(),
            size: 160_000,
        }
    );
}

#[test]
fn patch_details_add_up_the_shipped_packages() {
    let h = Harness::new(engine());
    h.run(Request::GetDetails {
        package_ids: vec![id("sec-1;1;noarch;oss")],
    });
    assert_eq!(
        h.sink.details(),
        vec![("sec-1;1;noarch;oss".to_string(), 52_000)]
    );
}

#[test]
fn details_of_unknown_package_fail() {
    let h = Harness::new(engine());
    let outcome = h.run(Request::GetDetails {
        package_ids: vec![id("hello;9.9;x86_64;oss")],
    });
    assert_eq!(
        outcome,
        Outcome::Failed {
            code: ErrorCode::PackageNotFound,
            message: "couldn't find package".to_string(),
        }
    );
}

#[test]
fn local_package_ids_get_empty_details() {
    let h = Harness::new(engine());
    h.run(Request::GetDetails {
        package_ids: vec![id("foo;1.0;x86_64;local")],
    });
    assert_eq!(h.sink.details(), vec![("foo;1.0;x86_64;local".to_string(), 0)]);
}

#[test]
fn files_are_listed_for_installed_packages_only() {
    let h = Harness::new(engine());

    h.run(Request::GetFiles {
        package_ids: vec![id(HELLO_INSTALLED), id(HELLO_NEW)],
    });

    let files: Vec<(String, Vec<String>)> = h
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            FrontendEvent::Files { package_id, files } => Some((package_id, files)),
            _ => None,
        })
        .collect();
    assert_eq!(
        files,
        vec![
            (
                HELLO_INSTALLED.to_string(),
                vec![
                    "/usr/bin/hello".to_string(),
                    "/usr/share/man/man1/hello.1.gz".to_string()
                ]
            ),
            (
                HELLO_NEW.to_string(),
                vec!["Only available for installed packages".to_string()]
            ),
        ]
    );
}

#[test]
fn depends_on_picks_one_provider_per_requirement() {
    let h = Harness::new(engine());

    let outcome = h.run(Request::DependsOn {
        package_ids: vec![id(HELLO_NEW)],
        filter: Filter::None,
    });

    assert_eq!(outcome, Outcome::Success);
    // One provider per requirement, ordered by capability; the first
    // available provider of `info` wins over the package named `info`.
    assert_eq!(
        h.sink.packages(),
        vec![
            (InfoKind::Available, "texinfo;7.1;x86_64;oss".to_string()),
            (InfoKind::Installed, "glibc;2.39;x86_64;installed".to_string()),
        ]
    );
}

#[test]
fn depends_on_unknown_package_is_a_resolution_failure() {
    let h = Harness::new(engine());
    let outcome = h.run(Request::DependsOn {
        package_ids: vec![id("ghost;1;x86_64;oss")],
        filter: Filter::None,
    });
    assert_eq!(
        outcome,
        Outcome::Failed {
            code: ErrorCode::DepResolutionFailed,
            message: "Did not find the specified package.".to_string(),
        }
    );
}

#[test]
fn required_by_lists_what_would_go_with_it() {
    let h = Harness::new(engine());

    let outcome = h.run(Request::RequiredBy {
        package_ids: vec![id(HELLO_INSTALLED)],
        filter: Filter::None,
    });

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(
        h.sink.packages(),
        vec![(InfoKind::Removing, "cowsay;3.7;x86_64;installed".to_string())]
    );

    // The pool and the resolver are left as they were.
    let again = h.run(Request::Install {
        package_ids: vec![id("texinfo;7.1;x86_64;oss")],
        flags: pkbridge::types::TransactionFlags::SIMULATE,
    });
    assert_eq!(again, Outcome::Success);
    assert!(!h
        .sink
        .packages()
        .iter()
        .any(|(info, pkg)| *info == InfoKind::Removing && pkg.starts_with("hello;")));
}

#[test]
fn required_by_skips_packages_that_are_not_installed() {
    let h = Harness::new(engine());
    let outcome = h.run(Request::RequiredBy {
        package_ids: vec![id(HELLO_NEW)],
        filter: Filter::None,
    });
    assert_eq!(outcome, Outcome::Success);
    assert!(h.sink.packages().is_empty());
}

#[test]
fn required_by_unknown_package_fails() {
    let h = Harness::new(engine());
    let outcome = h.run(Request::RequiredBy {
        package_ids: vec![id("ghost;1;x86_64;installed")],
        filter: Filter::None,
    });
    assert_eq!(outcome.code(), Some(ErrorCode::PackageNotFound));
}

#[test]
fn what_provides_searches_capability_namespaces() {
    let h = Harness::new(engine());

    let outcome = h.run(Request::WhatProvides {
        terms: names(&["mp3"]),
        filter: Filter::None,
    });

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(
        h.sink.packages(),
        vec![(InfoKind::Available, "vlc-codecs;3.0;x86_64;oss".to_string())]
    );
}

#[test]
fn what_provides_plain_capability() {
    let h = Harness::new(engine());
    h.run(Request::WhatProvides {
        terms: names(&["libc.so.6"]),
        filter: Filter::Installed,
    });
    assert_eq!(
        h.sink.packages(),
        vec![(InfoKind::Installed, "glibc;2.39;x86_64;installed".to_string())]
    );
}

#[test]
fn get_packages_lists_packages_and_patterns_but_not_patches() {
    let h = Harness::new(engine());

    h.run(Request::GetPackages {
        filter: Filter::NotInstalled,
    });

    let found = h.sink.packages();
    assert!(found.contains(&(InfoKind::Available, "base;1;noarch;oss".to_string())));
    assert!(found.contains(&(InfoKind::Available, HELLO_NEW.to_string())));
    assert!(found.iter().all(|(info, _)| *info == InfoKind::Available));
    assert!(!found.iter().any(|(_, pkg)| pkg.starts_with("sec-1;")));
}

#[test]
fn update_detail_of_a_patch_carries_its_references() {
    let h = Harness::new(engine());

    let outcome = h.run(Request::GetUpdateDetail {
        package_ids: vec![id("sec-1;1;noarch;oss")],
    });

    assert_eq!(outcome, Outcome::Success);
    let detail = h
        .sink
        .events()
        .into_iter()
        .find(|e| matches!(e, FrontendEvent::UpdateDetail { .. }))
        .unwrap();
    assert_eq!(
        detail,
        FrontendEvent::UpdateDetail {
            package_id: "sec-1;1;noarch;oss".to_string(),
            obsoletes: Vec::new(),
            bugzilla: vec!["https://bugzilla.example.org/1".to_string()],
            cve: vec!["CVE-2026-0001".to_string()],
            restart: RestartKind::System,
            update_text: "Fixes a buffer overflow in hello".to_string(),
        }
    );
}

#[test]
fn update_detail_lists_obsoleted_packages() {
    let h = Harness::new(engine());

    h.run(Request::GetUpdateDetail {
        package_ids: vec![id("hello-ng;1.0;x86_64;oss")],
    });

    let obsoletes = h
        .sink
        .events()
        .into_iter()
        .find_map(|e| match e {
            FrontendEvent::UpdateDetail { obsoletes, restart, .. } => {
                assert_eq!(restart, RestartKind::None);
                Some(obsoletes)
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(
        obsoletes,
        vec![
            HELLO_INSTALLED.to_string(),
            HELLO_OLD.to_string(),
            HELLO_NEW.to_string(),
        ]
    );
}
