// tests/repository_setup.rs

mod common;

use common::{init_tracing, package, repo, EngineCall, FakeEngine, Harness};
use pkbridge::engine::EngineError;
use pkbridge::frontend::Outcome;
use pkbridge::ops::Request;
use pkbridge::types::{ErrorCode, Filter, InfoKind};

fn engine() -> FakeEngine {
    let mut debug = repo("oss-debuginfo");
    debug.enabled = false;
    FakeEngine::new()
        .with_repo(repo("oss"), [package("hello", "2.12").build()])
        .with_repo(repo("update"), [package("vim", "9.1").repo("update").build()])
        .with_repo(debug, [])
}

fn set_data(alias: &str, parameter: &str, value: &str) -> Request {
    Request::RepoSetData {
        alias: alias.to_string(),
        parameter: parameter.to_string(),
        value: value.to_string(),
    }
}

fn list(h: &Harness) -> Vec<(String, String, bool)> {
    h.sink.clear();
    assert_eq!(
        h.run(Request::GetRepoList {
            hide_development: false
        }),
        Outcome::Success
    );
    h.sink.repos()
}

#[test]
fn repo_list_reports_every_repository() {
    init_tracing();
    let h = Harness::new(engine());

    assert_eq!(
        list(&h),
        vec![
            ("oss".to_string(), "oss repository".to_string(), true),
            ("update".to_string(), "update repository".to_string(), true),
            (
                "oss-debuginfo".to_string(),
                "oss-debuginfo repository".to_string(),
                false
            ),
        ]
    );
}

#[test]
fn repo_list_can_hide_development_repositories() {
    let h = Harness::new(engine());

    h.run(Request::GetRepoList {
        hide_development: true,
    });

    let aliases: Vec<String> = h.sink.repos().into_iter().map(|(a, _, _)| a).collect();
    assert_eq!(aliases, vec!["oss".to_string(), "update".to_string()]);
}

#[test]
fn disabling_a_repository_drops_its_packages() {
    let h = Harness::new(engine());
    h.run(Request::GetPackages {
        filter: Filter::None,
    });
    assert!(h
        .sink
        .packages()
        .contains(&(InfoKind::Available, "vim;9.1;x86_64;update".to_string())));

    let outcome = h.run(Request::RepoEnable {
        alias: "update".to_string(),
        enabled: false,
    });

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(
        h.journal.count(|c| matches!(c, EngineCall::ModifyRepo(a) if a == "update")),
        1
    );
    assert_eq!(
        h.journal.count(|c| matches!(c, EngineCall::CleanCache(a) if a == "update")),
        1
    );
    assert!(list(&h).contains(&("update".to_string(), "update repository".to_string(), false)));

    h.sink.clear();
    h.run(Request::GetPackages {
        filter: Filter::None,
    });
    assert!(!h
        .sink
        .packages()
        .iter()
        .any(|(_, pkg)| pkg.ends_with(";update")));
}

#[test]
fn enabling_keeps_the_cache() {
    let h = Harness::new(engine());

    let outcome = h.run(Request::RepoEnable {
        alias: "oss-debuginfo".to_string(),
        enabled: true,
    });

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(h.journal.count(|c| matches!(c, EngineCall::CleanCache(_))), 0);
    assert!(list(&h).contains(&(
        "oss-debuginfo".to_string(),
        "oss-debuginfo repository".to_string(),
        true
    )));
}

#[test]
fn enabling_an_unknown_repository_fails() {
    let h = Harness::new(engine());
    let outcome = h.run(Request::RepoEnable {
        alias: "nope".to_string(),
        enabled: true,
    });
    assert_eq!(
        outcome,
        Outcome::Failed {
            code: ErrorCode::RepoNotFound,
            message: "Couldn't find the specified repository".to_string(),
        }
    );
}

#[test]
fn repository_without_url_is_a_configuration_error() {
    let mut broken = repo("broken");
    broken.baseurl = String::new();
    let h = Harness::new(FakeEngine::new().with_repo(broken, []));

    let outcome = h.run(Request::RepoEnable {
        alias: "broken".to_string(),
        enabled: false,
    });

    assert_eq!(
        outcome,
        Outcome::Failed {
            code: ErrorCode::RepoConfiguration,
            message: "broken: Repository has no or invalid url defined.".to_string(),
        }
    );
}

#[test]
fn set_data_adds_and_removes_repositories() {
    let h = Harness::new(engine());

    assert_eq!(
        h.run(set_data("extra", "add", "file:///srv/repos/extra")),
        Outcome::Success
    );
    assert!(list(&h).contains(&("extra".to_string(), "extra".to_string(), true)));

    assert_eq!(h.run(set_data("extra", "ADD", "file:///elsewhere")), Outcome::Failed {
        code: ErrorCode::InternalError,
        message: "This repo already exists".to_string(),
    });

    assert_eq!(h.run(set_data("update", "remove", "")), Outcome::Success);
    assert_eq!(h.journal.count(|c| matches!(c, EngineCall::AddRepo(_))), 2);
    assert_eq!(
        h.journal.count(|c| matches!(c, EngineCall::RemoveRepo(a) if a == "update")),
        1
    );
    let aliases: Vec<String> = list(&h).into_iter().map(|(a, _, _)| a).collect();
    assert_eq!(
        aliases,
        vec!["oss".to_string(), "oss-debuginfo".to_string(), "extra".to_string()]
    );
}

#[test]
fn set_data_changes_single_properties() {
    let h = Harness::new(engine());

    assert_eq!(h.run(set_data("oss", "name", "Main Repository")), Outcome::Success);
    assert_eq!(h.run(set_data("oss", "refresh", "false")), Outcome::Success);
    assert_eq!(h.run(set_data("oss", "prio", "20")), Outcome::Success);
    assert_eq!(h.run(set_data("oss", "keep", "TRUE")), Outcome::Success);

    assert!(list(&h).contains(&("oss".to_string(), "Main Repository".to_string(), true)));
    assert_eq!(
        h.journal.count(|c| matches!(c, EngineCall::ModifyRepo(a) if a == "oss")),
        4
    );
}

#[test]
fn set_data_rejects_bad_values() {
    let h = Harness::new(engine());

    assert_eq!(
        h.run(set_data("oss", "refresh", "maybe")),
        Outcome::Failed {
            code: ErrorCode::NotSupported,
            message: "Autorefresh a repo: Enter true or false".to_string(),
        }
    );
    assert_eq!(
        h.run(set_data("oss", "prio", "100")).code(),
        Some(ErrorCode::NotSupported)
    );
    assert_eq!(
        h.run(set_data("oss", "colour", "blue")),
        Outcome::Failed {
            code: ErrorCode::NotSupported,
            message: "Valid parameters for set_repo_data are remove/add/refresh/prio/keep/url/name/refresh-now".to_string(),
        }
    );
    assert_eq!(
        h.run(set_data("ghost", "name", "x")).code(),
        Some(ErrorCode::RepoNotFound)
    );
    assert_eq!(h.journal.count(|c| matches!(c, EngineCall::ModifyRepo(_))), 0);
}

#[test]
fn refresh_now_refreshes_one_repository() {
    let h = Harness::new(engine());

    let outcome = h.run(set_data("update", "refresh-now", "true"));

    assert_eq!(outcome, Outcome::Success);
    let refreshed: Vec<EngineCall> = h
        .journal
        .calls()
        .into_iter()
        .filter(|c| matches!(c, EngineCall::RefreshMetadata { .. }))
        .collect();
    assert_eq!(
        refreshed,
        vec![EngineCall::RefreshMetadata {
            alias: "update".to_string(),
            force: true,
        }]
    );
}

#[test]
fn refresh_now_failure_is_reported() {
    let mut engine = engine();
    engine.refresh_errors.insert(
        "update".to_string(),
        EngineError::Media("cannot reach remote repository url".to_string()),
    );
    let h = Harness::new(engine);

    let outcome = h.run(set_data("update", "refresh-now", "false"));

    assert_eq!(outcome.code(), Some(ErrorCode::RepoNotAvailable));
}
