//! End-to-end pipeline tests against the mock engine and a file registry.

use exechub_core::{BuildOptions, FailureReason, HubConfig, HubError, HubIO};
use exechub_remote::{CatalogQuery, FileRegistry, RegistryBackend, RetryPolicy, StaticToken};
use exechub_runtime::{ContainerEngine, MockEngine, MockFailure};
use exechub_schema::ImageTag;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::time::Duration;

const GOOD_RECIPE: &str = "\
FROM python:3.11-slim
WORKDIR /app
COPY . /app
ENTRYPOINT [\"python\", \"-m\", \"mwu\"]
";

fn manifest(name: &str, version: &str) -> String {
    format!(
        "name: {name}\nversion: {version}\ndescription: a toy executor\nauthor: dev\nvendor: acme\nkind: pod\ntype: crafter\nkeywords: [toy, nlp]\n"
    )
}

struct Env {
    tmp: tempfile::TempDir,
    engine: Arc<MockEngine>,
    registry: Arc<FileRegistry>,
}

impl Env {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Arc::new(FileRegistry::open(tmp.path().join("registry")).unwrap());
        Self {
            tmp,
            engine: Arc::new(MockEngine::new()),
            registry,
        }
    }

    fn config(&self) -> HubConfig {
        let mut config = HubConfig {
            lock_dir: Some(self.tmp.path().join("locks")),
            retry: RetryPolicy::none(),
            ..HubConfig::default()
        };
        config.usage.daemon_grace_secs = 1;
        config.usage.poll_interval_ms = 1;
        config
    }

    fn hub(&self) -> HubIO {
        HubIO::new(
            self.config(),
            self.engine.clone(),
            self.registry.clone(),
            Arc::new(StaticToken::new(None)),
        )
    }

    fn artifact(&self, dir_name: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = self.tmp.path().join(dir_name);
        for (name, content) in files {
            let path = dir.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn good(&self, dir_name: &str, version: &str) -> PathBuf {
        self.artifact(
            dir_name,
            &[
                ("Dockerfile", GOOD_RECIPE),
                ("manifest.yml", &manifest("hub-mwu", version)),
                ("mwu.py", "print('ready')\n"),
            ],
        )
    }
}

fn push() -> BuildOptions {
    BuildOptions {
        push: true,
        ..BuildOptions::default()
    }
}

fn tested(daemon: bool) -> BuildOptions {
    BuildOptions {
        test_uses: true,
        daemon,
        timeout_ready: Some(Duration::from_millis(200)),
        ..BuildOptions::default()
    }
}

#[test]
fn good_build_round_trips_manifest() {
    let env = Env::new();
    let dir = env.good("hub-mwu", "0.0.1");
    let summary = env.hub().build(&dir, &BuildOptions::default()).unwrap();

    assert!(summary.is_build_success, "{:?}", summary.details);
    assert_eq!(summary.version, "0.0.1");
    let source =
        exechub_schema::parse_manifest_file(dir.join("manifest.yml")).unwrap();
    assert_eq!(summary.manifest_info, Some(source));
    assert!(summary.failure_reason.is_none());
}

#[test]
fn rebuild_is_idempotent_in_both_modes() {
    let env = Env::new();
    let dir = env.good("hub-mwu", "0.0.1");
    let hub = env.hub();
    for daemon in [false, true] {
        for _ in 0..2 {
            let summary = hub.build(&dir, &tested(daemon)).unwrap();
            assert!(summary.is_build_success, "{:?}", summary.details);
            assert_eq!(summary.is_test_success, Some(true));
        }
    }
    assert_eq!(env.engine.build_count(), 4);
    assert_eq!(env.engine.live_containers(), 0);
    assert!(env.registry.search(&CatalogQuery::default()).unwrap().is_empty());
}

#[test]
fn double_push_leaves_one_entry() {
    let env = Env::new();
    let dir = env.good("hub-mwu", "0.0.1");
    let hub = env.hub();
    for _ in 0..2 {
        let summary = hub.build(&dir, &push()).unwrap();
        assert!(summary.is_build_success, "{:?}", summary.details);
        assert_eq!(summary.is_push_success, Some(true));
    }

    let listed = hub.list(&CatalogQuery::by_name("hub-mwu")).unwrap();
    assert_eq!(listed.len(), 1);
    let entry = &listed[0];
    assert_eq!(entry.manifest.name, "hub-mwu");
    assert_eq!(entry.manifest.keywords, vec!["toy", "nlp"]);
    assert_eq!(entry.manifest.executor_type, "crafter");
}

#[test]
fn no_overwrite_against_existing_identity_fails() {
    let env = Env::new();
    let dir = env.good("hub-mwu", "0.0.1");
    let hub = env.hub();
    hub.build(&dir, &push()).unwrap();
    let before = hub.list(&CatalogQuery::by_name("hub-mwu")).unwrap();

    let opts = BuildOptions {
        no_overwrite: true,
        ..push()
    };
    let summary = hub.build(&dir, &opts).unwrap();
    assert!(!summary.is_build_success);
    assert_eq!(summary.is_push_success, Some(false));
    assert_eq!(
        summary.failure_reason,
        Some(FailureReason::ImageAlreadyExists)
    );
    assert_eq!(hub.list(&CatalogQuery::by_name("hub-mwu")).unwrap(), before);

    let raising = BuildOptions {
        raise_error: true,
        ..opts
    };
    assert!(matches!(
        hub.build(&dir, &raising),
        Err(HubError::ImageAlreadyExists(_))
    ));
}

#[test]
fn invalid_fixtures_report_their_reason() {
    let env = Env::new();
    let good_manifest = manifest("broken", "0.1.0");
    let cases = [
        (
            env.artifact(
                "missing-dockerfile",
                &[("manifest.yml", &good_manifest), ("mwu.py", "")],
            ),
            FailureReason::DockerfileMissing,
        ),
        (
            env.artifact(
                "bad-dockerfile",
                &[
                    ("Dockerfile", "FROM python:3.11\nCOPY nope.txt /app/\n"),
                    ("manifest.yml", &good_manifest),
                    ("mwu.py", ""),
                ],
            ),
            FailureReason::DockerfileInvalid,
        ),
        (
            env.artifact(
                "bad-dockerfile-syntax",
                &[
                    ("Dockerfile", "FORM python:3.11\n"),
                    ("manifest.yml", &good_manifest),
                ],
            ),
            FailureReason::DockerfileInvalid,
        ),
        (
            env.artifact(
                "missing-manifest",
                &[("Dockerfile", GOOD_RECIPE), ("mwu.py", "")],
            ),
            FailureReason::ManifestMissing,
        ),
        (
            env.artifact(
                "bad-manifest",
                &[
                    ("Dockerfile", GOOD_RECIPE),
                    ("manifest.yml", "name: broken\nversion: not-semver\n"),
                    ("mwu.py", ""),
                ],
            ),
            FailureReason::ManifestInvalid,
        ),
        (
            env.artifact(
                "bad-pythonfile",
                &[
                    (
                        "Dockerfile",
                        "FROM python:3.11\nCOPY . /app\n# byte-compile fails on the broken module\nRUN exit 1\n",
                    ),
                    ("manifest.yml", &good_manifest),
                    ("mwu.py", "def broken(:\n"),
                ],
            ),
            FailureReason::ModuleInvalid,
        ),
    ];

    let hub = env.hub();
    for (dir, reason) in cases {
        let summary = hub.build(&dir, &BuildOptions::default()).unwrap();
        assert!(!summary.is_build_success, "{}", dir.display());
        assert_eq!(summary.failure_reason, Some(reason), "{}", dir.display());
        assert!(summary.details.is_some());
    }
    assert!(!env
        .engine
        .image_exists(&ImageTag::new("hub/broken:0.1.0"))
        .unwrap());
}

#[test]
fn missing_module_builds_but_fails_usage_test() {
    let env = Env::new();
    let dir = env.artifact(
        "fail-to-start",
        &[
            ("Dockerfile", GOOD_RECIPE),
            ("manifest.yml", &manifest("fail-to-start", "0.1.0")),
        ],
    );
    let hub = env.hub();

    let plain = hub.build(&dir, &BuildOptions::default()).unwrap();
    assert!(plain.is_build_success);
    assert_eq!(plain.is_test_success, None);

    for daemon in [false, true] {
        let summary = hub.build(&dir, &tested(daemon)).unwrap();
        assert!(!summary.is_build_success);
        assert_eq!(summary.is_test_success, Some(false));
        assert_eq!(
            summary.failure_reason,
            Some(FailureReason::ContainerStartFailure)
        );
    }
    assert_eq!(env.engine.live_containers(), 0);
}

#[test]
fn failed_usage_test_skips_push() {
    let env = Env::new();
    let dir = env.artifact(
        "fail-to-start",
        &[
            ("Dockerfile", GOOD_RECIPE),
            ("manifest.yml", &manifest("fail-to-start", "0.1.0")),
        ],
    );
    let opts = BuildOptions {
        push: true,
        ..tested(false)
    };
    let summary = env.hub().build(&dir, &opts).unwrap();
    assert_eq!(summary.is_push_success, None);
    assert!(env.registry.search(&CatalogQuery::default()).unwrap().is_empty());
}

#[test]
fn pull_resolves_highest_version_and_rejects_unknown() {
    let env = Env::new();
    let hub = env.hub();
    for (i, version) in ["0.0.9", "0.0.11", "0.0.10"].iter().enumerate() {
        let dir = env.good(&format!("mwu-{i}"), version);
        assert!(hub.build(&dir, &push()).unwrap().is_build_success);
    }

    let consumer = Env::new();
    let consumer_hub = HubIO::new(
        consumer.config(),
        consumer.engine.clone(),
        env.registry.clone(),
        Arc::new(StaticToken::new(None)),
    );
    let outcome = consumer_hub.pull("hub-mwu").unwrap();
    assert_eq!(outcome.entry.identity.version, "0.0.11");
    assert_eq!(outcome.tag.as_str(), "hub/hub-mwu:0.0.11");

    let err = consumer_hub.pull("unknown-executor").unwrap_err();
    assert_eq!(err.reason(), FailureReason::ImageNotFound);
}

#[test]
fn list_filters_and_orders() {
    let env = Env::new();
    let hub = env.hub();
    let other = env.artifact(
        "other",
        &[
            ("Dockerfile", "FROM alpine\n"),
            (
                "manifest.yml",
                "name: indexer\nversion: 1.0.0\nauthor: dev\nvendor: acme\nkind: pod\ntype: indexer\nkeywords: [vector]\n",
            ),
        ],
    );
    hub.build(&env.good("hub-mwu", "0.0.1"), &push()).unwrap();
    std::thread::sleep(Duration::from_millis(5));
    hub.build(&other, &push()).unwrap();

    let all = hub.list(&CatalogQuery::default()).unwrap();
    let names: Vec<&str> = all.iter().map(|e| e.identity.name.as_str()).collect();
    assert_eq!(names, ["indexer", "hub-mwu"]);

    let by_keyword = CatalogQuery {
        keywords: vec!["nlp".to_owned(), "missing".to_owned()],
        ..CatalogQuery::default()
    };
    assert_eq!(hub.list(&by_keyword).unwrap().len(), 1);

    let conjunctive = CatalogQuery {
        keywords: vec!["vector".to_owned()],
        executor_type: Some("crafter".to_owned()),
        ..CatalogQuery::default()
    };
    assert!(hub.list(&conjunctive).unwrap().is_empty());
}

#[test]
fn concurrent_no_overwrite_pushes_admit_one() {
    let env = Arc::new(Env::new());
    let dir = env.good("hub-mwu", "0.0.1");
    assert!(env
        .hub()
        .build(&dir, &BuildOptions::default())
        .unwrap()
        .is_build_success);

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let env = Arc::clone(&env);
            let barrier = Arc::clone(&barrier);
            let dir = dir.clone();
            std::thread::spawn(move || {
                let hub = env.hub();
                barrier.wait();
                let opts = BuildOptions {
                    no_overwrite: true,
                    ..push()
                };
                hub.build(&dir, &opts).unwrap()
            })
        })
        .collect();

    let summaries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = summaries.iter().filter(|s| s.is_build_success).count();
    assert_eq!(winners, 1);
    assert!(summaries
        .iter()
        .filter(|s| !s.is_build_success)
        .all(|s| s.failure_reason == Some(FailureReason::ImageAlreadyExists)));
    assert_eq!(
        env.registry
            .search(&CatalogQuery::by_name("hub-mwu"))
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn engine_outage_is_engine_failure() {
    let env = Env::new();
    let dir = env.good("hub-mwu", "0.0.1");
    env.engine.fail_next(MockFailure::Unavailable);
    let summary = env.hub().build(&dir, &BuildOptions::default()).unwrap();
    assert!(!summary.is_build_success);
    assert_eq!(summary.failure_reason, Some(FailureReason::EngineFailure));
}
