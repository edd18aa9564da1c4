//! CLI subprocess integration tests.
//!
//! These tests invoke the `hub` binary with the mock engine and a directory
//! registry, and verify exit codes, stdout content, and JSON output.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

struct Sandbox {
    dir: tempfile::TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn registry(&self) -> PathBuf {
        self.dir.path().join("registry")
    }

    fn hub(&self) -> Command {
        self.hub_with_registry(path_arg(&self.registry()))
    }

    fn hub_with_registry(&self, registry: &str) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_hub"));
        cmd.env("XDG_CONFIG_HOME", self.dir.path().join("config"))
            .env("EXECHUB_SKIP_PREREQS", "1")
            .env_remove("EXECHUB_TOKEN")
            .env_remove("EXECHUB_REGISTRY")
            .env_remove("EXECHUB_NAMESPACE")
            .env_remove("EXECHUB_ENGINE")
            .env_remove("EXECHUB_LOG")
            .arg("--engine")
            .arg("mock")
            .arg("--registry")
            .arg(registry);
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.hub().args(args).output().unwrap()
    }

    fn artifact(&self, name: &str, version: &str, with_recipe: bool) -> PathBuf {
        let dir = self.dir.path().join(format!("{name}-{version}"));
        std::fs::create_dir_all(&dir).unwrap();
        if with_recipe {
            std::fs::write(
                dir.join("Dockerfile"),
                "FROM python:3.11-slim\nCOPY . /app\nENTRYPOINT [\"python\", \"-m\", \"mwu\"]\n",
            )
            .unwrap();
        }
        std::fs::write(dir.join("mwu.py"), "print('ready')\n").unwrap();
        std::fs::write(
            dir.join("manifest.yml"),
            format!(
                "name: {name}\nversion: {version}\nauthor: dev\nvendor: acme\nkind: pod\ntype: crafter\nkeywords: [toy]\n"
            ),
        )
        .unwrap();
        dir
    }
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn cli_version_exits_zero() {
    let output = Command::new(env!("CARGO_BIN_EXE_hub"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("hub"));
}

#[test]
fn cli_help_lists_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_hub"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["build", "pull", "list", "completions"] {
        assert!(stdout.contains(command), "help must list '{command}'");
    }
}

#[test]
fn cli_build_json_summary() {
    let sandbox = Sandbox::new();
    let dir = sandbox.artifact("hub-mwu", "0.0.1", true);
    let output = sandbox.run(&[
        "--json",
        "build",
        path_arg(&dir),
        "--test-uses",
        "--timeout-ready",
        "5",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let summary = json(&output);
    assert_eq!(summary["is_build_success"], true);
    assert_eq!(summary["is_test_success"], true);
    assert_eq!(summary["version"], "0.0.1");
    assert_eq!(summary["image"], "hub/hub-mwu:0.0.1");
    assert_eq!(summary["manifest_info"]["name"], "hub-mwu");
}

#[test]
fn cli_build_missing_recipe_exits_one() {
    let sandbox = Sandbox::new();
    let dir = sandbox.artifact("no-recipe", "0.0.1", false);
    let output = sandbox.run(&["--json", "build", path_arg(&dir)]);
    assert_eq!(output.status.code(), Some(1));
    let summary = json(&output);
    assert_eq!(summary["is_build_success"], false);
    assert_eq!(summary["failure_reason"], "DockerfileMissing");
}

#[test]
fn cli_build_missing_manifest_exits_two() {
    let sandbox = Sandbox::new();
    let dir = sandbox.artifact("no-manifest", "0.0.1", true);
    std::fs::remove_file(dir.join("manifest.yml")).unwrap();
    let output = sandbox.run(&["build", path_arg(&dir), "--raise-error"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("manifest"));
}

#[test]
fn cli_push_no_overwrite_exits_three() {
    let sandbox = Sandbox::new();
    let dir = sandbox.artifact("hub-mwu", "0.0.1", true);
    let first = sandbox.run(&["build", path_arg(&dir), "--push"]);
    assert!(
        first.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&first.stderr)
    );

    let second = sandbox.run(&["build", path_arg(&dir), "--push", "--no-overwrite"]);
    assert_eq!(second.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&second.stdout).contains("ImageAlreadyExists"));
}

#[test]
fn cli_list_and_pull_round_trip() {
    let sandbox = Sandbox::new();
    for version in ["0.0.2", "0.0.10"] {
        let dir = sandbox.artifact("hub-mwu", version, true);
        let output = sandbox.run(&["build", path_arg(&dir), "--push", "--host-info"]);
        assert!(output.status.success());
    }

    let listed = sandbox.run(&["--json", "list", "--name", "hub-mwu"]);
    assert!(listed.status.success());
    let entries = json(&listed);
    let versions: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["identity"]["version"].as_str().unwrap())
        .collect();
    assert_eq!(versions, ["0.0.10", "0.0.2"]);
    assert!(entries[0]["host_info"]["hostname"].is_string());

    let pulled = sandbox.run(&["--json", "pull", "hub-mwu"]);
    assert!(
        pulled.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&pulled.stderr)
    );
    assert_eq!(json(&pulled)["image"], "hub/hub-mwu:0.0.10");
}

#[test]
fn cli_pull_unknown_exits_four() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["pull", "nothing-here"]);
    assert_eq!(output.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&output.stderr).contains("image not found"));
}

#[test]
fn cli_list_empty_registry() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["list", "--keywords", "nlp", "vision"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("no executors found"));

    let as_json = sandbox.run(&["--json", "list"]);
    assert_eq!(json(&as_json), serde_json::json!([]));
}

#[test]
fn cli_push_to_http_without_token_exits_five() {
    let sandbox = Sandbox::new();
    let dir = sandbox.artifact("hub-mwu", "0.0.1", true);
    let output = sandbox
        .hub_with_registry("http://127.0.0.1:9")
        .env("HOME", sandbox.dir.path())
        .args(["build", path_arg(&dir), "--push"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn cli_completions_bash() {
    let output = Command::new(env!("CARGO_BIN_EXE_hub"))
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("hub"));
}
