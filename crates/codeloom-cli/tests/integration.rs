//! Integration tests for the codeloom CLI
//!
//! Each test builds a small workspace in a temp directory and points HOME
//! at another one, so no real global configuration is read.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Get a Command for the codeloom binary
#[allow(deprecated)]
fn loom(workspace: &Path, home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("codeloom").expect("Failed to find codeloom binary");
    cmd.current_dir(workspace)
        .env("HOME", home)
        .env_remove("CODELOOM_WORKSPACE")
        .env_remove("CODELOOM_CONFIG");
    cmd
}

struct Fixture {
    workspace: TempDir,
    home: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let workspace = TempDir::new().expect("Failed to create temp dir");
        let root = workspace.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("tests")).unwrap();
        std::fs::write(root.join("src/parser.py"), "def parse():\n    pass\n").unwrap();
        std::fs::write(root.join("tests/test_parser.py"), "def test_parse():\n    pass\n").unwrap();
        std::fs::write(root.join("README.md"), "# demo\n").unwrap();
        Self {
            workspace,
            home: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn cmd(&self) -> Command {
        loom(self.workspace.path(), self.home.path())
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "{}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

// ============================================================================
// Build
// ============================================================================

#[test]
fn test_build_persists_graph() {
    let fx = Fixture::new();
    let summary = fx.json(&["build", "--json"]);

    // ., src, tests + 3 files
    assert_eq!(summary["stats"]["node_count"], 6);
    // 5 contains + 1 tests
    assert_eq!(summary["stats"]["edge_count"], 6);
    assert_eq!(summary["failures"].as_array().unwrap().len(), 0);
    assert_eq!(summary["domains"], serde_json::json!(["filesystem"]));

    let graph_id = summary["graph_id"].as_str().unwrap();
    let stored = fx
        .workspace
        .path()
        .join(".codeloom/graphs")
        .join(format!("{}.json", graph_id));
    assert!(stored.is_file());
}

#[test]
fn test_second_build_hits_disk_cache() {
    let fx = Fixture::new();
    let first = fx.json(&["build", "--json"]);
    assert_eq!(first["cache"]["misses"], 3);

    let second = fx.json(&["build", "--json"]);
    assert_eq!(second["cache"]["l2_hits"], 3);
    assert_eq!(second["cache"]["misses"], 0);
}

#[test]
fn test_no_cache_leaves_cache_empty() {
    let fx = Fixture::new();
    let summary = fx.json(&["build", "--json", "--no-cache"]);
    assert!(summary["cache"].is_null());

    let stats = fx.json(&["cache", "stats", "--json"]);
    assert_eq!(stats["entries"], 0);
}

#[test]
fn test_build_with_extension_subset() {
    let fx = Fixture::new();
    let summary = fx.json(&["build", "--json", "--extensions", "filesystem"]);
    assert_eq!(summary["stats"]["edge_count"], 5);
    assert_eq!(summary["contributions"].as_array().unwrap().len(), 1);
}

#[test]
fn test_build_unknown_extension_fails() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["build", "--extensions", "filesystem,git"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown extension 'git'"));
}

#[test]
fn test_local_config_excludes_paths() {
    let fx = Fixture::new();
    let config_dir = fx.workspace.path().join(".codeloom");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        "[extensions.filesystem]\nexclude = [\"tests\"]\n",
    )
    .unwrap();

    let summary = fx.json(&["build", "--json"]);
    // ., src, README.md, src/parser.py
    assert_eq!(summary["stats"]["node_count"], 4);
    assert_eq!(summary["stats"]["edge_count"], 3);
}

// ============================================================================
// Graph
// ============================================================================

#[test]
fn test_graph_requires_build() {
    let fx = Fixture::new();
    fx.cmd()
        .arg("graph")
        .assert()
        .failure()
        .stderr(predicate::str::contains("codeloom build"));
}

#[test]
fn test_graph_queries_latest_build() {
    let fx = Fixture::new();
    fx.cmd().args(["build", "--quiet"]).assert().success();

    let files = fx.json(&["graph", "--type", "fs_file", "--json"]);
    let names: Vec<&str> = files
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 3);
    assert!(names.contains(&"test_parser.py"));

    let overview = fx.json(&["graph", "--json"]);
    assert_eq!(overview["extensions"], serde_json::json!(["filesystem", "test-files"]));
    assert_eq!(overview["has_cycles"], false);

    let none = fx.json(&["graph", "--domain", "git", "--json"]);
    assert_eq!(none.as_array().unwrap().len(), 0);
}

#[test]
fn test_graph_node_detail_shows_tests_edge() {
    let fx = Fixture::new();
    fx.cmd().args(["build", "--quiet"]).assert().success();

    let files = fx.json(&["graph", "--type", "fs_file", "--json"]);
    let test_file = files
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["name"] == "test_parser.py")
        .unwrap();
    let id = test_file["id"].as_str().unwrap();

    let detail = fx.json(&["graph", "--id", id, "--json"]);
    let outgoing = detail["outgoing"].as_array().unwrap();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0]["type"], "tests");
}

// ============================================================================
// Cache & Config
// ============================================================================

#[test]
fn test_cache_clear() {
    let fx = Fixture::new();
    fx.cmd().args(["build", "--quiet"]).assert().success();
    assert_eq!(fx.json(&["cache", "stats", "--json"])["entries"], 3);

    fx.cmd().args(["cache", "clear", "--quiet"]).assert().success();
    assert_eq!(fx.json(&["cache", "stats", "--json"])["entries"], 0);
}

#[test]
fn test_config_init_and_show() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".codeloom"));
    assert!(fx.workspace.path().join(".codeloom/config.toml").is_file());

    let shown = fx.json(&["config", "show", "--json"]);
    assert_eq!(
        shown["pipeline"]["extensions"],
        serde_json::json!(["filesystem", "test-files"])
    );
}

#[test]
fn test_config_path_reports_locations() {
    let fx = Fixture::new();
    let paths = fx.json(&["config", "path", "--json"]);
    assert_eq!(paths["local_exists"], false);
    assert!(paths["global"]
        .as_str()
        .unwrap()
        .starts_with(fx.home.path().to_str().unwrap()));
}

#[test]
fn test_invalid_local_config_is_reported() {
    let fx = Fixture::new();
    let config_dir = fx.workspace.path().join(".codeloom");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "[pipeline\n").unwrap();

    fx.cmd()
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config.toml"));
}
