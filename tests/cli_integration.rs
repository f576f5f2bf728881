//! CLI integration tests for cellar.
//!
//! These tests run the real binary against the recipes and host snapshots
//! under `tests/fixtures`. Nothing here reaches the network or spawns a
//! compiler: host facts come from `--host` files and builds fail before
//! any step runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get the cellar binary command, isolated from the user's configuration.
fn cellar(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cellar").unwrap();
    cmd.env("CELLAR_HOME", home).env_remove("CELLAR_HOST");
    cmd
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn graph_tool() -> String {
    fixture("graph-tool.toml").display().to_string()
}

fn modern_host() -> String {
    fixture("host-linux-gcc.toml").display().to_string()
}

// ============================================================================
// cellar resolve
// ============================================================================

#[test]
fn test_resolve_prints_config() {
    let tmp = TempDir::new().unwrap();

    cellar(tmp.path())
        .args(["resolve", &graph_tool(), "--host", &modern_host(), "--with", "python3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"graph-tool\""))
        .stdout(predicate::str::contains("\"pkg_version\": \"2.18_4\""))
        .stdout(predicate::str::contains("PYTHON=python3"));
}

#[test]
fn test_resolve_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    let run = || {
        let output = cellar(tmp.path())
            .args([
                "resolve",
                &graph_tool(),
                "--host",
                &modern_host(),
                "--with",
                "python3,openmp",
                "--jobs",
                "4",
                "--fingerprint",
            ])
            .output()
            .unwrap();
        assert!(output.status.success());
        output.stdout
    };

    let first = run();
    assert_eq!(first, run());
    assert_eq!(String::from_utf8_lossy(&first).trim().len(), 64);
}

#[test]
fn test_resolve_rejects_old_compiler() {
    let tmp = TempDir::new().unwrap();
    let host = fixture("host-linux-gcc48.toml").display().to_string();

    cellar(tmp.path())
        .args(["resolve", &graph_tool(), "--host", &host])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("compiler `gcc 4.8.5` rejected"))
        .stderr(predicate::str::contains("GCC 5.0 or above"));
}

#[test]
fn test_resolve_unknown_option() {
    let tmp = TempDir::new().unwrap();

    cellar(tmp.path())
        .args(["resolve", &graph_tool(), "--host", &modern_host(), "--with", "cuda"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown option `cuda`"));
}

#[test]
fn test_resolve_contradictory_flags() {
    let tmp = TempDir::new().unwrap();

    cellar(tmp.path())
        .args([
            "resolve",
            &graph_tool(),
            "--host",
            &modern_host(),
            "--with",
            "cairo",
            "--without",
            "cairo",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration conflict"));
}

#[test]
fn test_resolve_malformed_recipe() {
    let tmp = TempDir::new().unwrap();
    let recipe = tmp.path().join("broken.toml");
    fs::write(
        &recipe,
        "name = \"broken\"\nversion = \"1.0\"\n\n[[source]]\nurl = \"https://example.com/b.tar.gz\"\n\n[build]\ninstall = \"make install\"\n",
    )
    .unwrap();

    cellar(tmp.path())
        .args(["resolve", recipe.to_str().unwrap(), "--host", &modern_host()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("source[0].sha256"));
}

// ============================================================================
// cellar plan / info / host
// ============================================================================

#[test]
fn test_plan_lists_steps_in_order() {
    let tmp = TempDir::new().unwrap();

    let output = cellar(tmp.path())
        .args(["plan", &graph_tool(), "--host", &modern_host(), "--with", "python3"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let unpack = stdout.find("unpack graph-tool-2.18.tar.bz2").unwrap();
    let configure = stdout.find("configure [python]").unwrap();
    let install = stdout.find("install [python3]").unwrap();
    assert!(unpack < configure && configure < install);
    assert!(stdout.contains("edit configure [python3]"));
}

#[test]
fn test_plan_json() {
    let tmp = TempDir::new().unwrap();

    cellar(tmp.path())
        .args(["plan", &graph_tool(), "--host", &modern_host(), "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\": \"unpack\""))
        .stdout(predicate::str::contains("\"package\": \"graph-tool\""));
}

#[test]
fn test_info_lists_options_and_variants() {
    let tmp = TempDir::new().unwrap();

    cellar(tmp.path())
        .args(["info", &graph_tool()])
        .assert()
        .success()
        .stdout(predicate::str::contains("graph-tool 2.18_4: efficient network analysis"))
        .stdout(predicate::str::contains("python3"))
        .stdout(predicate::str::contains("Variants:"))
        .stdout(predicate::str::contains("rejects gcc 4.8"));
}

#[test]
fn test_host_replays_snapshot() {
    let tmp = TempDir::new().unwrap();

    cellar(tmp.path())
        .args(["host", "--host", &modern_host()])
        .assert()
        .success()
        .stdout(predicate::str::contains("os = \"linux\""))
        .stdout(predicate::str::contains("family = \"gcc\""));
}

// ============================================================================
// cellar build
// ============================================================================

#[test]
fn test_build_checksum_mismatch_runs_nothing() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("hello-1.0.tar.gz"), "not the real tarball").unwrap();
    let recipe = tmp.path().join("hello.toml");
    fs::write(
        &recipe,
        format!(
            "name = \"hello\"\nversion = \"1.0\"\n\n[[source]]\nurl = \"hello-1.0.tar.gz\"\nsha256 = \"{}\"\n\n[build]\nconfigure = \"./configure --prefix={{prefix}}\"\ninstall = \"make install\"\n",
            "0".repeat(64)
        ),
    )
    .unwrap();

    cellar(tmp.path())
        .args([
            "build",
            recipe.to_str().unwrap(),
            "--host",
            &modern_host(),
            "--install-root",
            tmp.path().join("install").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("checksum mismatch"));

    assert!(!tmp.path().join("install").exists());
    assert!(!tmp.path().join("work").exists());
}

#[test]
fn test_build_json_reports_error_event() {
    let tmp = TempDir::new().unwrap();
    let host = fixture("host-linux-gcc48.toml").display().to_string();

    cellar(tmp.path())
        .args(["build", &graph_tool(), "--host", &host, "--message-format", "json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"reason\":\"diagnostic\""));
}

// ============================================================================
// cellar completions
// ============================================================================

#[test]
fn test_completions_bash() {
    let tmp = TempDir::new().unwrap();

    cellar(tmp.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cellar"));
}
