//! End-to-end tests for the `fa` binary
//!
//! None of these touch the network: they exercise workspace creation,
//! inspection and repair on an empty workspace.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// `fa` with logs redirected into the temp dir
fn fa(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("fa").expect("binary builds");
    cmd.env("XDG_DATA_HOME", temp.path().join("data"));
    cmd
}

fn init(temp: &TempDir) -> std::path::PathBuf {
    let root = temp.path().join("demo");
    fa(temp).arg("init").arg(&root).assert().success();
    root
}

fn fake_worktree(path: &Path) {
    fs::create_dir_all(path).unwrap();
    fs::write(path.join(".git"), "gitdir: nowhere\n").unwrap();
}

#[test]
fn test_init_creates_layout() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("demo");

    fa(&temp)
        .arg("init")
        .arg(&root)
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized workspace"));

    assert!(root.join(".foundagent.yaml").is_file());
    assert!(root.join(".foundagent/state.json").is_file());
    assert!(root.join("repos/.bare").is_dir());
    assert!(root.join("repos/worktrees").is_dir());
    assert!(root.join("demo.code-workspace").is_file());
}

#[test]
fn test_init_twice_requires_force() {
    let temp = TempDir::new().unwrap();
    let root = init(&temp);

    fa(&temp)
        .arg("init")
        .arg(&root)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));

    fa(&temp).args(["init", "--force"]).arg(&root).assert().success();
}

#[test]
fn test_commands_outside_workspace_fail() {
    let temp = TempDir::new().unwrap();
    let empty = temp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();

    fa(&temp)
        .current_dir(&empty)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("workspace-not-found"))
        .stderr(predicate::str::contains("fa init"));
}

#[test]
fn test_list_empty_workspace() {
    let temp = TempDir::new().unwrap();
    let root = init(&temp);

    fa(&temp)
        .arg("-w")
        .arg(&root)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No repositories"));
}

#[test]
fn test_discovers_workspace_from_subdirectory() {
    let temp = TempDir::new().unwrap();
    let root = init(&temp);

    fa(&temp)
        .current_dir(root.join("repos/worktrees"))
        .args(["wt", "list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_doctor_passes_on_fresh_workspace() {
    let temp = TempDir::new().unwrap();
    let root = init(&temp);

    let output = fa(&temp).arg("-w").arg(&root).args(["doctor", "--json"]).output().unwrap();
    assert!(output.status.success());

    let results: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 9);
    assert!(results.iter().all(|r| r["status"] == "pass"), "{:?}", results);
}

#[test]
fn test_doctor_fix_removes_orphaned_worktree() {
    let temp = TempDir::new().unwrap();
    let root = init(&temp);
    let orphan = root.join("repos/worktrees/ghost/main");
    fake_worktree(&orphan);

    fa(&temp)
        .arg("-w")
        .arg(&root)
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("orphaned-worktrees"))
        .stdout(predicate::str::contains("(fixable)"));
    assert!(orphan.exists());

    fa(&temp).arg("-w").arg(&root).args(["doctor", "--fix"]).assert().success();
    assert!(!orphan.exists());
}

#[test]
fn test_doctor_fails_on_corrupt_state() {
    let temp = TempDir::new().unwrap();
    let root = init(&temp);
    fs::write(root.join(".foundagent/state.json"), "{ not json").unwrap();

    fa(&temp)
        .arg("-w")
        .arg(&root)
        .arg("doctor")
        .assert()
        .failure()
        .stderr(predicate::str::contains("check(s) failed"));

    fa(&temp).arg("-w").arg(&root).args(["doctor", "--fix"]).assert().success();
}

#[test]
fn test_remove_unknown_repository() {
    let temp = TempDir::new().unwrap();
    let root = init(&temp);

    fa(&temp)
        .arg("-w")
        .arg(&root)
        .args(["remove", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("repo-not-found"));
}

#[test]
fn test_name_requires_single_url() {
    let temp = TempDir::new().unwrap();
    let root = init(&temp);

    fa(&temp)
        .arg("-w")
        .arg(&root)
        .args(["add", "--name", "x", "https://example.com/a.git", "https://example.com/b.git"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("single URL"));
}

#[test]
fn test_add_rejects_unsafe_name() {
    let temp = TempDir::new().unwrap();
    let root = init(&temp);

    fa(&temp)
        .arg("-w")
        .arg(&root)
        .args(["add", "--name", "..", "https://example.com/a.git"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid-argument"));

    let config = fs::read_to_string(root.join(".foundagent.yaml")).unwrap();
    assert!(!config.contains("example.com"));
}
