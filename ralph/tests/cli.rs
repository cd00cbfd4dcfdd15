//! CLI smoke tests for the ralph binary

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_version_flag() {
    let mut cmd = Command::cargo_bin("ralph").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_no_command_prints_version() {
    let temp = tempfile::TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("ralph").unwrap();
    cmd.current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("ralph"));
}

#[test]
fn test_run_without_prompt_file_exits_one() {
    let temp = tempfile::TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("ralph").unwrap();
    cmd.current_dir(temp.path())
        .args(["run", "--no-push"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("prompt file not found"));
}

#[test]
fn test_unknown_agent_is_rejected() {
    let temp = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join(".ralph")).unwrap();
    std::fs::write(temp.path().join(".ralph/PROMPT.md"), "task").unwrap();
    let mut cmd = Command::cargo_bin("ralph").unwrap();
    cmd.current_dir(temp.path())
        .args(["run", "--agent", "gemini"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown agent"));
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("ralph").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("plan"));
}
