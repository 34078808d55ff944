//! Integration tests for the CLI interface
//!
//! Only subcommands that do not need a running box are exercised here.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn test_cli_help_flag() {
    let mut cmd = Command::cargo_bin("devbox").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"));
}

#[test]
fn test_setup_help() {
    let mut cmd = Command::cargo_bin("devbox").unwrap();
    cmd.args(["setup", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Run setup commands inside a box"));
}

#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("devbox").unwrap();
    cmd.arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_classify_prints_groups_in_plan_order() {
    let mut cmd = Command::cargo_bin("devbox").unwrap();
    let output = cmd
        .args([
            "classify",
            "apt install -y git",
            "pip install flask",
            "systemctl start nginx",
            "echo done",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output).unwrap();
    let system = stdout.find("System Commands (sequential)").unwrap();
    let apt = stdout.find("APT Packages (sequential)").unwrap();
    let python = stdout.find("Python Packages (parallel)").unwrap();
    let other = stdout.find("Other Commands (sequential)").unwrap();
    assert!(system < apt && apt < python && python < other);
    assert!(stdout.contains("  pip install flask"));
}

#[test]
fn test_config_reflects_environment_overrides() {
    let mut cmd = Command::cargo_bin("devbox").unwrap();
    cmd.arg("config")
        .env("DEVBOX_SETUP_WORKERS", "7")
        .env("DEVBOX_QUERY_WORKERS", "not-a-number")
        .env("DEVBOX_DISABLE_PARALLEL", "TRUE")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"setup_command_workers\": 7"))
        .stdout(predicate::str::contains("\"package_query_workers\": 5"))
        .stdout(predicate::str::contains("\"enable_parallel\": false"))
        .stdout(predicate::str::contains("\"setup_timeout\": \"10m\""));
}

#[test]
fn test_setup_with_only_comments_does_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("setup.txt");
    std::fs::write(&file, "# nothing to do yet\n\n").unwrap();

    let mut cmd = Command::cargo_bin("devbox").unwrap();
    cmd.args(["setup", "no-such-box", "--file"])
        .arg(&file)
        .assert()
        .success();
}

#[test]
fn test_setup_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("devbox").unwrap();
    cmd.args(["setup", "no-such-box", "--file"])
        .arg(temp_dir.path().join("missing.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read setup commands"));
}
