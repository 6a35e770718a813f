// ABOUTME: Integration tests for the gantry CLI commands.
// ABOUTME: Validates --help output, init behavior, and argument validation.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn gantry_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("gantry"))
}

#[test]
fn help_shows_commands() {
    gantry_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("gantry.yml");

    gantry_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .success();

    assert!(config_path.exists(), "gantry.yml should be created");
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("image:"), "Config should have image field");
    assert!(
        content.contains("source:"),
        "Config should have source field"
    );
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("gantry.yml");

    fs::write(&config_path, "existing: config").unwrap();

    gantry_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn init_accepts_service_and_image() {
    let temp_dir = tempfile::tempdir().unwrap();

    gantry_cmd()
        .current_dir(temp_dir.path())
        .args([
            "init",
            "--service",
            "chatbot",
            "--image",
            "registry.example.com/team/chatbot",
        ])
        .assert()
        .success();

    let content = fs::read_to_string(temp_dir.path().join("gantry.yml")).unwrap();
    assert!(content.contains("service: chatbot"));
    assert!(content.contains("registry.example.com/team/chatbot"));
}

#[test]
fn run_requires_a_build_number() {
    let temp_dir = tempfile::tempdir().unwrap();

    gantry_cmd()
        .current_dir(temp_dir.path())
        .env_remove("BUILD_NUMBER")
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("build"));
}

#[test]
fn run_rejects_build_number_zero() {
    let temp_dir = tempfile::tempdir().unwrap();

    gantry_cmd()
        .current_dir(temp_dir.path())
        .args(["run", "--build-number", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("greater than zero"));
}

#[test]
fn run_reads_build_number_from_environment() {
    let temp_dir = tempfile::tempdir().unwrap();

    // With no config file the command fails after argument parsing,
    // proving BUILD_NUMBER was accepted.
    gantry_cmd()
        .current_dir(temp_dir.path())
        .env("BUILD_NUMBER", "12")
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn run_without_config_fails() {
    let temp_dir = tempfile::tempdir().unwrap();

    gantry_cmd()
        .current_dir(temp_dir.path())
        .args(["run", "--build-number", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn rollback_without_config_fails() {
    let temp_dir = tempfile::tempdir().unwrap();

    gantry_cmd()
        .current_dir(temp_dir.path())
        .arg("rollback")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}
