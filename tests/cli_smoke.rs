//! Smoke tests for the CLI host adapter.

use assert_cmd::Command;
use predicates::prelude::*;

fn skiff() -> Command {
    let mut command = Command::cargo_bin("skiff").unwrap_or_else(|err| panic!("binary: {err}"));
    for (key, _) in std::env::vars() {
        if key.starts_with("SKIFF_") {
            command.env_remove(&key);
        }
    }
    command
}

fn with_complete_config(command: &mut Command) -> &mut Command {
    command
        .env("SKIFF_API_BASE_URL", "https://compute.invalid")
        .env("SKIFF_API_TOKEN", "tok-1")
        .env("SKIFF_TEMPLATE_ID", "lt-0abc")
        .env("SKIFF_HOME_SNAPSHOT_ID", "snap-home")
        .env("SKIFF_ENV_SNAPSHOT_ID", "snap-env")
}

#[test]
fn help_lists_the_lifecycle_subcommands() {
    skiff()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("teardown"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn no_arguments_shows_usage() {
    skiff().assert().failure();
}

#[test]
fn status_with_no_session_reports_not_started_without_network() {
    let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let mut command = skiff();
    with_complete_config(&mut command)
        .current_dir(dir.path())
        .arg("status")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("not started"));
}

#[test]
fn missing_configuration_is_reported_on_stderr() {
    let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
    skiff()
        .current_dir(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));
}
