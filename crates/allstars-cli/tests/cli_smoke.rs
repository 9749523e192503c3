//! CLI binary smoke tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd() -> Command {
    Command::cargo_bin("allstars").unwrap()
}

// ---------------------------------------------------------------------------
// Top-level
// ---------------------------------------------------------------------------

#[test]
fn no_args_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_lists_subcommands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fit"))
        .stdout(predicate::str::contains("config"));
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn config_prints_default_json() {
    cmd()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"trial_timeout_secs\": 10"))
        .stdout(predicate::str::contains("\"kNN\""));
}

// ---------------------------------------------------------------------------
// fit
// ---------------------------------------------------------------------------

#[test]
fn fit_requires_a_label() {
    cmd()
        .args(["fit", "train.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--label"));
}

#[test]
fn fit_rejects_missing_file() {
    cmd()
        .args(["fit", "does_not_exist.csv", "--label", "y"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}
