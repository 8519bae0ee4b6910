use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

#[test]
fn missing_csv_argument_exits_with_usage() {
    Command::cargo_bin("covid_benchmark")
        .expect("binary builds")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_exits_successfully() {
    Command::cargo_bin("covid_benchmark")
        .expect("binary builds")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn unreadable_csv_is_fatal() {
    let dir = TempDir::new().expect("unable to create temporary working directory");
    Command::cargo_bin("covid_benchmark")
        .expect("binary builds")
        .arg(dir.path().join("missing.csv"))
        .arg("--log-file")
        .arg(dir.path().join("bench.log"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.csv"));
}
