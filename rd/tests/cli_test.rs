//! CLI smoke tests for the `rd` binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("rd")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("search"));
}

#[test]
fn test_list_on_empty_repo() {
    let temp = TempDir::new().unwrap();
    Command::cargo_bin("rd")
        .unwrap()
        .args(["list", "--root-dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No research instances found"));
}

#[test]
fn test_search_on_empty_repo() {
    let temp = TempDir::new().unwrap();
    Command::cargo_bin("rd")
        .unwrap()
        .args(["search", "anything", "--root-dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No artifacts matching"));
}

#[test]
fn test_report_unknown_research_fails() {
    let temp = TempDir::new().unwrap();
    Command::cargo_bin("rd")
        .unwrap()
        .args(["report", "--research", "ghost", "--root-dir"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
