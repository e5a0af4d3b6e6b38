//! Tests for the sitecoord command-line interface

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn sitecoord() -> Command {
    Command::cargo_bin("sitecoord").unwrap()
}

#[test]
fn test_simulate_default_site() {
    sitecoord()
        .args(["simulate", "-n", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"transactionId":1,"status":"OK","partitions":[0]}"#,
        ))
        .stdout(predicate::str::contains(
            r#"{"transactionId":2,"status":"OK","partitions":[0]}"#,
        ));
}

#[test]
fn test_simulate_abort_backfills() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "local_partitions = [0, 1, 2, 3]").unwrap();

    sitecoord()
        .args(["simulate", "--abort-after", "0", "--config"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"transactionId":1,"status":"ABORTED","partitions":[0,1,2,3]}"#,
        ));
}

#[test]
fn test_check_config_reports_site() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "site_id = 3\nlocal_partitions = [7, 8]").unwrap();

    sitecoord()
        .arg("check-config")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Site 3: 2 local partitions"));
}

#[test]
fn test_check_config_rejects_duplicates() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "local_partitions = [1, 1]").unwrap();

    sitecoord()
        .arg("check-config")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("listed more than once"));
}
