//! Ledger, record-success, reset-cycle and config-hash through the binary.
//! None of these touch the provider, so no API key is set.

use std::path::{Path, PathBuf};

use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use std::process::Command;

const KEY_ENV: &str = "IDT_CLI_LEDGER_TEST_KEY";

fn base_config() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/defaults/base.yaml")
}

/// Overlay pointing the store into `dir`.
fn overlay(dir: &Path) -> PathBuf {
    let p = dir.join("local.yaml");
    let yaml = format!(
        "store:\n  root: '{}'\nprovider:\n  alpha_vantage:\n    api_key_env: '{KEY_ENV}'\n",
        dir.join("blobs").display()
    );
    std::fs::write(&p, yaml).unwrap();
    p
}

fn idt(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("idt").unwrap();
    cmd.args(args)
        .arg("--config")
        .arg(base_config())
        .arg("--config")
        .arg(overlay(dir))
        .env_remove(KEY_ENV)
        .env("RUST_LOG", "warn");
    cmd
}

fn stdout_json(out: &std::process::Output) -> Value {
    serde_json::from_slice(&out.stdout).unwrap()
}

const SUCCESS: &str = r#"{"import_success":true,"type":"Stocks_single","note":"buy the dip","ticker_1":"AAPL","file_1":"data-daily-AAPL","api_call_count":1}"#;

#[test]
fn ledger_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    idt(dir.path(), &["ledger"])
        .assert()
        .success()
        .stdout(predicate::eq("[]\n"));
}

#[test]
fn record_success_appends_once_then_reports_duplicate() {
    let dir = tempfile::tempdir().unwrap();

    let first = idt(dir.path(), &["record-success", "--result", SUCCESS]).output().unwrap();
    assert!(first.status.success());
    let v = stdout_json(&first);
    assert_eq!(v["outcome"], "appended");
    assert_eq!(v["ledger_len"], 1);

    let second = idt(dir.path(), &["record-success", "--result", SUCCESS]).output().unwrap();
    assert!(second.status.success());
    let v = stdout_json(&second);
    assert_eq!(v["outcome"], "duplicate");
    assert_eq!(v["ledger_len"], 1);

    let ledger = idt(dir.path(), &["ledger"]).output().unwrap();
    let v = stdout_json(&ledger);
    let entries = v.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["note"], "buy the dip");
    assert_eq!(entries[0]["file_1"], "data-daily-AAPL");
}

#[test]
fn failure_result_is_not_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let failure = r#"{"import_success":false,"failed_ticker":"ZZZZ","note":"n","api_call_count":1}"#;

    idt(dir.path(), &["record-success", "--result", failure])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"outcome\":\"skipped\""));

    idt(dir.path(), &["ledger"])
        .assert()
        .success()
        .stdout(predicate::eq("[]\n"));
}

#[test]
fn malformed_result_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    idt(dir.path(), &["record-success", "--result", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--result"));
}

#[test]
fn reset_cycle_clears_ledger() {
    let dir = tempfile::tempdir().unwrap();
    idt(dir.path(), &["record-success", "--result", SUCCESS]).assert().success();

    let out = idt(dir.path(), &["reset-cycle"]).output().unwrap();
    assert!(out.status.success());
    let report = stdout_json(&out);
    assert_eq!(report["ledger_cleared"], true);
    assert_eq!(report["negative_cache_cleared"], false);
    assert_eq!(report["purged_series"], serde_json::json!([]));

    idt(dir.path(), &["ledger"])
        .assert()
        .success()
        .stdout(predicate::eq("[]\n"));
}

#[test]
fn config_hash_prints_hash_and_canonical_json() {
    let out = Command::cargo_bin("idt")
        .unwrap()
        .arg("config-hash")
        .arg(base_config())
        .output()
        .unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    let mut lines = stdout.lines();
    let hash_line = lines.next().unwrap();
    let hash = hash_line.strip_prefix("config_hash=").unwrap();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

    let canonical: Value = serde_json::from_str(lines.next().unwrap()).unwrap();
    assert_eq!(canonical["batch"]["concurrency"], 4);
}

#[test]
fn missing_config_flag_is_usage_error() {
    Command::cargo_bin("idt")
        .unwrap()
        .arg("ledger")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--config"));
}

#[test]
fn unused_config_keys_are_logged_through_the_filter() {
    let dir = tempfile::tempdir().unwrap();
    let extra = dir.path().join("extra.yaml");
    std::fs::write(&extra, "experimental:\n  knob: 1\n").unwrap();

    idt(dir.path(), &["ledger"])
        .arg("--config")
        .arg(&extra)
        .assert()
        .success()
        .stdout(predicate::eq("[]\n"))
        .stderr(predicate::str::contains("config has unused keys"));

    idt(dir.path(), &["ledger"])
        .arg("--config")
        .arg(&extra)
        .env("RUST_LOG", "error")
        .assert()
        .success()
        .stderr(predicate::str::contains("config has unused keys").not());
}
