#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn dirguard() -> Command {
    Command::cargo_bin("dirguard").unwrap()
}

#[test]
fn test_cli_run_creates_snapshot() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("watched");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("a.txt"), b"abc").unwrap();

    dirguard()
        .arg("-o")
        .arg(dir.path().join("out"))
        .arg("-s")
        .arg(dir.path().join("iso"))
        .arg("--analyzer")
        .arg("true")
        .arg(&root)
        .assert()
        .success()
        .stdout(predicate::str::contains("watched: 1 entries"));

    let names: Vec<String> = fs::read_dir(dir.path().join("out"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("watched_Snapshot_"));
    assert!(dir.path().join("iso").is_dir());
}

#[test]
fn test_cli_json_summary() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("watched");
    fs::create_dir_all(&root).unwrap();

    let output = dirguard()
        .arg("-o")
        .arg(dir.path().join("out"))
        .arg("-s")
        .arg(dir.path().join("iso"))
        .arg("--json")
        .arg(&root)
        .arg(dir.path().join("missing"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["failed_roots"], 1);
    assert_eq!(summary["roots"][0]["retention"]["outcome"], "promoted");
    assert!(summary["roots"][1]["error"].is_string());
}

#[test]
fn test_cli_missing_output_flag_fails() {
    let dir = tempdir().unwrap();
    dirguard()
        .arg("-s")
        .arg(dir.path().join("iso"))
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("output directory not provided"));
}

#[test]
fn test_cli_duplicate_flag_fails() {
    let dir = tempdir().unwrap();
    dirguard()
        .args(["-o", "a", "-o", "b", "-s", "c"])
        .arg(dir.path())
        .assert()
        .failure();
}

#[test]
fn test_cli_flags_without_values_fail() {
    dirguard().args(["-o", "-s", "iso", "root"]).assert().failure();
}

#[test]
fn test_cli_requires_a_root() {
    dirguard().args(["-o", "out", "-s", "iso"]).assert().failure();
}

#[test]
fn test_cli_config_file_supplies_directories() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("cfgroot");
    fs::create_dir_all(&root).unwrap();
    let config = dir.path().join("dirguard.json");
    fs::write(
        &config,
        serde_json::json!({
            "output_dir": dir.path().join("out"),
            "quarantine_dir": dir.path().join("iso"),
            "analyzer": { "program": "true" },
            "compare_mode": "records"
        })
        .to_string(),
    )
    .unwrap();

    dirguard()
        .arg("--config")
        .arg(&config)
        .arg(&root)
        .assert()
        .success();
    assert!(dir.path().join("out").is_dir());
}
