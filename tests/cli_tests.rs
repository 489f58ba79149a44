//! Command-line driver tests
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

mod utils;

use predicates::prelude::*;
use std::fs;
use timeguard::ir::Program;
use utils::{Workspace, TWO_PASSES};

#[test]
fn test_enumerate_writes_classification_table() {
    let ws = Workspace::new(-1);
    let program = ws.copy_fixture("ecall_unit.json");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("timeguard");
    cmd.current_dir(ws.path())
        .arg(&program)
        .assert()
        .success()
        .stderr(predicate::str::contains("Enumerate: 3 nodes classified"));

    let table = fs::read_to_string(ws.path().join("tgdata.txt")).unwrap();
    assert_eq!(
        table,
        "ecall_entry\nentry\n-1\n1\necall_entry\nA\n1\n-1\necall_entry\nB\n-1\n1\n"
    );
}

#[test]
fn test_config_found_in_parent_directory() {
    let ws = Workspace::new(-1);
    let program = ws.copy_fixture("ecall_unit.json");
    let nested = ws.path().join("src").join("enclave");
    fs::create_dir_all(&nested).unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("timeguard");
    cmd.current_dir(&nested).arg(&program).assert().success();

    assert!(ws.path().join("tgdata.txt").exists());
}

#[test]
fn test_missing_config_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let program = dir.path().join("unit.json");
    fs::copy(utils::fixture("ecall_unit.json"), &program).unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("timeguard");
    cmd.current_dir(dir.path())
        .arg(&program)
        .assert()
        .failure()
        .stderr(predicate::str::contains("tconfig.txt"));
}

#[test]
fn test_collect_writes_instrumented_program() {
    let ws = Workspace::new(0);
    let program = ws.copy_fixture("ecall_unit.json");
    let output = ws.path().join("instrumented.json");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("timeguard");
    cmd.current_dir(ws.path())
        .arg("-o")
        .arg(&output)
        .arg(&program)
        .assert()
        .success()
        .stderr(predicate::str::contains("Collect: 3 nodes instrumented"))
        .stderr(predicate::str::contains("inserted before return"));

    let instrumented = Program::from_file(&output).unwrap();
    assert!(instrumented
        .runtime_imports
        .contains("instrument_function_insert_record"));
    assert!(instrumented
        .runtime_imports
        .contains("instrument_function_dump_result"));
}

#[test]
fn test_detect_json_report() {
    let ws = Workspace::new(-1);
    let program = ws.copy_fixture("ecall_unit.json");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("timeguard");
    cmd.current_dir(ws.path()).arg(&program).assert().success();

    ws.record_run(&TWO_PASSES);
    ws.set_mode(9);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("timeguard");
    let out = cmd
        .current_dir(ws.path())
        .arg("--format")
        .arg("json")
        .arg(&program)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["phase"], "detect");
    assert_eq!(report["correlation"]["source"], "correlated");
    assert_eq!(report["detection"]["detection_calls"], 2);
    assert!(ws.path().join("ttracedata.txt").exists());
}

#[test]
fn test_detect_without_training_data_fails() {
    let ws = Workspace::new(-1);
    let program = ws.copy_fixture("ecall_unit.json");
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("timeguard");
    cmd.current_dir(ws.path()).arg(&program).assert().success();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("timeguard");
    cmd.current_dir(ws.path())
        .arg("--phase")
        .arg("detect")
        .arg(&program)
        .assert()
        .failure()
        .stderr(predicate::str::contains("raw timing file"));
}

#[test]
fn test_unsupported_mode_fails() {
    let ws = Workspace::new(-3);
    let program = ws.copy_fixture("ecall_unit.json");
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("timeguard");
    cmd.current_dir(ws.path())
        .arg(&program)
        .assert()
        .failure()
        .stderr(predicate::str::contains("-3"));
}

#[test]
fn test_data_dir_override() {
    let ws = Workspace::new(-1);
    let program = ws.copy_fixture("ecall_unit.json");
    let data = ws.path().join("data");
    fs::create_dir_all(&data).unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("timeguard");
    cmd.current_dir(ws.path())
        .arg("--data-dir")
        .arg(&data)
        .arg(&program)
        .assert()
        .success();

    assert!(data.join("tgdata.txt").exists());
    assert!(!ws.path().join("tgdata.txt").exists());
}
