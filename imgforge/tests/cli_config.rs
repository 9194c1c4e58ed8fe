//! CLI tests for config handling and pre-flight failures.
//!
//! Spawns the imgforge binary and checks exit codes.

use std::fs;
use std::process::Command;

use imgforge::exit_codes;
use imgforge::io::config::{BuildConfig, load_config};

fn imgforge() -> Command {
    Command::new(env!("CARGO_BIN_EXE_imgforge"))
}

#[test]
fn init_writes_loadable_default_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = imgforge()
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("imgforge init");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let loaded = load_config(&temp.path().join("imgforge.toml")).expect("load");
    assert_eq!(loaded, BuildConfig::default());

    let status = imgforge()
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("imgforge init again");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[test]
fn check_config_rejects_invalid_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("bad.toml");
    fs::write(&path, "[hyperv]\nsecure_boot = true\n").expect("write");

    let output = imgforge()
        .args(["check-config", "--config"])
        .arg(&path)
        .output()
        .expect("imgforge check-config");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("generation = 2"));
}

#[test]
fn check_config_accepts_missing_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = imgforge()
        .current_dir(temp.path())
        .arg("check-config")
        .status()
        .expect("imgforge check-config");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn build_stops_before_any_step_when_powershell_is_missing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("imgforge.toml");
    fs::write(&path, "[hyperv]\npowershell = \"/nonexistent/powershell\"\n").expect("write");

    let output = imgforge()
        .args(["build", "--config"])
        .arg(&path)
        .output()
        .expect("imgforge build");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("hyper-v pre-flight checks"));
    assert!(String::from_utf8_lossy(&output.stdout).is_empty());
}
