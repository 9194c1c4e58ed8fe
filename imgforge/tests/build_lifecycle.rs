//! End-to-end Hyper-V builds against a recording driver.
//!
//! Each test runs the full configured step list and checks which backend
//! resources were acquired and released, in order.

use std::path::PathBuf;

use imgforge::build::run_build;
use imgforge::cancel::CancelToken;
use imgforge::core::types::{BuildOutcome, Generation};
use imgforge::io::config::BuildConfig;
use imgforge::test_support::{RecordingDriver, RecordingUi};

fn config_with_iso() -> BuildConfig {
    let mut config = BuildConfig {
        vm_name: "web".to_string(),
        ..BuildConfig::default()
    };
    config.hyperv.iso_path = Some(PathBuf::from("install.iso"));
    config
}

#[test]
fn failed_mount_releases_everything_acquired() {
    let config = config_with_iso();
    let driver = RecordingDriver::new()
        .with_dvd_location(1, 0)
        .failing("mount_dvd_drive", "iso locked");
    let ui = RecordingUi::new();

    let (outcome, state) = run_build(&config, &CancelToken::new(), &driver, &ui, None);

    assert_eq!(
        outcome,
        BuildOutcome::Halted {
            error: "mount dvd drive: mount_dvd_drive failed: iso locked".to_string()
        }
    );
    assert!(state.dvd.is_none());
    assert_eq!(
        driver.calls(),
        [
            "create_virtual_switch(imgforge-switch, Internal)",
            "create_virtual_machine(web)",
            "set_virtual_machine_cpu_count(web, 1)",
            "create_dvd_drive(web, install.iso, 1)",
            "set_boot_dvd_drive(web, 1, 0, 1)",
            "mount_dvd_drive(web, install.iso, 1, 0)",
            "delete_dvd_drive(web, 1, 0)",
            "delete_virtual_machine(web)",
            "delete_virtual_switch(imgforge-switch)",
        ]
    );
    assert_eq!(
        ui.errors(),
        ["mount dvd drive: mount_dvd_drive failed: iso locked"]
    );
}

#[test]
fn existing_switch_survives_the_build() {
    let mut config = config_with_iso();
    config.hyperv.export = false;
    let driver = RecordingDriver::new().with_existing_switch();
    let ui = RecordingUi::new();

    let (outcome, _) = run_build(&config, &CancelToken::new(), &driver, &ui, None);

    assert_eq!(outcome, BuildOutcome::Completed);
    assert!(!driver.ops().contains(&"delete_virtual_switch".to_string()));
    assert!(
        ui.said()
            .iter()
            .any(|line| line.contains("already exists. Will not delete on cleanup"))
    );
}

#[test]
fn cancelled_start_is_reported_as_cancelled_and_cleaned_up() {
    let mut config = config_with_iso();
    config.hyperv.generation = Generation::Two;
    config.hyperv.floppy_path = None;
    // The killed Start-VM call got through: the host reports the VM running.
    let driver = RecordingDriver::new()
        .cancelling("start")
        .with_running(true);
    let ui = RecordingUi::new();

    let (outcome, _) = run_build(&config, &CancelToken::new(), &driver, &ui, None);

    assert_eq!(outcome, BuildOutcome::Cancelled);
    let ops = driver.ops();
    assert!(!ops.contains(&"export_virtual_machine".to_string()));
    let start = ops.iter().position(|op| op == "start").expect("start issued");
    assert_eq!(ops[start + 1..start + 3], ["is_running", "stop"]);
    assert_eq!(
        &ops[ops.len() - 3..],
        [
            "delete_dvd_drive",
            "delete_virtual_machine",
            "delete_virtual_switch"
        ]
    );
}

#[test]
fn pre_cancelled_build_touches_nothing() {
    let config = config_with_iso();
    let driver = RecordingDriver::new();
    let ui = RecordingUi::new();
    let cancel = CancelToken::new();
    cancel.cancel();

    let (outcome, _) = run_build(&config, &cancel, &driver, &ui, None);

    assert_eq!(outcome, BuildOutcome::Cancelled);
    assert!(driver.calls().is_empty());
}

#[test]
fn floppy_is_mounted_and_released() {
    let mut config = config_with_iso();
    config.hyperv.floppy_path = Some(PathBuf::from("answers.vfd"));
    config.hyperv.export = false;
    let driver = RecordingDriver::new();
    let ui = RecordingUi::new();

    let (outcome, state) = run_build(&config, &CancelToken::new(), &driver, &ui, None);

    assert_eq!(outcome, BuildOutcome::Completed);
    assert!(!state.floppy_mounted);
    let calls = driver.calls();
    assert!(calls.contains(&"mount_floppy_drive(web, answers.vfd)".to_string()));
    assert!(calls.contains(&"unmount_floppy_drive(web)".to_string()));
}
