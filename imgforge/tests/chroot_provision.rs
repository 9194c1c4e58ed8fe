//! Provisioning through the chroot decorator.

use std::path::PathBuf;

use imgforge::build::run_build;
use imgforge::cancel::CancelToken;
use imgforge::communicator::ChrootCommunicator;
use imgforge::core::types::BuildOutcome;
use imgforge::core::wrapper::TemplateWrapper;
use imgforge::driver::NullDriver;
use imgforge::io::config::{BuildConfig, TargetKind, UploadConfig};
use imgforge::test_support::{RecordingCommunicator, RecordingUi, TransferCall, source_tree};

fn chroot_config() -> BuildConfig {
    let mut config = BuildConfig {
        vm_name: "rootfs".to_string(),
        target: TargetKind::Chroot,
        ..BuildConfig::default()
    };
    config.chroot.root = PathBuf::from("/srv/rootfs");
    config
}

#[test]
fn commands_run_inside_root_with_env_and_wrapper() {
    let mut config = chroot_config();
    config.chroot.env.insert("LANG".to_string(), "C".to_string());
    config.provision.commands = vec!["locale".to_string()];
    let comm = ChrootCommunicator::new(
        &config.chroot.root,
        TemplateWrapper::new("nice -n 10 {{ command }}").expect("template"),
        RecordingCommunicator::new(),
    );
    let ui = RecordingUi::new();

    let (outcome, _) = run_build(&config, &CancelToken::new(), &NullDriver, &ui, Some(&comm));

    assert_eq!(outcome, BuildOutcome::Completed);
    assert_eq!(
        comm.inner().commands(),
        [r"nice -n 10 sudo chroot '/srv/rootfs' /bin/sh -c 'LANG='\''C'\'' locale'"]
    );
}

#[test]
fn uploads_are_confined_to_root() {
    let sources = source_tree(&[("motd", "welcome\n"), ("site/index.html", "<h1>hi</h1>")]);
    let mut config = chroot_config();
    config.provision.uploads = vec![
        UploadConfig {
            source: sources.path().join("motd"),
            destination: "/etc/../etc/motd".to_string(),
        },
        UploadConfig {
            source: sources.path().join("site"),
            destination: "/var/www/".to_string(),
        },
    ];
    let comm = ChrootCommunicator::new(
        &config.chroot.root,
        TemplateWrapper::new("{{ command }}").expect("template"),
        RecordingCommunicator::new(),
    );
    let ui = RecordingUi::new();

    let (outcome, _) = run_build(&config, &CancelToken::new(), &NullDriver, &ui, Some(&comm));

    assert_eq!(outcome, BuildOutcome::Completed);
    assert_eq!(
        comm.inner().transfers(),
        [
            TransferCall::Upload {
                dst: PathBuf::from("/srv/rootfs/etc/motd")
            },
            TransferCall::UploadDir {
                dst: PathBuf::from("/srv/rootfs/var/www"),
                src: sources.path().join("site"),
            },
        ]
    );
    assert_eq!(comm.inner().uploaded(), [b"welcome\n".to_vec()]);
}

#[test]
fn failing_command_halts_the_build() {
    let mut config = chroot_config();
    config.provision.commands = vec!["exit 3".to_string(), "echo unreachable".to_string()];
    let comm = ChrootCommunicator::new(
        &config.chroot.root,
        TemplateWrapper::new("{{ command }}").expect("template"),
        RecordingCommunicator::new().with_exit_status(3),
    );
    let ui = RecordingUi::new();

    let (outcome, state) =
        run_build(&config, &CancelToken::new(), &NullDriver, &ui, Some(&comm));

    assert!(matches!(outcome, BuildOutcome::Halted { .. }));
    assert!(state.error.is_some());
    assert_eq!(comm.inner().commands().len(), 1);
}
