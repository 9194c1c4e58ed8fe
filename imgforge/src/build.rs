//! Assemble the step list for a configured target and run it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::cancel::CancelToken;
use crate::communicator::{ChrootCommunicator, Communicator, LocalCommunicator};
use crate::core::types::BuildOutcome;
use crate::core::wrapper::{EnvPrefix, TemplateWrapper};
use crate::driver::{Driver, NewVmSpec};
use crate::io::config::{BuildConfig, TargetKind};
use crate::pipeline::Pipeline;
use crate::state::{BuildState, Session};
use crate::step::Step;
use crate::steps::{
    StepCreateSwitch, StepCreateVm, StepExport, StepMountDvdDrive, StepMountFloppy,
    StepProvision, StepRunVm, Upload,
};
use crate::ui::Ui;

/// Block size of newly created VHDX disks.
const DISK_BLOCK_SIZE_MB: u64 = 32;

/// Steps for `config.target`, in execution order.
pub fn steps_for(config: &BuildConfig) -> Vec<Box<dyn Step>> {
    match config.target {
        TargetKind::Hyperv => hyperv_steps(config),
        TargetKind::Chroot => vec![Box::new(provision_step(config))],
    }
}

fn hyperv_steps(config: &BuildConfig) -> Vec<Box<dyn Step>> {
    let hv = &config.hyperv;
    let spec = NewVmSpec {
        vm_name: config.vm_name.clone(),
        path: hv.output_dir.clone(),
        hard_drive_path: None,
        ram_mb: hv.memory_mb,
        disk_size_mb: hv.disk_size_mb,
        disk_block_size_mb: DISK_BLOCK_SIZE_MB,
        switch_name: hv.switch_name.clone(),
        generation: hv.generation,
        differencing_disk: false,
        fixed_vhd: false,
        version: None,
    };
    let create_vm = StepCreateVm {
        cpus: hv.cpus,
        dynamic_memory: hv.dynamic_memory,
        secure_boot: hv.secure_boot,
        ..StepCreateVm::new(spec)
    };

    let mut steps: Vec<Box<dyn Step>> = vec![
        Box::new(StepCreateSwitch::new(&hv.switch_name, &hv.switch_type)),
        Box::new(create_vm),
        Box::new(StepMountDvdDrive::new()),
        Box::new(StepMountFloppy),
        Box::new(StepRunVm),
        Box::new(provision_step(config)),
    ];
    if hv.export {
        steps.push(Box::new(StepExport::new(&hv.output_dir)));
    }
    steps
}

fn provision_step(config: &BuildConfig) -> StepProvision {
    let uploads = config
        .provision
        .uploads
        .iter()
        .map(|upload| Upload {
            source: upload.source.clone(),
            destination: PathBuf::from(&upload.destination),
        })
        .collect();
    let step = StepProvision::new(uploads, config.provision.commands.clone());
    match config.target {
        TargetKind::Chroot => step.with_env(EnvPrefix::new(config.chroot.env.clone())),
        TargetKind::Hyperv => step,
    }
}

/// Local shell confined to `config.chroot.root`, with the configured wrapper
/// applied to every command.
pub fn chroot_communicator(
    config: &BuildConfig,
) -> Result<ChrootCommunicator<LocalCommunicator>> {
    let wrapper =
        TemplateWrapper::new(&config.chroot.command_wrapper).context("chroot.command_wrapper")?;
    Ok(ChrootCommunicator::new(
        &config.chroot.root,
        wrapper,
        LocalCommunicator::new(config.command_output_limit_bytes),
    ))
}

fn initial_state(config: &BuildConfig) -> BuildState {
    let mut state = BuildState::new(&config.vm_name);
    if config.target == TargetKind::Hyperv {
        let hv = &config.hyperv;
        state.iso_path = hv.iso_path.clone();
        state.floppy_path = hv.floppy_path.clone();
        state.generation = hv.generation;
        state.output_dir = Some(hv.output_dir.clone());
    }
    state
}

/// Run every step for `config` against the given backend handles.
///
/// The returned state holds whatever records survived cleanup, plus the
/// build error if one was recorded.
#[instrument(skip_all, fields(vm = %config.vm_name, kind = ?config.target))]
pub fn run_build(
    config: &BuildConfig,
    cancel: &CancelToken,
    driver: &dyn Driver,
    ui: &dyn Ui,
    communicator: Option<&dyn Communicator>,
) -> (BuildOutcome, BuildState) {
    let mut session = Session::new(driver, ui);
    if let Some(communicator) = communicator {
        session = session.with_communicator(communicator);
    }
    let mut state = initial_state(config);
    let mut pipeline = Pipeline::new(steps_for(config));
    info!(steps = pipeline.len(), "starting build");
    let outcome = pipeline.run(cancel, &session, &mut state);
    (outcome, state)
}
