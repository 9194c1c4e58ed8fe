//! Create and configure the build VM.

use anyhow::{Context, Result};
use tracing::warn;

use crate::cancel::CancelToken;
use crate::core::types::{Generation, StepAction};
use crate::driver::NewVmSpec;
use crate::state::{BuildState, Session};
use crate::step::{Step, halt};

#[derive(Debug, Clone)]
pub struct StepCreateVm {
    pub spec: NewVmSpec,
    pub cpus: u32,
    pub dynamic_memory: bool,
    pub secure_boot: bool,
}

impl StepCreateVm {
    pub fn new(spec: NewVmSpec) -> Self {
        Self {
            spec,
            cpus: 1,
            dynamic_memory: false,
            secure_boot: false,
        }
    }

    fn create(
        &self,
        cancel: &CancelToken,
        session: &Session<'_>,
        state: &mut BuildState,
    ) -> Result<()> {
        let driver = session.driver;
        let vm_name = &self.spec.vm_name;

        if let Err(err) = driver.create_virtual_machine(cancel, &self.spec) {
            // A cancelled call may have been killed after New-VM ran.
            if err.is_cancelled() {
                state.vm_created = true;
            }
            return Err(err).context("create virtual machine");
        }
        // From here on the VM exists and cleanup must remove it.
        state.vm_created = true;

        driver
            .set_virtual_machine_cpu_count(cancel, vm_name, self.cpus)
            .context("set cpu count")?;
        if self.dynamic_memory {
            driver
                .set_virtual_machine_dynamic_memory(cancel, vm_name, true)
                .context("enable dynamic memory")?;
        }
        if self.spec.generation == Generation::Two {
            driver
                .set_virtual_machine_secure_boot(cancel, vm_name, self.secure_boot, None)
                .context("set secure boot")?;
        }
        Ok(())
    }
}

impl Step for StepCreateVm {
    fn name(&self) -> &str {
        "create-vm"
    }

    fn run(
        &mut self,
        cancel: &CancelToken,
        session: &Session<'_>,
        state: &mut BuildState,
    ) -> StepAction {
        session.ui.say("Creating virtual machine...");
        match self.create(cancel, session, state) {
            Ok(()) => StepAction::Continue,
            Err(err) => halt(session, state, err),
        }
    }

    fn cleanup(&mut self, session: &Session<'_>, state: &mut BuildState) {
        if !state.vm_created {
            return;
        }
        state.vm_created = false;
        session.ui.say("Unregistering and deleting virtual machine...");
        if let Err(err) = session
            .driver
            .delete_virtual_machine(&CancelToken::new(), &self.spec.vm_name)
        {
            warn!(vm = %self.spec.vm_name, err = %err, "error deleting virtual machine");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingDriver, RecordingUi};

    fn spec(generation: Generation) -> NewVmSpec {
        NewVmSpec {
            vm_name: "vm".to_string(),
            path: "out".into(),
            hard_drive_path: None,
            ram_mb: 1024,
            disk_size_mb: 40960,
            disk_block_size_mb: 32,
            switch_name: "sw".to_string(),
            generation,
            differencing_disk: false,
            fixed_vhd: false,
            version: None,
        }
    }

    #[test]
    fn generation_two_configures_secure_boot() {
        let driver = RecordingDriver::new();
        let ui = RecordingUi::new();
        let session = Session::new(&driver, &ui);
        let mut state = BuildState::new("vm");
        let mut step = StepCreateVm {
            cpus: 2,
            dynamic_memory: true,
            secure_boot: true,
            ..StepCreateVm::new(spec(Generation::Two))
        };

        assert_eq!(
            step.run(&CancelToken::new(), &session, &mut state),
            StepAction::Continue
        );
        assert_eq!(
            driver.calls(),
            [
                "create_virtual_machine(vm)",
                "set_virtual_machine_cpu_count(vm, 2)",
                "set_virtual_machine_dynamic_memory(vm, true)",
                "set_virtual_machine_secure_boot(vm, true)"
            ]
        );
        assert!(state.vm_created);
    }

    #[test]
    fn configuration_failure_still_deletes_vm() {
        let driver = RecordingDriver::new().failing("set_virtual_machine_cpu_count", "too many");
        let ui = RecordingUi::new();
        let session = Session::new(&driver, &ui);
        let mut state = BuildState::new("vm");
        let mut step = StepCreateVm::new(spec(Generation::One));

        assert_eq!(
            step.run(&CancelToken::new(), &session, &mut state),
            StepAction::Halt
        );
        step.cleanup(&session, &mut state);
        assert_eq!(
            driver.ops(),
            [
                "create_virtual_machine",
                "set_virtual_machine_cpu_count",
                "delete_virtual_machine"
            ]
        );
        assert!(!state.vm_created);
    }

    #[test]
    fn failed_creation_leaves_nothing_to_delete() {
        let driver = RecordingDriver::new().failing("create_virtual_machine", "no space");
        let ui = RecordingUi::new();
        let session = Session::new(&driver, &ui);
        let mut state = BuildState::new("vm");
        let mut step = StepCreateVm::new(spec(Generation::One));

        step.run(&CancelToken::new(), &session, &mut state);
        step.cleanup(&session, &mut state);
        assert_eq!(driver.ops(), ["create_virtual_machine"]);
    }

    #[test]
    fn cancelled_creation_is_still_deleted() {
        let driver = RecordingDriver::new().cancelling("create_virtual_machine");
        let ui = RecordingUi::new();
        let session = Session::new(&driver, &ui);
        let mut state = BuildState::new("vm");
        let mut step = StepCreateVm::new(spec(Generation::One));

        assert_eq!(
            step.run(&CancelToken::new(), &session, &mut state),
            StepAction::Halt
        );
        step.cleanup(&session, &mut state);
        assert_eq!(
            driver.ops(),
            ["create_virtual_machine", "delete_virtual_machine"]
        );
    }
}
