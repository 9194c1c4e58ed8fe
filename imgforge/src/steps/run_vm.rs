//! Power the VM on, and off again during cleanup.

use tracing::warn;

use crate::cancel::CancelToken;
use crate::core::types::StepAction;
use crate::state::{BuildState, Session};
use crate::step::{Step, halt};

#[derive(Debug, Default)]
pub struct StepRunVm;

impl Step for StepRunVm {
    fn name(&self) -> &str {
        "run-vm"
    }

    fn run(
        &mut self,
        cancel: &CancelToken,
        session: &Session<'_>,
        state: &mut BuildState,
    ) -> StepAction {
        session.ui.say("Starting the virtual machine...");
        if let Err(err) = session.driver.start(cancel, &state.vm_name) {
            // Start-VM may have gone through before the call was killed;
            // cleanup asks the host rather than assuming.
            if err.is_cancelled() {
                state.vm_started = true;
            }
            let err = anyhow::Error::new(err).context("start virtual machine");
            return halt(session, state, err);
        }
        state.vm_started = true;
        StepAction::Continue
    }

    fn cleanup(&mut self, session: &Session<'_>, state: &mut BuildState) {
        if !state.vm_started {
            return;
        }
        state.vm_started = false;
        let cancel = CancelToken::new();
        match session.driver.is_running(&cancel, &state.vm_name) {
            Ok(true) => {
                session.ui.say("Stopping virtual machine...");
                if let Err(err) = session.driver.stop(&cancel, &state.vm_name) {
                    warn!(err = %err, "error stopping virtual machine");
                }
            }
            Ok(false) => {}
            Err(err) => warn!(err = %err, "could not determine whether the vm is running"),
        }
    }
}
