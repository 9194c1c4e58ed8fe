//! Mount a floppy image (answer files, drivers) on generation 1 VMs.

use anyhow::Context;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::core::types::StepAction;
use crate::state::{BuildState, Session};
use crate::step::{Step, halt};

#[derive(Debug, Default)]
pub struct StepMountFloppy;

impl Step for StepMountFloppy {
    fn name(&self) -> &str {
        "mount-floppy"
    }

    fn run(
        &mut self,
        cancel: &CancelToken,
        session: &Session<'_>,
        state: &mut BuildState,
    ) -> StepAction {
        let Some(path) = state.floppy_path.clone() else {
            debug!("no floppy image, not mounting");
            return StepAction::Continue;
        };
        session
            .ui
            .say(&format!("Mounting floppy drive {} ...", path.display()));
        if let Err(err) = session
            .driver
            .mount_floppy_drive(cancel, &state.vm_name, &path)
            .context("mount floppy drive")
        {
            return halt(session, state, err);
        }
        state.floppy_mounted = true;
        StepAction::Continue
    }

    fn cleanup(&mut self, session: &Session<'_>, state: &mut BuildState) {
        if !state.floppy_mounted {
            return;
        }
        state.floppy_mounted = false;
        session.ui.say("Cleanup floppy drive...");
        if let Err(err) = session
            .driver
            .unmount_floppy_drive(&CancelToken::new(), &state.vm_name)
        {
            warn!(err = %err, "error unmounting floppy drive");
        }
    }
}
