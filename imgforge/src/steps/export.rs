//! Export the finished VM into the output directory.

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use crate::cancel::CancelToken;
use crate::core::types::StepAction;
use crate::state::{BuildState, Session};
use crate::step::{Step, halt};

#[derive(Debug, Clone)]
pub struct StepExport {
    pub output_dir: PathBuf,
}

impl StepExport {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl Step for StepExport {
    fn name(&self) -> &str {
        "export"
    }

    fn run(
        &mut self,
        cancel: &CancelToken,
        session: &Session<'_>,
        state: &mut BuildState,
    ) -> StepAction {
        session.ui.say("Exporting virtual machine...");
        if let Err(err) = session
            .driver
            .export_virtual_machine(cancel, &state.vm_name, &self.output_dir)
            .with_context(|| format!("export to {}", self.output_dir.display()))
        {
            return halt(session, state, err);
        }
        info!(output_dir = %self.output_dir.display(), "export finished");
        state.exported = Some(self.output_dir.clone());
        StepAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingDriver, RecordingUi};

    #[test]
    fn records_export_location() {
        let driver = RecordingDriver::new();
        let ui = RecordingUi::new();
        let session = Session::new(&driver, &ui);
        let mut state = BuildState::new("vm");

        let action = StepExport::new("output").run(&CancelToken::new(), &session, &mut state);
        assert_eq!(action, StepAction::Continue);
        assert_eq!(state.exported, Some(PathBuf::from("output")));
        assert_eq!(driver.calls(), ["export_virtual_machine(vm, output)"]);
    }

    #[test]
    fn failure_leaves_no_record() {
        let driver = RecordingDriver::new().failing("export_virtual_machine", "disk full");
        let ui = RecordingUi::new();
        let session = Session::new(&driver, &ui);
        let mut state = BuildState::new("vm");

        let action = StepExport::new("output").run(&CancelToken::new(), &session, &mut state);
        assert_eq!(action, StepAction::Halt);
        assert!(state.exported.is_none());
    }
}
