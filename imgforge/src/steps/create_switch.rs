//! Create (or reuse) the virtual switch the build VM is attached to.

use anyhow::Context;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::core::types::{StepAction, SwitchRecord};
use crate::state::{BuildState, Session};
use crate::step::{Step, halt};

#[derive(Debug, Clone)]
pub struct StepCreateSwitch {
    pub switch_name: String,
    pub switch_type: String,
}

impl StepCreateSwitch {
    pub fn new(switch_name: impl Into<String>, switch_type: impl Into<String>) -> Self {
        Self {
            switch_name: switch_name.into(),
            switch_type: switch_type.into(),
        }
    }
}

impl Step for StepCreateSwitch {
    fn name(&self) -> &str {
        "create-switch"
    }

    fn run(
        &mut self,
        cancel: &CancelToken,
        session: &Session<'_>,
        state: &mut BuildState,
    ) -> StepAction {
        session
            .ui
            .say(&format!("Creating switch '{}' if required...", self.switch_name));
        let created = match session
            .driver
            .create_virtual_switch(cancel, &self.switch_name, &self.switch_type)
            .with_context(|| format!("create switch {}", self.switch_name))
        {
            Ok(created) => created,
            Err(err) => return halt(session, state, err),
        };
        if !created {
            session.ui.say(&format!(
                "    switch '{}' already exists. Will not delete on cleanup...",
                self.switch_name
            ));
        }
        info!(switch = %self.switch_name, created, "switch ready");
        state.switch_name = Some(self.switch_name.clone());
        state.switch = Some(SwitchRecord {
            name: self.switch_name.clone(),
            created,
        });
        StepAction::Continue
    }

    fn cleanup(&mut self, session: &Session<'_>, state: &mut BuildState) {
        let Some(record) = state.switch.take() else {
            return;
        };
        if !record.created {
            return;
        }
        session.ui.say("Unregistering and deleting switch...");
        if let Err(err) = session
            .driver
            .delete_virtual_switch(&CancelToken::new(), &record.name)
        {
            warn!(switch = %record.name, err = %err, "error deleting switch");
        }
    }
}
