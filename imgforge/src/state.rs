//! Typed state shared by the steps of one build.

use std::path::PathBuf;

use tracing::debug;

use crate::communicator::Communicator;
use crate::core::types::{DvdControllerProperties, Generation, SwitchRecord};
use crate::driver::Driver;
use crate::ui::Ui;

/// Everything steps read and write during a build.
///
/// Inputs are set by whoever starts the build. The remaining fields are
/// records written by the step that acquired a resource and read back by its
/// cleanup. `None` / `false` means "not applicable" or "not acquired", never
/// an error.
#[derive(Debug, Default)]
pub struct BuildState {
    pub vm_name: String,
    pub iso_path: Option<PathBuf>,
    pub floppy_path: Option<PathBuf>,
    pub generation: Generation,
    pub switch_name: Option<String>,
    pub output_dir: Option<PathBuf>,

    /// DVD drive attached by the media step.
    pub dvd: Option<DvdControllerProperties>,
    pub switch: Option<SwitchRecord>,
    pub vm_created: bool,
    pub floppy_mounted: bool,
    pub vm_started: bool,
    pub exported: Option<PathBuf>,

    /// First fatal error of the forward pass.
    pub error: Option<anyhow::Error>,
}

impl BuildState {
    pub fn new(vm_name: impl Into<String>) -> Self {
        Self {
            vm_name: vm_name.into(),
            ..Self::default()
        }
    }

    /// Record `err` unless an earlier error is already recorded.
    pub fn record_error(&mut self, err: anyhow::Error) {
        if self.error.is_some() {
            debug!(err = %format!("{err:#}"), "keeping earlier error");
            return;
        }
        self.error = Some(err);
    }
}

/// Handles a build borrows from its caller. Steps use them but never own or
/// dispose of them.
#[derive(Clone, Copy)]
pub struct Session<'a> {
    pub driver: &'a dyn Driver,
    pub ui: &'a dyn Ui,
    pub communicator: Option<&'a dyn Communicator>,
}

impl<'a> Session<'a> {
    pub fn new(driver: &'a dyn Driver, ui: &'a dyn Ui) -> Self {
        Self {
            driver,
            ui,
            communicator: None,
        }
    }

    pub fn with_communicator(mut self, communicator: &'a dyn Communicator) -> Self {
        self.communicator = Some(communicator);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn record_error_keeps_the_first() {
        let mut state = BuildState::new("vm");
        state.record_error(anyhow!("first"));
        state.record_error(anyhow!("second"));
        assert_eq!(state.error.expect("error").to_string(), "first");
    }

    #[test]
    fn new_state_has_no_records() {
        let state = BuildState::new("vm");
        assert_eq!(state.vm_name, "vm");
        assert!(state.dvd.is_none());
        assert!(!state.vm_created);
        assert_eq!(state.generation, Generation::One);
    }
}
