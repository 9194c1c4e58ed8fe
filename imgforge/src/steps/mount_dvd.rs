//! Attach the install ISO as the VM's boot DVD.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::core::types::{DvdControllerProperties, MediaKind, StepAction};
use crate::state::{BuildState, Session};
use crate::step::{Step, halt};

/// Creates a DVD drive, makes it the boot device, and mounts the ISO in it.
///
/// A missing ISO or a disk image (`.vhd`/`.vhdx`) is not this step's concern
/// and is skipped without touching the driver.
#[derive(Debug, Default)]
pub struct StepMountDvdDrive;

impl StepMountDvdDrive {
    pub fn new() -> Self {
        Self
    }

    fn attach(
        &self,
        cancel: &CancelToken,
        session: &Session<'_>,
        state: &mut BuildState,
        iso_path: &Path,
    ) -> Result<()> {
        let driver = session.driver;
        let vm_name = state.vm_name.clone();
        let generation = state.generation;

        let (number, location) = driver
            .create_dvd_drive(cancel, &vm_name, iso_path, generation)
            .context("create dvd drive")?;
        state.dvd = Some(DvdControllerProperties::created(number, location));

        session.ui.say(&format!(
            "Setting boot drive to os dvd drive {} ...",
            iso_path.display()
        ));
        driver
            .set_boot_dvd_drive(cancel, &vm_name, number, location, generation)
            .context("mount dvd drive")?;

        session
            .ui
            .say(&format!("Mounting os dvd drive {} ...", iso_path.display()));
        driver
            .mount_dvd_drive(cancel, &vm_name, iso_path, number, location)
            .context("mount dvd drive")?;
        Ok(())
    }
}

impl Step for StepMountDvdDrive {
    fn name(&self) -> &str {
        "mount-dvd-drive"
    }

    fn run(
        &mut self,
        cancel: &CancelToken,
        session: &Session<'_>,
        state: &mut BuildState,
    ) -> StepAction {
        let Some(iso_path) = state.iso_path.clone() else {
            debug!("no dvd disk, not attaching");
            return StepAction::Continue;
        };
        if MediaKind::from_path(&iso_path) == MediaKind::DiskImage {
            debug!(path = %iso_path.display(), "hard disk image, not attaching");
            return StepAction::Continue;
        }
        match self.attach(cancel, session, state, &iso_path) {
            Ok(()) => StepAction::Continue,
            Err(err) => halt(session, state, err),
        }
    }

    fn cleanup(&mut self, session: &Session<'_>, state: &mut BuildState) {
        let Some(dvd) = state.dvd.take() else {
            return;
        };
        session.ui.say("Clean up os dvd drive...");
        let cancel = CancelToken::new();
        let vm_name = &state.vm_name;
        if dvd.existing {
            if let Err(err) = session.driver.unmount_dvd_drive(
                &cancel,
                vm_name,
                dvd.controller_number,
                dvd.controller_location,
            ) {
                warn!(err = %err, "error unmounting os dvd drive");
            }
        } else if let Err(err) = session.driver.delete_dvd_drive(
            &cancel,
            vm_name,
            dvd.controller_number,
            dvd.controller_location,
        ) {
            warn!(err = %err, "error deleting os dvd drive");
        }
    }
}
