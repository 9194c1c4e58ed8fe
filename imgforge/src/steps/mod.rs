//! Concrete build steps.

pub mod create_switch;
pub mod create_vm;
pub mod export;
pub mod mount_dvd;
pub mod mount_floppy;
pub mod provision;
pub mod run_vm;

pub use create_switch::StepCreateSwitch;
pub use create_vm::StepCreateVm;
pub use export::StepExport;
pub use mount_dvd::StepMountDvdDrive;
pub use mount_floppy::StepMountFloppy;
pub use provision::{StepProvision, Upload};
pub use run_vm::StepRunVm;
