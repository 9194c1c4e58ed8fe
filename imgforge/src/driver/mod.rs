//! Capability driver: the one interface steps use to talk to a hypervisor.
//!
//! Some operations are narrow because they exist to serve one step; they keep
//! backend differences out of the steps. Every method has a default body that
//! fails with [`BackendError::Unsupported`], so a partial backend reports the
//! gap instead of silently doing nothing.

pub mod hyperv;
mod scripts;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cancel::CancelToken;
use crate::core::types::Generation;
use crate::error::BackendError;

pub use hyperv::HypervDriver;

/// Parameters for [`Driver::create_virtual_machine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewVmSpec {
    pub vm_name: String,
    /// Directory holding the VM configuration and, unless `hard_drive_path`
    /// is set, its new disk.
    pub path: PathBuf,
    /// Attach this existing disk instead of creating an empty one.
    pub hard_drive_path: Option<PathBuf>,
    pub ram_mb: u64,
    pub disk_size_mb: u64,
    pub disk_block_size_mb: u64,
    pub switch_name: String,
    pub generation: Generation,
    /// Create a differencing disk on top of `hard_drive_path`.
    pub differencing_disk: bool,
    pub fixed_vhd: bool,
    /// Hyper-V configuration version, e.g. `8.0`.
    pub version: Option<String>,
}

/// Parameters for [`Driver::add_virtual_machine_hard_drive`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardDriveSpec {
    pub vm_name: String,
    pub vhd_dir: PathBuf,
    pub vhd_name: String,
    pub size_bytes: u64,
    pub block_size_bytes: u64,
    /// `IDE` or `SCSI`.
    pub controller_type: String,
}

/// Parameters for [`Driver::clone_virtual_machine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloneVmSpec {
    /// Exported `.vmcx` directory to import from.
    pub from_vmcx_path: Option<PathBuf>,
    /// Existing VM to export and import from.
    pub from_vm_name: Option<String>,
    pub from_snapshot_name: Option<String>,
    pub all_snapshots: bool,
    pub vm_name: String,
    pub path: PathBuf,
    pub ram_mb: u64,
    pub switch_name: String,
    /// Keep the copied VHDs next to the imported VM instead of in place.
    pub copy: bool,
}

/// An open console connection to a VM, returned by [`Driver::connect`].
///
/// The connection owns its own token; [`Driver::disconnect`] fires it so any
/// work tied to the connection stops.
#[derive(Debug)]
pub struct Connection {
    vm_name: String,
    process_id: Option<u32>,
    cancel: CancelToken,
}

impl Connection {
    pub fn new(vm_name: impl Into<String>, process_id: Option<u32>) -> Self {
        Self {
            vm_name: vm_name.into(),
            process_id,
            cancel: CancelToken::new(),
        }
    }

    pub fn vm_name(&self) -> &str {
        &self.vm_name
    }

    pub fn process_id(&self) -> Option<u32> {
        self.process_id
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Everything a build step may ask of a virtualization backend.
///
/// VMs are identified by name. Address lookups fail with
/// [`BackendError::NoAnswer`] when the backend has nothing to report yet, and
/// with [`BackendError::Backend`] when the call itself failed.
pub trait Driver: Send + Sync {
    fn is_running(&self, _cancel: &CancelToken, _vm_name: &str) -> Result<bool, BackendError> {
        Err(BackendError::unsupported("is_running"))
    }

    fn is_off(&self, _cancel: &CancelToken, _vm_name: &str) -> Result<bool, BackendError> {
        Err(BackendError::unsupported("is_off"))
    }

    /// Seconds since the VM was started.
    fn uptime(&self, _cancel: &CancelToken, _vm_name: &str) -> Result<u64, BackendError> {
        Err(BackendError::unsupported("uptime"))
    }

    fn start(&self, _cancel: &CancelToken, _vm_name: &str) -> Result<(), BackendError> {
        Err(BackendError::unsupported("start"))
    }

    fn stop(&self, _cancel: &CancelToken, _vm_name: &str) -> Result<(), BackendError> {
        Err(BackendError::unsupported("stop"))
    }

    fn restart_virtual_machine(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("restart_virtual_machine"))
    }

    /// Pre-flight check. Fails with [`BackendError::Precondition`] when the
    /// backend cannot work on this host.
    fn verify(&self, _cancel: &CancelToken) -> Result<(), BackendError> {
        Err(BackendError::unsupported("verify"))
    }

    /// MAC address of the VM's first network adapter.
    fn mac(&self, _cancel: &CancelToken, _vm_name: &str) -> Result<String, BackendError> {
        Err(BackendError::unsupported("mac"))
    }

    /// IP address leased to the adapter with this MAC address.
    fn ip_address(&self, _cancel: &CancelToken, _mac: &str) -> Result<String, BackendError> {
        Err(BackendError::unsupported("ip_address"))
    }

    fn get_host_name(&self, _cancel: &CancelToken, _ip: &str) -> Result<String, BackendError> {
        Err(BackendError::unsupported("get_host_name"))
    }

    fn get_host_adapter_ip_address_for_switch(
        &self,
        _cancel: &CancelToken,
        _switch_name: &str,
    ) -> Result<String, BackendError> {
        Err(BackendError::unsupported(
            "get_host_adapter_ip_address_for_switch",
        ))
    }

    /// Type space-separated hex scan codes on the VM's virtual keyboard.
    fn type_scan_codes(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _scan_codes: &str,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("type_scan_codes"))
    }

    fn get_virtual_machine_network_adapter_address(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
    ) -> Result<String, BackendError> {
        Err(BackendError::unsupported(
            "get_virtual_machine_network_adapter_address",
        ))
    }

    fn set_network_adapter_vlan_id(
        &self,
        _cancel: &CancelToken,
        _switch_name: &str,
        _vlan_id: &str,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("set_network_adapter_vlan_id"))
    }

    fn set_virtual_machine_vlan_id(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _vlan_id: &str,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("set_virtual_machine_vlan_id"))
    }

    fn set_vm_network_adapter_mac_address(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _mac: &str,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported(
            "set_vm_network_adapter_mac_address",
        ))
    }

    /// Swap the VM's adapter for a legacy (`legacy = true`) or synthetic one.
    fn replace_virtual_machine_network_adapter(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _legacy: bool,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported(
            "replace_virtual_machine_network_adapter",
        ))
    }

    fn untag_virtual_machine_network_adapter_vlan(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _switch_name: &str,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported(
            "untag_virtual_machine_network_adapter_vlan",
        ))
    }

    fn create_external_virtual_switch(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _switch_name: &str,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("create_external_virtual_switch"))
    }

    fn get_virtual_machine_switch_name(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
    ) -> Result<String, BackendError> {
        Err(BackendError::unsupported("get_virtual_machine_switch_name"))
    }

    fn connect_virtual_machine_network_adapter_to_switch(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _switch_name: &str,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported(
            "connect_virtual_machine_network_adapter_to_switch",
        ))
    }

    /// Create the switch unless one with this name exists. Returns `true` only
    /// if this call created it.
    fn create_virtual_switch(
        &self,
        _cancel: &CancelToken,
        _switch_name: &str,
        _switch_type: &str,
    ) -> Result<bool, BackendError> {
        Err(BackendError::unsupported("create_virtual_switch"))
    }

    fn delete_virtual_switch(
        &self,
        _cancel: &CancelToken,
        _switch_name: &str,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("delete_virtual_switch"))
    }

    fn create_virtual_machine(
        &self,
        _cancel: &CancelToken,
        _spec: &NewVmSpec,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("create_virtual_machine"))
    }

    fn add_virtual_machine_hard_drive(
        &self,
        _cancel: &CancelToken,
        _spec: &HardDriveSpec,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("add_virtual_machine_hard_drive"))
    }

    fn clone_virtual_machine(
        &self,
        _cancel: &CancelToken,
        _spec: &CloneVmSpec,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("clone_virtual_machine"))
    }

    fn delete_virtual_machine(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("delete_virtual_machine"))
    }

    fn get_virtual_machine_generation(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
    ) -> Result<Generation, BackendError> {
        Err(BackendError::unsupported("get_virtual_machine_generation"))
    }

    fn set_virtual_machine_cpu_count(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _cpus: u32,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("set_virtual_machine_cpu_count"))
    }

    fn set_virtual_machine_mac_spoofing(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _enable: bool,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("set_virtual_machine_mac_spoofing"))
    }

    fn set_virtual_machine_dynamic_memory(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _enable: bool,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported(
            "set_virtual_machine_dynamic_memory",
        ))
    }

    fn set_virtual_machine_secure_boot(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _enable: bool,
        _template: Option<&str>,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("set_virtual_machine_secure_boot"))
    }

    fn set_virtual_machine_virtualization_extensions(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _enable: bool,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported(
            "set_virtual_machine_virtualization_extensions",
        ))
    }

    fn enable_virtual_machine_integration_service(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _service: &str,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported(
            "enable_virtual_machine_integration_service",
        ))
    }

    fn export_virtual_machine(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _path: &Path,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("export_virtual_machine"))
    }

    /// Flatten an export directory into the layout older releases produced.
    fn preserve_legacy_export_behaviour(
        &self,
        _cancel: &CancelToken,
        _src: &Path,
        _dst: &Path,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("preserve_legacy_export_behaviour"))
    }

    fn move_created_vhds_to_output_dir(
        &self,
        _cancel: &CancelToken,
        _src: &Path,
        _dst: &Path,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("move_created_vhds_to_output_dir"))
    }

    /// Compact every disk under `path`; returns a human-readable report.
    fn compact_disks(&self, _cancel: &CancelToken, _path: &Path) -> Result<String, BackendError> {
        Err(BackendError::unsupported("compact_disks"))
    }

    /// Add an empty DVD drive and return its `(controller_number,
    /// controller_location)`.
    fn create_dvd_drive(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _iso_path: &Path,
        _generation: Generation,
    ) -> Result<(u32, u32), BackendError> {
        Err(BackendError::unsupported("create_dvd_drive"))
    }

    fn mount_dvd_drive(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _path: &Path,
        _controller_number: u32,
        _controller_location: u32,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("mount_dvd_drive"))
    }

    fn set_boot_dvd_drive(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _controller_number: u32,
        _controller_location: u32,
        _generation: Generation,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("set_boot_dvd_drive"))
    }

    fn unmount_dvd_drive(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _controller_number: u32,
        _controller_location: u32,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("unmount_dvd_drive"))
    }

    fn delete_dvd_drive(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _controller_number: u32,
        _controller_location: u32,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("delete_dvd_drive"))
    }

    fn mount_floppy_drive(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
        _path: &Path,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("mount_floppy_drive"))
    }

    fn unmount_floppy_drive(
        &self,
        _cancel: &CancelToken,
        _vm_name: &str,
    ) -> Result<(), BackendError> {
        Err(BackendError::unsupported("unmount_floppy_drive"))
    }

    /// Open an interactive console to the VM.
    fn connect(&self, _cancel: &CancelToken, _vm_name: &str) -> Result<Connection, BackendError> {
        Err(BackendError::unsupported("connect"))
    }

    /// Close a connection returned by [`Driver::connect`].
    fn disconnect(&self, connection: Connection) -> Result<(), BackendError> {
        connection.close();
        Err(BackendError::unsupported("disconnect"))
    }
}

/// Driver for targets with no hypervisor (chroot builds). Verifies trivially;
/// every other capability is unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDriver;

impl Driver for NullDriver {
    fn verify(&self, _cancel: &CancelToken) -> Result<(), BackendError> {
        Ok(())
    }
}
