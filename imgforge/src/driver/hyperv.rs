//! Hyper-V driver: every capability is a PowerShell script rendered from a
//! template and run through a [`PowerShell`] host.

use std::path::Path;

use minijinja::{Environment, UndefinedBehavior, Value, context};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::scripts::TEMPLATES;
use super::{CloneVmSpec, Connection, Driver, HardDriveSpec, NewVmSpec};
use crate::cancel::CancelToken;
use crate::core::types::Generation;
use crate::error::BackendError;
use crate::io::powershell::{PowerShell, is_false, is_true, ps_quote};

/// Template engine holding every Hyper-V script.
struct Scripts {
    env: Environment<'static>,
}

impl Scripts {
    fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_filter("ps", |value: String| ps_quote(&value));
        env.add_filter("psbool", |value: bool| {
            let literal = if value { "$true" } else { "$false" };
            literal.to_string()
        });
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)
                .expect("powershell template should be valid");
        }
        Self { env }
    }

    fn render(&self, name: &str, ctx: Value) -> Result<String, BackendError> {
        let template = self
            .env
            .get_template(name)
            .map_err(|err| BackendError::backend(name, format!("load script: {err}")))?;
        template
            .render(ctx)
            .map_err(|err| BackendError::backend(name, format!("render script: {err}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DvdLocation {
    controller_number: u32,
    controller_location: u32,
}

/// Drives a local Hyper-V host through PowerShell 4 or later.
pub struct HypervDriver<P: PowerShell> {
    ps: P,
    scripts: Scripts,
}

impl<P: PowerShell> HypervDriver<P> {
    /// Build a driver and run [`Driver::verify`]; a host that fails the
    /// pre-flight checks never yields a driver.
    pub fn new(ps: P, cancel: &CancelToken) -> Result<Self, BackendError> {
        let driver = Self::unverified(ps);
        driver.verify(cancel)?;
        info!("hyper-v driver verified");
        Ok(driver)
    }

    fn unverified(ps: P) -> Self {
        Self {
            ps,
            scripts: Scripts::new(),
        }
    }

    pub fn powershell(&self) -> &P {
        &self.ps
    }

    #[instrument(skip_all, fields(script = name))]
    fn run(&self, cancel: &CancelToken, name: &str, ctx: Value) -> Result<String, BackendError> {
        let script = self.scripts.render(name, ctx)?;
        let output = self.ps.output(cancel, &script).map_err(|err| match err {
            BackendError::Backend { message, .. } => BackendError::backend(name, message),
            other => other,
        })?;
        debug!(bytes = output.len(), "script finished");
        Ok(output)
    }

    fn run_unit(&self, cancel: &CancelToken, name: &str, ctx: Value) -> Result<(), BackendError> {
        self.run(cancel, name, ctx).map(|_| ())
    }

    fn run_bool(&self, cancel: &CancelToken, name: &str, ctx: Value) -> Result<bool, BackendError> {
        let output = self.run(cancel, name, ctx)?;
        if is_true(&output) {
            Ok(true)
        } else if is_false(&output) {
            Ok(false)
        } else {
            Err(unexpected(name, &output))
        }
    }

    /// Run a lookup whose empty output means "nothing yet".
    fn run_answer(
        &self,
        cancel: &CancelToken,
        name: &str,
        what: &str,
        ctx: Value,
    ) -> Result<String, BackendError> {
        let output = self.run(cancel, name, ctx)?;
        if output.is_empty() {
            return Err(BackendError::no_answer(what));
        }
        Ok(output)
    }

    fn verify_ps_version(&self, cancel: &CancelToken) -> Result<(), BackendError> {
        let output = self.run(cancel, "ps_version", context! {})?;
        let major: i64 = output
            .parse()
            .map_err(|_| unexpected("ps_version", &output))?;
        debug!(major, "powershell version");
        if major < 4 {
            return Err(BackendError::Precondition(
                "Windows PowerShell version 4.0 or higher is expected".to_string(),
            ));
        }
        Ok(())
    }

    fn verify_hyperv_module(&self, cancel: &CancelToken) -> Result<(), BackendError> {
        let output = self.run(cancel, "hyperv_module", context! {})?;
        if is_false(&output) {
            return Err(BackendError::Precondition(
                "PS Hyper-V module is not loaded. Make sure Hyper-V feature is on.".to_string(),
            ));
        }
        Ok(())
    }

    fn verify_permissions(&self, cancel: &CancelToken) -> Result<(), BackendError> {
        let hyperv_admin = match self.run(cancel, "is_hyperv_admin", context! {}) {
            Ok(output) => is_true(&output),
            Err(BackendError::Cancelled) => return Err(BackendError::Cancelled),
            Err(err) => {
                warn!(err = %err, "could not determine Hyper-V Administrators membership");
                false
            }
        };
        if hyperv_admin {
            return Ok(());
        }
        let admin = match self.run(cancel, "is_admin", context! {}) {
            Ok(output) => is_true(&output),
            Err(BackendError::Cancelled) => return Err(BackendError::Cancelled),
            Err(_) => false,
        };
        if !admin {
            return Err(BackendError::Precondition(
                "Current user is not a member of 'Hyper-V Administrators' or 'Administrators' group"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn unexpected(name: &str, output: &str) -> BackendError {
    BackendError::backend(name, format!("unexpected output '{output}'"))
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

impl<P: PowerShell> Driver for HypervDriver<P> {
    fn is_running(&self, cancel: &CancelToken, vm_name: &str) -> Result<bool, BackendError> {
        self.run_bool(cancel, "is_running", context! { vm_name })
    }

    fn is_off(&self, cancel: &CancelToken, vm_name: &str) -> Result<bool, BackendError> {
        self.run_bool(cancel, "is_off", context! { vm_name })
    }

    fn uptime(&self, cancel: &CancelToken, vm_name: &str) -> Result<u64, BackendError> {
        let output = self.run(cancel, "uptime", context! { vm_name })?;
        output.parse().map_err(|_| unexpected("uptime", &output))
    }

    fn start(&self, cancel: &CancelToken, vm_name: &str) -> Result<(), BackendError> {
        self.run_unit(cancel, "start_vm", context! { vm_name })
    }

    fn stop(&self, cancel: &CancelToken, vm_name: &str) -> Result<(), BackendError> {
        self.run_unit(cancel, "stop_vm", context! { vm_name })
    }

    fn restart_virtual_machine(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
    ) -> Result<(), BackendError> {
        self.run_unit(cancel, "restart_vm", context! { vm_name })
    }

    fn verify(&self, cancel: &CancelToken) -> Result<(), BackendError> {
        self.verify_ps_version(cancel)?;
        self.verify_hyperv_module(cancel)?;
        self.verify_permissions(cancel)
    }

    fn mac(&self, cancel: &CancelToken, vm_name: &str) -> Result<String, BackendError> {
        self.run_answer(cancel, "mac", "mac address", context! { vm_name })
    }

    fn ip_address(&self, cancel: &CancelToken, mac: &str) -> Result<String, BackendError> {
        self.run_answer(cancel, "ip_address", "ip address", context! { mac })
    }

    fn get_host_name(&self, cancel: &CancelToken, ip: &str) -> Result<String, BackendError> {
        self.run_answer(cancel, "host_name", "host name", context! { ip })
    }

    fn get_host_adapter_ip_address_for_switch(
        &self,
        cancel: &CancelToken,
        switch_name: &str,
    ) -> Result<String, BackendError> {
        self.run_answer(
            cancel,
            "host_adapter_ip",
            "ip address",
            context! { switch_name },
        )
    }

    fn type_scan_codes(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        scan_codes: &str,
    ) -> Result<(), BackendError> {
        if scan_codes.trim().is_empty() {
            return Ok(());
        }
        self.run_unit(cancel, "type_scan_codes", context! { vm_name, scan_codes })
    }

    fn get_virtual_machine_network_adapter_address(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
    ) -> Result<String, BackendError> {
        self.run(cancel, "vm_adapter_address", context! { vm_name })
    }

    fn set_network_adapter_vlan_id(
        &self,
        cancel: &CancelToken,
        switch_name: &str,
        vlan_id: &str,
    ) -> Result<(), BackendError> {
        self.run_unit(cancel, "set_switch_vlan", context! { switch_name, vlan_id })
    }

    fn set_virtual_machine_vlan_id(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        vlan_id: &str,
    ) -> Result<(), BackendError> {
        self.run_unit(cancel, "set_vm_vlan", context! { vm_name, vlan_id })
    }

    fn set_vm_network_adapter_mac_address(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        mac: &str,
    ) -> Result<(), BackendError> {
        self.run_unit(cancel, "set_vm_mac", context! { vm_name, mac })
    }

    fn replace_virtual_machine_network_adapter(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        legacy: bool,
    ) -> Result<(), BackendError> {
        self.run_unit(cancel, "replace_adapter", context! { vm_name, legacy })
    }

    fn untag_virtual_machine_network_adapter_vlan(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        switch_name: &str,
    ) -> Result<(), BackendError> {
        self.run_unit(cancel, "untag_vlan", context! { vm_name, switch_name })
    }

    fn create_external_virtual_switch(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        switch_name: &str,
    ) -> Result<(), BackendError> {
        self.run_unit(
            cancel,
            "create_external_switch",
            context! { vm_name, switch_name },
        )
    }

    fn get_virtual_machine_switch_name(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
    ) -> Result<String, BackendError> {
        self.run(cancel, "vm_switch_name", context! { vm_name })
    }

    fn connect_virtual_machine_network_adapter_to_switch(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        switch_name: &str,
    ) -> Result<(), BackendError> {
        self.run_unit(cancel, "connect_adapter", context! { vm_name, switch_name })
    }

    fn create_virtual_switch(
        &self,
        cancel: &CancelToken,
        switch_name: &str,
        switch_type: &str,
    ) -> Result<bool, BackendError> {
        self.run_bool(cancel, "create_switch", context! { switch_name, switch_type })
    }

    fn delete_virtual_switch(
        &self,
        cancel: &CancelToken,
        switch_name: &str,
    ) -> Result<(), BackendError> {
        self.run_unit(cancel, "delete_switch", context! { switch_name })
    }

    fn create_virtual_machine(
        &self,
        cancel: &CancelToken,
        spec: &NewVmSpec,
    ) -> Result<(), BackendError> {
        if spec.differencing_disk && spec.hard_drive_path.is_none() {
            return Err(BackendError::backend(
                "create_vm",
                "a differencing disk needs a parent hard drive path",
            ));
        }
        self.run_unit(cancel, "create_vm", context! { spec })
    }

    fn add_virtual_machine_hard_drive(
        &self,
        cancel: &CancelToken,
        spec: &HardDriveSpec,
    ) -> Result<(), BackendError> {
        self.run_unit(cancel, "add_hard_drive", context! { spec })
    }

    fn clone_virtual_machine(
        &self,
        cancel: &CancelToken,
        spec: &CloneVmSpec,
    ) -> Result<(), BackendError> {
        if spec.from_vm_name.is_none() && spec.from_vmcx_path.is_none() {
            return Err(BackendError::backend(
                "clone_vm",
                "either a source VM name or an exported .vmcx path is required",
            ));
        }
        self.run_unit(cancel, "clone_vm", context! { spec })
    }

    fn delete_virtual_machine(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
    ) -> Result<(), BackendError> {
        self.run_unit(cancel, "delete_vm", context! { vm_name })
    }

    fn get_virtual_machine_generation(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
    ) -> Result<Generation, BackendError> {
        let output = self.run(cancel, "vm_generation", context! { vm_name })?;
        output
            .parse::<u32>()
            .ok()
            .and_then(|value| Generation::try_from(value).ok())
            .ok_or_else(|| unexpected("vm_generation", &output))
    }

    fn set_virtual_machine_cpu_count(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        cpus: u32,
    ) -> Result<(), BackendError> {
        self.run_unit(cancel, "set_cpu_count", context! { vm_name, cpus })
    }

    fn set_virtual_machine_mac_spoofing(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        enable: bool,
    ) -> Result<(), BackendError> {
        self.run_unit(cancel, "set_mac_spoofing", context! { vm_name, enable })
    }

    fn set_virtual_machine_dynamic_memory(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        enable: bool,
    ) -> Result<(), BackendError> {
        self.run_unit(cancel, "set_dynamic_memory", context! { vm_name, enable })
    }

    fn set_virtual_machine_secure_boot(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        enable: bool,
        template: Option<&str>,
    ) -> Result<(), BackendError> {
        self.run_unit(
            cancel,
            "set_secure_boot",
            context! { vm_name, enable, template },
        )
    }

    fn set_virtual_machine_virtualization_extensions(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        enable: bool,
    ) -> Result<(), BackendError> {
        self.run_unit(
            cancel,
            "set_virtualization_extensions",
            context! { vm_name, enable },
        )
    }

    fn enable_virtual_machine_integration_service(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        service: &str,
    ) -> Result<(), BackendError> {
        self.run_unit(
            cancel,
            "enable_integration_service",
            context! { vm_name, service },
        )
    }

    fn export_virtual_machine(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        path: &Path,
    ) -> Result<(), BackendError> {
        self.run_unit(
            cancel,
            "export_vm",
            context! { vm_name, path => path_str(path) },
        )
    }

    fn preserve_legacy_export_behaviour(
        &self,
        cancel: &CancelToken,
        src: &Path,
        dst: &Path,
    ) -> Result<(), BackendError> {
        self.run_unit(
            cancel,
            "preserve_legacy_export",
            context! { src => path_str(src), dst => path_str(dst) },
        )
    }

    fn move_created_vhds_to_output_dir(
        &self,
        cancel: &CancelToken,
        src: &Path,
        dst: &Path,
    ) -> Result<(), BackendError> {
        self.run_unit(
            cancel,
            "move_vhds",
            context! { src => path_str(src), dst => path_str(dst) },
        )
    }

    fn compact_disks(&self, cancel: &CancelToken, path: &Path) -> Result<String, BackendError> {
        self.run(cancel, "compact_disks", context! { path => path_str(path) })
    }

    fn create_dvd_drive(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        iso_path: &Path,
        generation: Generation,
    ) -> Result<(u32, u32), BackendError> {
        let output = self.run(
            cancel,
            "create_dvd",
            context! {
                vm_name,
                iso_path => path_str(iso_path),
                generation => generation.as_u32(),
            },
        )?;
        let location: DvdLocation =
            serde_json::from_str(&output).map_err(|_| unexpected("create_dvd", &output))?;
        Ok((location.controller_number, location.controller_location))
    }

    fn mount_dvd_drive(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        path: &Path,
        controller_number: u32,
        controller_location: u32,
    ) -> Result<(), BackendError> {
        self.run_unit(
            cancel,
            "mount_dvd",
            context! {
                vm_name,
                path => path_str(path),
                controller_number,
                controller_location,
            },
        )
    }

    fn set_boot_dvd_drive(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        controller_number: u32,
        controller_location: u32,
        generation: Generation,
    ) -> Result<(), BackendError> {
        self.run_unit(
            cancel,
            "set_boot_dvd",
            context! {
                vm_name,
                controller_number,
                controller_location,
                generation => generation.as_u32(),
            },
        )
    }

    fn unmount_dvd_drive(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        controller_number: u32,
        controller_location: u32,
    ) -> Result<(), BackendError> {
        self.run_unit(
            cancel,
            "unmount_dvd",
            context! { vm_name, controller_number, controller_location },
        )
    }

    fn delete_dvd_drive(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        controller_number: u32,
        controller_location: u32,
    ) -> Result<(), BackendError> {
        self.run_unit(
            cancel,
            "delete_dvd",
            context! { vm_name, controller_number, controller_location },
        )
    }

    fn mount_floppy_drive(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
        path: &Path,
    ) -> Result<(), BackendError> {
        self.run_unit(
            cancel,
            "mount_floppy",
            context! { vm_name, path => path_str(path) },
        )
    }

    fn unmount_floppy_drive(
        &self,
        cancel: &CancelToken,
        vm_name: &str,
    ) -> Result<(), BackendError> {
        self.run_unit(cancel, "unmount_floppy", context! { vm_name })
    }

    fn connect(&self, cancel: &CancelToken, vm_name: &str) -> Result<Connection, BackendError> {
        let output = self.run(cancel, "connect_vm", context! { vm_name })?;
        let process_id = output.parse().map_err(|_| unexpected("connect_vm", &output))?;
        Ok(Connection::new(vm_name, Some(process_id)))
    }

    fn disconnect(&self, connection: Connection) -> Result<(), BackendError> {
        connection.close();
        let Some(process_id) = connection.process_id() else {
            return Ok(());
        };
        // The connection's own token has just fired; closing the viewer must
        // not be cancelled by it.
        self.run_unit(
            &CancelToken::new(),
            "disconnect_vm",
            context! { process_id },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedPowerShell;

    fn driver(outputs: &[&str]) -> HypervDriver<ScriptedPowerShell> {
        HypervDriver::unverified(ScriptedPowerShell::new(outputs.iter().copied()))
    }

    #[test]
    fn every_template_parses() {
        let scripts = Scripts::new();
        for &(name, _) in TEMPLATES {
            assert!(scripts.env.get_template(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn new_runs_all_checks_in_order() {
        let cancel = CancelToken::new();
        let ps = ScriptedPowerShell::new(["5", "True", "True"]);
        let driver = HypervDriver::new(ps, &cancel).expect("verify");
        let scripts = driver.powershell().scripts();
        assert_eq!(scripts.len(), 3);
        assert_eq!(scripts[0], "$host.version.Major");
        assert!(scripts[1].contains("Get-Command -Module Hyper-V"));
        assert!(scripts[2].contains("S-1-5-32-578"));
    }

    #[test]
    fn verify_rejects_old_powershell() {
        let err = HypervDriver::new(ScriptedPowerShell::new(["3"]), &CancelToken::new())
            .err()
            .expect("old powershell must fail");
        assert!(matches!(err, BackendError::Precondition(_)));
        assert!(err.to_string().contains("version 4.0 or higher"));
    }

    #[test]
    fn verify_rejects_missing_module() {
        let err = driver(&["5", "False"])
            .verify(&CancelToken::new())
            .unwrap_err();
        assert!(err.to_string().contains("Hyper-V module is not loaded"));
    }

    #[test]
    fn verify_accepts_plain_administrators() {
        let driver = driver(&["5", "True", "False", "True"]);
        driver.verify(&CancelToken::new()).expect("verify");
        assert!(driver.powershell().scripts()[3].contains("WindowsBuiltInRole"));
    }

    #[test]
    fn verify_rejects_unprivileged_user() {
        let err = driver(&["5", "True", "False", "False"])
            .verify(&CancelToken::new())
            .unwrap_err();
        match err {
            BackendError::Precondition(msg) => assert!(msg.contains("'Administrators' group")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_address_is_no_answer() {
        let cancel = CancelToken::new();
        let driver = driver(&["", ""]);
        assert!(matches!(
            driver.mac(&cancel, "vm"),
            Err(BackendError::NoAnswer { ref what }) if what == "mac address"
        ));
        let err = driver.ip_address(&cancel, "00155D010203").unwrap_err();
        assert!(err.is_retriable());
    }

    #[test]
    fn failing_script_is_backend_error_named_after_script() {
        let ps = ScriptedPowerShell::new(Vec::<String>::new())
            .then_fail(BackendError::backend("powershell.exe", "access denied"));
        let driver = HypervDriver::unverified(ps);
        let err = driver.mac(&CancelToken::new(), "vm").unwrap_err();
        assert!(!err.is_retriable());
        assert_eq!(err.to_string(), "mac failed: access denied");
    }

    #[test]
    fn arguments_are_single_quoted() {
        let driver = driver(&[""]);
        driver
            .start(&CancelToken::new(), "it's; Remove-Item C:\\")
            .expect("start");
        let script = &driver.powershell().scripts()[0];
        assert!(script.contains("-Name 'it''s; Remove-Item C:\\'"));
    }

    #[test]
    fn create_dvd_drive_parses_controller_location() {
        let driver = driver(&[r#"{"ControllerNumber":1,"ControllerLocation":0}"#]);
        let location = driver
            .create_dvd_drive(
                &CancelToken::new(),
                "vm",
                Path::new("C:/iso/install.iso"),
                Generation::One,
            )
            .expect("create dvd");
        assert_eq!(location, (1, 0));
        let script = &driver.powershell().scripts()[0];
        assert!(script.contains("-Path 'C:/iso/install.iso' -ControllerNumber 1 -Passthru"));
    }

    #[test]
    fn create_dvd_drive_rejects_garbage() {
        let driver = driver(&["not json"]);
        let err = driver
            .create_dvd_drive(&CancelToken::new(), "vm", Path::new("a.iso"), Generation::Two)
            .unwrap_err();
        assert!(matches!(err, BackendError::Backend { .. }));
    }

    #[test]
    fn set_boot_dvd_drive_depends_on_generation() {
        let cancel = CancelToken::new();
        let driver = driver(&["", ""]);
        driver
            .set_boot_dvd_drive(&cancel, "vm", 0, 1, Generation::Two)
            .expect("gen 2");
        driver
            .set_boot_dvd_drive(&cancel, "vm", 1, 0, Generation::One)
            .expect("gen 1");
        let scripts = driver.powershell().scripts();
        assert!(scripts[0].contains("Set-VMFirmware"));
        assert!(scripts[0].contains("-ControllerNumber 0 -ControllerLocation 1"));
        assert!(scripts[1].contains("Set-VMBios"));
    }

    #[test]
    fn create_virtual_switch_reports_creation() {
        let cancel = CancelToken::new();
        let driver = driver(&["True", "False", "maybe"]);
        assert!(driver.create_virtual_switch(&cancel, "sw", "Internal").expect("create"));
        assert!(!driver.create_virtual_switch(&cancel, "sw", "Internal").expect("reuse"));
        assert!(driver.create_virtual_switch(&cancel, "sw", "Internal").is_err());
    }

    #[test]
    fn create_virtual_machine_renders_new_disk() {
        let driver = driver(&[""]);
        let spec = NewVmSpec {
            vm_name: "web".to_string(),
            path: "C:/out".into(),
            hard_drive_path: None,
            ram_mb: 2048,
            disk_size_mb: 40960,
            disk_block_size_mb: 32,
            switch_name: "sw".to_string(),
            generation: Generation::Two,
            differencing_disk: false,
            fixed_vhd: false,
            version: None,
        };
        driver
            .create_virtual_machine(&CancelToken::new(), &spec)
            .expect("create");
        let script = &driver.powershell().scripts()[0];
        assert!(script.contains("-SizeBytes 40960MB -BlockSizeBytes 32MB -Dynamic"));
        assert!(script.contains("-Generation 2"));
        assert!(!script.contains("-Version"));
    }

    #[test]
    fn secure_boot_template_is_optional() {
        let cancel = CancelToken::new();
        let driver = driver(&["", ""]);
        driver
            .set_virtual_machine_secure_boot(&cancel, "vm", true, None)
            .expect("no template");
        driver
            .set_virtual_machine_secure_boot(
                &cancel,
                "vm",
                false,
                Some("MicrosoftUEFICertificateAuthority"),
            )
            .expect("template");
        let scripts = driver.powershell().scripts();
        assert!(scripts[0].ends_with("-EnableSecureBoot On"));
        assert!(scripts[1].contains(
            "-EnableSecureBoot Off -SecureBootTemplate 'MicrosoftUEFICertificateAuthority'"
        ));
    }

    #[test]
    fn empty_scan_codes_skip_the_host() {
        let driver = driver(&[]);
        driver
            .type_scan_codes(&CancelToken::new(), "vm", "  ")
            .expect("noop");
        assert!(driver.powershell().scripts().is_empty());
    }

    #[test]
    fn disconnect_fires_token_and_stops_viewer() {
        let cancel = CancelToken::new();
        let driver = driver(&["4242", ""]);
        let connection = driver.connect(&cancel, "vm").expect("connect");
        assert_eq!(connection.process_id(), Some(4242));
        let token = connection.cancel_token().clone();
        driver.disconnect(connection).expect("disconnect");
        assert!(token.is_cancelled());
        assert!(driver.powershell().scripts()[1].contains("Stop-Process -Id 4242"));
    }
}
