//! Test-only fakes for drivers, communicators, UIs, and steps.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cancel::CancelToken;
use crate::communicator::{Communicator, FileMeta, RemoteCmd};
use crate::core::types::{Generation, StepAction};
use crate::driver::{Driver, NewVmSpec};
use crate::error::BackendError;
use crate::io::powershell::PowerShell;
use crate::state::{BuildState, Session};
use crate::step::{Step, halt};
use crate::ui::Ui;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Driver that records every call as `op(arg, ...)` and succeeds unless told
/// otherwise.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    calls: Mutex<Vec<String>>,
    failures: HashMap<String, String>,
    cancellations: HashSet<String>,
    dvd_location: (u32, u32),
    switch_exists: bool,
    running: bool,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail with a backend error carrying `message`.
    pub fn failing(mut self, op: &str, message: &str) -> Self {
        self.failures.insert(op.to_string(), message.to_string());
        self
    }

    /// Make `op` fail as if cancellation was observed mid-call.
    pub fn cancelling(mut self, op: &str) -> Self {
        self.cancellations.insert(op.to_string());
        self
    }

    pub fn with_dvd_location(mut self, controller_number: u32, controller_location: u32) -> Self {
        self.dvd_location = (controller_number, controller_location);
        self
    }

    pub fn with_existing_switch(mut self) -> Self {
        self.switch_exists = true;
        self
    }

    pub fn with_running(mut self, running: bool) -> Self {
        self.running = running;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Operation names only, in call order.
    pub fn ops(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|call| call.split('(').next().unwrap_or_default().to_string())
            .collect()
    }

    fn record(&self, op: &str, args: &[String]) -> Result<(), BackendError> {
        lock(&self.calls).push(format!("{op}({})", args.join(", ")));
        if self.cancellations.contains(op) {
            return Err(BackendError::Cancelled);
        }
        match self.failures.get(op) {
            Some(message) => Err(BackendError::backend(op, message.clone())),
            None => Ok(()),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

impl Driver for RecordingDriver {
    fn verify(&self, _cancel: &CancelToken) -> Result<(), BackendError> {
        self.record("verify", &[])
    }

    fn is_running(&self, _cancel: &CancelToken, vm_name: &str) -> Result<bool, BackendError> {
        self.record("is_running", &[vm_name.to_string()])?;
        Ok(self.running)
    }

    fn start(&self, _cancel: &CancelToken, vm_name: &str) -> Result<(), BackendError> {
        self.record("start", &[vm_name.to_string()])
    }

    fn stop(&self, _cancel: &CancelToken, vm_name: &str) -> Result<(), BackendError> {
        self.record("stop", &[vm_name.to_string()])
    }

    fn create_virtual_switch(
        &self,
        _cancel: &CancelToken,
        switch_name: &str,
        switch_type: &str,
    ) -> Result<bool, BackendError> {
        self.record(
            "create_virtual_switch",
            &[switch_name.to_string(), switch_type.to_string()],
        )?;
        Ok(!self.switch_exists)
    }

    fn delete_virtual_switch(
        &self,
        _cancel: &CancelToken,
        switch_name: &str,
    ) -> Result<(), BackendError> {
        self.record("delete_virtual_switch", &[switch_name.to_string()])
    }

    fn create_virtual_machine(
        &self,
        _cancel: &CancelToken,
        spec: &NewVmSpec,
    ) -> Result<(), BackendError> {
        self.record("create_virtual_machine", &[spec.vm_name.clone()])
    }

    fn delete_virtual_machine(
        &self,
        _cancel: &CancelToken,
        vm_name: &str,
    ) -> Result<(), BackendError> {
        self.record("delete_virtual_machine", &[vm_name.to_string()])
    }

    fn set_virtual_machine_cpu_count(
        &self,
        _cancel: &CancelToken,
        vm_name: &str,
        cpus: u32,
    ) -> Result<(), BackendError> {
        self.record(
            "set_virtual_machine_cpu_count",
            &[vm_name.to_string(), cpus.to_string()],
        )
    }

    fn set_virtual_machine_dynamic_memory(
        &self,
        _cancel: &CancelToken,
        vm_name: &str,
        enable: bool,
    ) -> Result<(), BackendError> {
        self.record(
            "set_virtual_machine_dynamic_memory",
            &[vm_name.to_string(), enable.to_string()],
        )
    }

    fn set_virtual_machine_secure_boot(
        &self,
        _cancel: &CancelToken,
        vm_name: &str,
        enable: bool,
        _template: Option<&str>,
    ) -> Result<(), BackendError> {
        self.record(
            "set_virtual_machine_secure_boot",
            &[vm_name.to_string(), enable.to_string()],
        )
    }

    fn export_virtual_machine(
        &self,
        _cancel: &CancelToken,
        vm_name: &str,
        path: &Path,
    ) -> Result<(), BackendError> {
        self.record(
            "export_virtual_machine",
            &[vm_name.to_string(), path_arg(path)],
        )
    }

    fn create_dvd_drive(
        &self,
        _cancel: &CancelToken,
        vm_name: &str,
        iso_path: &Path,
        generation: Generation,
    ) -> Result<(u32, u32), BackendError> {
        self.record(
            "create_dvd_drive",
            &[vm_name.to_string(), path_arg(iso_path), generation.to_string()],
        )?;
        Ok(self.dvd_location)
    }

    fn mount_dvd_drive(
        &self,
        _cancel: &CancelToken,
        vm_name: &str,
        path: &Path,
        controller_number: u32,
        controller_location: u32,
    ) -> Result<(), BackendError> {
        self.record(
            "mount_dvd_drive",
            &[
                vm_name.to_string(),
                path_arg(path),
                controller_number.to_string(),
                controller_location.to_string(),
            ],
        )
    }

    fn set_boot_dvd_drive(
        &self,
        _cancel: &CancelToken,
        vm_name: &str,
        controller_number: u32,
        controller_location: u32,
        generation: Generation,
    ) -> Result<(), BackendError> {
        self.record(
            "set_boot_dvd_drive",
            &[
                vm_name.to_string(),
                controller_number.to_string(),
                controller_location.to_string(),
                generation.to_string(),
            ],
        )
    }

    fn unmount_dvd_drive(
        &self,
        _cancel: &CancelToken,
        vm_name: &str,
        controller_number: u32,
        controller_location: u32,
    ) -> Result<(), BackendError> {
        self.record(
            "unmount_dvd_drive",
            &[
                vm_name.to_string(),
                controller_number.to_string(),
                controller_location.to_string(),
            ],
        )
    }

    fn delete_dvd_drive(
        &self,
        _cancel: &CancelToken,
        vm_name: &str,
        controller_number: u32,
        controller_location: u32,
    ) -> Result<(), BackendError> {
        self.record(
            "delete_dvd_drive",
            &[
                vm_name.to_string(),
                controller_number.to_string(),
                controller_location.to_string(),
            ],
        )
    }

    fn mount_floppy_drive(
        &self,
        _cancel: &CancelToken,
        vm_name: &str,
        path: &Path,
    ) -> Result<(), BackendError> {
        self.record("mount_floppy_drive", &[vm_name.to_string(), path_arg(path)])
    }

    fn unmount_floppy_drive(
        &self,
        _cancel: &CancelToken,
        vm_name: &str,
    ) -> Result<(), BackendError> {
        self.record("unmount_floppy_drive", &[vm_name.to_string()])
    }
}

/// A file transfer seen by [`RecordingCommunicator`], with the paths it was
/// asked to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferCall {
    Upload { dst: PathBuf },
    UploadDir { dst: PathBuf, src: PathBuf },
    Download { src: PathBuf },
    DownloadDir { src: PathBuf, dst: PathBuf },
}

/// Communicator that records commands and transfers without touching
/// anything. Every command exits with the configured status.
#[derive(Debug, Default)]
pub struct RecordingCommunicator {
    commands: Mutex<Vec<String>>,
    transfers: Mutex<Vec<TransferCall>>,
    uploaded: Mutex<Vec<Vec<u8>>>,
    exit_status: i32,
    stdout: String,
}

impl RecordingCommunicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exit_status(mut self, status: i32) -> Self {
        self.exit_status = status;
        self
    }

    pub fn with_stdout(mut self, stdout: &str) -> Self {
        self.stdout = stdout.to_string();
        self
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    pub fn transfers(&self) -> Vec<TransferCall> {
        lock(&self.transfers).clone()
    }

    /// Contents of every uploaded file, in upload order.
    pub fn uploaded(&self) -> Vec<Vec<u8>> {
        lock(&self.uploaded).clone()
    }
}

impl Communicator for RecordingCommunicator {
    fn start(&self, cancel: &CancelToken, cmd: &mut RemoteCmd) -> Result<(), BackendError> {
        cancel.check()?;
        lock(&self.commands).push(cmd.command.clone());
        cmd.stdout = self.stdout.clone();
        cmd.set_exited(self.exit_status);
        Ok(())
    }

    fn upload(
        &self,
        cancel: &CancelToken,
        dst: &Path,
        src: &mut dyn Read,
        _meta: Option<&FileMeta>,
    ) -> Result<(), BackendError> {
        cancel.check()?;
        let mut contents = Vec::new();
        src.read_to_end(&mut contents)
            .map_err(|e| BackendError::io("read upload source", e))?;
        lock(&self.uploaded).push(contents);
        lock(&self.transfers).push(TransferCall::Upload {
            dst: dst.to_path_buf(),
        });
        Ok(())
    }

    fn upload_dir(
        &self,
        cancel: &CancelToken,
        dst: &Path,
        src: &Path,
        _exclude: &[String],
    ) -> Result<(), BackendError> {
        cancel.check()?;
        lock(&self.transfers).push(TransferCall::UploadDir {
            dst: dst.to_path_buf(),
            src: src.to_path_buf(),
        });
        Ok(())
    }

    fn download(
        &self,
        cancel: &CancelToken,
        src: &Path,
        _dst: &mut dyn Write,
    ) -> Result<(), BackendError> {
        cancel.check()?;
        lock(&self.transfers).push(TransferCall::Download {
            src: src.to_path_buf(),
        });
        Ok(())
    }

    fn download_dir(
        &self,
        cancel: &CancelToken,
        src: &Path,
        dst: &Path,
        _exclude: &[String],
    ) -> Result<(), BackendError> {
        cancel.check()?;
        lock(&self.transfers).push(TransferCall::DownloadDir {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
        });
        Ok(())
    }
}

/// UI that keeps every message.
#[derive(Debug, Default)]
pub struct RecordingUi {
    said: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn said(&self) -> Vec<String> {
        lock(&self.said).clone()
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }
}

impl Ui for RecordingUi {
    fn say(&self, message: &str) {
        lock(&self.said).push(message.to_string());
    }

    fn error(&self, message: &str) {
        lock(&self.errors).push(message.to_string());
    }
}

/// PowerShell host that answers scripts from a queue and remembers them.
/// Once the queue is empty every script prints nothing.
#[derive(Debug, Default)]
pub struct ScriptedPowerShell {
    responses: Mutex<VecDeque<Result<String, BackendError>>>,
    scripts: Mutex<Vec<String>>,
}

impl ScriptedPowerShell {
    pub fn new<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(outputs.into_iter().map(|s| Ok(s.into())).collect()),
            scripts: Mutex::new(Vec::new()),
        }
    }

    pub fn then_fail(self, err: BackendError) -> Self {
        lock(&self.responses).push_back(Err(err));
        self
    }

    pub fn scripts(&self) -> Vec<String> {
        lock(&self.scripts).clone()
    }
}

impl PowerShell for ScriptedPowerShell {
    fn output(&self, cancel: &CancelToken, script: &str) -> Result<String, BackendError> {
        cancel.check()?;
        lock(&self.scripts).push(script.to_string());
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Shared, ordered log of step activity.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: String) {
        lock(&self.entries).push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }
}

/// Step that logs `run:<name>` / `cleanup:<name>` and behaves as configured.
pub struct ScriptedStep {
    name: String,
    journal: Journal,
    halt: bool,
    error: Option<anyhow::Error>,
    cancel: Option<CancelToken>,
    cleanup_error: Option<String>,
    panic: Option<String>,
}

impl ScriptedStep {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            halt: false,
            error: None,
            cancel: None,
            cleanup_error: None,
            panic: None,
        }
    }

    /// Halt without recording an error.
    pub fn halting(mut self) -> Self {
        self.halt = true;
        self
    }

    pub fn halting_with(mut self, message: &str) -> Self {
        self.halt = true;
        self.error = Some(anyhow::anyhow!(message.to_string()));
        self
    }

    /// Halt with a cancellation error, as a step whose driver call was
    /// cancelled would.
    pub fn halting_with_cancellation(mut self) -> Self {
        self.halt = true;
        self.error = Some(anyhow::Error::new(BackendError::Cancelled).context("scripted step"));
        self
    }

    /// Fire `cancel` during `run`, then continue.
    pub fn cancelling(mut self, cancel: &CancelToken) -> Self {
        self.cancel = Some(cancel.clone());
        self
    }

    /// Panic with `message` during `run`.
    pub fn panicking(mut self, message: &str) -> Self {
        self.panic = Some(message.to_string());
        self
    }

    /// Record an error into the state during cleanup.
    pub fn recording_in_cleanup(mut self, message: &str) -> Self {
        self.cleanup_error = Some(message.to_string());
        self
    }
}

impl Step for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        &mut self,
        _cancel: &CancelToken,
        session: &Session<'_>,
        state: &mut BuildState,
    ) -> StepAction {
        self.journal.push(format!("run:{}", self.name));
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
        if let Some(message) = &self.panic {
            panic!("{message}");
        }
        if !self.halt {
            return StepAction::Continue;
        }
        match self.error.take() {
            Some(err) => halt(session, state, err),
            None => StepAction::Halt,
        }
    }

    fn cleanup(&mut self, _session: &Session<'_>, state: &mut BuildState) {
        self.journal.push(format!("cleanup:{}", self.name));
        if let Some(message) = self.cleanup_error.take() {
            state.record_error(anyhow::anyhow!(message));
        }
    }
}

/// Temporary directory populated with `(relative path, contents)` files.
pub fn source_tree(files: &[(&str, &str)]) -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    for (relative, contents) in files {
        let path = temp.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, contents).expect("write fixture");
    }
    temp
}
