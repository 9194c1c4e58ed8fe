//! Remote command execution and file transfer against a build target.

pub mod chroot;
pub mod local;

use std::fs::Metadata;
use std::io::{Read, Write};
use std::path::Path;

use crate::cancel::CancelToken;
use crate::error::BackendError;

pub use chroot::ChrootCommunicator;
pub use local::LocalCommunicator;

/// A command to run on the target, filled in by [`Communicator::start`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCmd {
    pub command: String,
    /// `None` until the command has exited.
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RemoteCmd {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn set_exited(&mut self, status: i32) {
        self.exit_status = Some(status);
    }

    /// Start the command and fail unless it exits with status 0.
    pub fn run_checked(
        &mut self,
        communicator: &dyn Communicator,
        cancel: &CancelToken,
    ) -> Result<(), BackendError> {
        let requested = self.command.clone();
        communicator.start(cancel, self)?;
        match self.exit_status {
            Some(0) => Ok(()),
            Some(status) => Err(BackendError::backend(
                "remote command",
                format!(
                    "'{requested}' exited with status {status}: {}",
                    self.stderr.trim()
                ),
            )),
            None => Err(BackendError::backend(
                "remote command",
                format!("'{requested}' did not report an exit status"),
            )),
        }
    }
}

/// File attributes carried along with an upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileMeta {
    /// Unix permission bits.
    pub mode: Option<u32>,
    pub len: Option<u64>,
}

impl FileMeta {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode() & 0o7777)
        };
        #[cfg(not(unix))]
        let mode = None;
        Self {
            mode,
            len: Some(metadata.len()),
        }
    }
}

/// Runs commands and moves files on a target machine.
///
/// Remote paths are absolute paths on the target. Directory transfers skip
/// entries with a path component equal to one of the `exclude` names.
pub trait Communicator: Send + Sync {
    fn start(&self, cancel: &CancelToken, cmd: &mut RemoteCmd) -> Result<(), BackendError>;

    fn upload(
        &self,
        cancel: &CancelToken,
        dst: &Path,
        src: &mut dyn Read,
        meta: Option<&FileMeta>,
    ) -> Result<(), BackendError>;

    /// Copy local directory `src` to `dst`. Without a trailing `/` on `src` the
    /// directory itself is copied into `dst`; with one, only its contents.
    fn upload_dir(
        &self,
        cancel: &CancelToken,
        dst: &Path,
        src: &Path,
        exclude: &[String],
    ) -> Result<(), BackendError>;

    fn download(
        &self,
        cancel: &CancelToken,
        src: &Path,
        dst: &mut dyn Write,
    ) -> Result<(), BackendError>;

    fn download_dir(
        &self,
        cancel: &CancelToken,
        src: &Path,
        dst: &Path,
        exclude: &[String],
    ) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingCommunicator;

    #[test]
    fn run_checked_accepts_zero_exit() {
        let comm = RecordingCommunicator::new();
        let mut cmd = RemoteCmd::new("true");
        cmd.run_checked(&comm, &CancelToken::new()).expect("run");
        assert_eq!(cmd.exit_status, Some(0));
        assert_eq!(comm.commands(), vec!["true".to_string()]);
    }

    #[test]
    fn run_checked_reports_non_zero_exit() {
        let comm = RecordingCommunicator::new().with_exit_status(2);
        let err = RemoteCmd::new("false")
            .run_checked(&comm, &CancelToken::new())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "remote command failed: 'false' exited with status 2: "
        );
    }
}
