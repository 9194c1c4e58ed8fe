//! Chroot decorator: retargets another communicator into a confined subtree.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use super::{Communicator, FileMeta, RemoteCmd};
use crate::cancel::CancelToken;
use crate::core::confine::confine;
use crate::core::wrapper::{CommandWrapper, quote};
use crate::error::BackendError;

/// Runs every command inside `sudo chroot <root>` and maps every target path
/// under `root`, then delegates to `inner`.
///
/// The final command line is whatever `wrapper` makes of the chroot command;
/// if the wrapper rejects it, `inner` is never called.
pub struct ChrootCommunicator<C: Communicator> {
    root: PathBuf,
    wrapper: Box<dyn CommandWrapper>,
    inner: C,
}

impl<C: Communicator> ChrootCommunicator<C> {
    pub fn new(root: impl Into<PathBuf>, wrapper: impl CommandWrapper + 'static, inner: C) -> Self {
        Self {
            root: root.into(),
            wrapper: Box::new(wrapper),
            inner,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn chroot_command(&self, command: &str) -> String {
        format!(
            "sudo chroot {} /bin/sh -c {}",
            quote(&self.root.display().to_string()),
            quote(command)
        )
    }
}

impl<C: Communicator> Communicator for ChrootCommunicator<C> {
    #[instrument(skip_all, fields(root = %self.root.display()))]
    fn start(&self, cancel: &CancelToken, cmd: &mut RemoteCmd) -> Result<(), BackendError> {
        let wrapped = self
            .wrapper
            .wrap(&self.chroot_command(&cmd.command))
            .inspect_err(|err| warn!(err = %err, "command wrapper rejected command"))?;
        debug!(command = %wrapped, "running in chroot");
        cmd.command = wrapped;
        self.inner.start(cancel, cmd)
    }

    fn upload(
        &self,
        cancel: &CancelToken,
        dst: &Path,
        src: &mut dyn Read,
        meta: Option<&FileMeta>,
    ) -> Result<(), BackendError> {
        self.inner
            .upload(cancel, &confine(&self.root, dst), src, meta)
    }

    fn upload_dir(
        &self,
        cancel: &CancelToken,
        dst: &Path,
        src: &Path,
        exclude: &[String],
    ) -> Result<(), BackendError> {
        self.inner
            .upload_dir(cancel, &confine(&self.root, dst), src, exclude)
    }

    fn download(
        &self,
        cancel: &CancelToken,
        src: &Path,
        dst: &mut dyn Write,
    ) -> Result<(), BackendError> {
        self.inner.download(cancel, &confine(&self.root, src), dst)
    }

    fn download_dir(
        &self,
        cancel: &CancelToken,
        src: &Path,
        dst: &Path,
        exclude: &[String],
    ) -> Result<(), BackendError> {
        self.inner
            .download_dir(cancel, &confine(&self.root, src), dst, exclude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wrapper::{Chain, EnvPrefix, Identity};
    use crate::test_support::{RecordingCommunicator, TransferCall};

    #[test]
    fn start_runs_wrapped_chroot_command() {
        let comm = ChrootCommunicator::new(
            "/mnt/img",
            |cmd: &str| Ok::<_, BackendError>(format!("nice {cmd}")),
            RecordingCommunicator::new(),
        );
        let mut cmd = RemoteCmd::new("echo 'hi'");
        comm.start(&CancelToken::new(), &mut cmd).expect("start");
        assert_eq!(
            comm.inner().commands(),
            vec![r"nice sudo chroot '/mnt/img' /bin/sh -c 'echo '\''hi'\'''".to_string()]
        );
        assert_eq!(cmd.exit_status, Some(0));
    }

    #[test]
    fn rejected_command_never_reaches_inner() {
        let comm = ChrootCommunicator::new(
            "/mnt/img",
            Chain::new().then(EnvPrefix::new([("NOT VALID", "x")])),
            RecordingCommunicator::new(),
        );
        let mut cmd = RemoteCmd::new("true");
        let err = comm.start(&CancelToken::new(), &mut cmd).unwrap_err();
        assert!(matches!(err, BackendError::CommandRejected(_)));
        assert!(comm.inner().commands().is_empty());
        assert_eq!(cmd.command, "true");
    }

    #[test]
    fn target_paths_are_confined_and_local_paths_untouched() {
        let comm = ChrootCommunicator::new("/mnt/img", Identity, RecordingCommunicator::new());
        let cancel = CancelToken::new();
        comm.upload(&cancel, Path::new("/etc/hosts"), &mut "x".as_bytes(), None)
            .expect("upload");
        comm.upload_dir(&cancel, Path::new("/opt/app"), Path::new("./site"), &[])
            .expect("upload dir");
        comm.download(&cancel, Path::new("/var/log/../log/boot.log"), &mut Vec::new())
            .expect("download");
        comm.download_dir(&cancel, Path::new("/srv"), Path::new("out"), &[])
            .expect("download dir");

        assert_eq!(
            comm.inner().transfers(),
            vec![
                TransferCall::Upload {
                    dst: PathBuf::from("/mnt/img/etc/hosts"),
                },
                TransferCall::UploadDir {
                    dst: PathBuf::from("/mnt/img/opt/app"),
                    src: PathBuf::from("./site"),
                },
                TransferCall::Download {
                    src: PathBuf::from("/mnt/img/var/log/boot.log"),
                },
                TransferCall::DownloadDir {
                    src: PathBuf::from("/mnt/img/srv"),
                    dst: PathBuf::from("out"),
                },
            ]
        );
    }
}
