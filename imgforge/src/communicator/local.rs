//! Communicator for the local machine: `/bin/sh -c` plus filesystem copies.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use super::{Communicator, FileMeta, RemoteCmd};
use crate::cancel::CancelToken;
use crate::error::BackendError;
use crate::io::process::{RunOptions, run_command};

#[derive(Debug, Clone)]
pub struct LocalCommunicator {
    shell: PathBuf,
    output_limit_bytes: usize,
    timeout: Option<Duration>,
}

impl Default for LocalCommunicator {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
            output_limit_bytes: 1_000_000,
            timeout: None,
        }
    }
}

impl LocalCommunicator {
    pub fn new(output_limit_bytes: usize) -> Self {
        Self {
            output_limit_bytes,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Communicator for LocalCommunicator {
    #[instrument(skip_all, fields(command = %cmd.command))]
    fn start(&self, cancel: &CancelToken, cmd: &mut RemoteCmd) -> Result<(), BackendError> {
        let mut shell = Command::new(&self.shell);
        shell.arg("-c").arg(&cmd.command);
        let output = run_command(
            shell,
            cancel,
            RunOptions {
                stdin: None,
                timeout: self.timeout,
                output_limit_bytes: self.output_limit_bytes,
            },
        )?;
        if output.timed_out {
            return Err(BackendError::backend(
                "local command",
                format!("'{}' timed out", cmd.command),
            ));
        }
        cmd.stdout = output.stdout_lossy();
        cmd.stderr = output.stderr_lossy();
        // Killed by a signal: no code to report.
        cmd.set_exited(output.status.code().unwrap_or(-1));
        debug!(exit_status = ?cmd.exit_status, "local command exited");
        Ok(())
    }

    #[instrument(skip_all, fields(dst = %dst.display()))]
    fn upload(
        &self,
        cancel: &CancelToken,
        dst: &Path,
        src: &mut dyn Read,
        meta: Option<&FileMeta>,
    ) -> Result<(), BackendError> {
        cancel.check()?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BackendError::io(format!("create directory {}", parent.display()), e)
            })?;
        }
        let mut file = File::create(dst)
            .map_err(|e| BackendError::io(format!("create {}", dst.display()), e))?;
        let copied = io::copy(src, &mut file)
            .map_err(|e| BackendError::io(format!("write {}", dst.display()), e))?;
        if let Some(mode) = meta.and_then(|m| m.mode) {
            set_mode(dst, mode)?;
        }
        debug!(bytes = copied, "uploaded file");
        Ok(())
    }

    #[instrument(skip_all, fields(dst = %dst.display(), src = %src.display()))]
    fn upload_dir(
        &self,
        cancel: &CancelToken,
        dst: &Path,
        src: &Path,
        exclude: &[String],
    ) -> Result<(), BackendError> {
        copy_tree(cancel, src, &tree_destination(src, dst), exclude)
    }

    #[instrument(skip_all, fields(src = %src.display()))]
    fn download(
        &self,
        cancel: &CancelToken,
        src: &Path,
        dst: &mut dyn Write,
    ) -> Result<(), BackendError> {
        cancel.check()?;
        let mut file =
            File::open(src).map_err(|e| BackendError::io(format!("open {}", src.display()), e))?;
        io::copy(&mut file, dst)
            .map_err(|e| BackendError::io(format!("read {}", src.display()), e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(src = %src.display(), dst = %dst.display()))]
    fn download_dir(
        &self,
        cancel: &CancelToken,
        src: &Path,
        dst: &Path,
        exclude: &[String],
    ) -> Result<(), BackendError> {
        copy_tree(cancel, src, &tree_destination(src, dst), exclude)
    }
}

/// `src/` copies contents into `dst`; `src` copies the directory itself.
fn tree_destination(src: &Path, dst: &Path) -> PathBuf {
    let copy_contents = src.as_os_str().to_string_lossy().ends_with('/');
    match src.file_name() {
        Some(name) if !copy_contents => dst.join(name),
        _ => dst.to_path_buf(),
    }
}

fn is_excluded(relative: &Path, exclude: &[String]) -> bool {
    relative
        .components()
        .any(|c| exclude.iter().any(|name| c.as_os_str() == name.as_str()))
}

fn copy_tree(
    cancel: &CancelToken,
    from: &Path,
    to: &Path,
    exclude: &[String],
) -> Result<(), BackendError> {
    let mut copied = 0usize;
    let walker = WalkDir::new(from).into_iter().filter_entry(|entry| {
        entry
            .path()
            .strip_prefix(from)
            .map(|rel| !is_excluded(rel, exclude))
            .unwrap_or(true)
    });
    for entry in walker {
        cancel.check()?;
        let entry = entry.map_err(|e| {
            let context = format!("walk {}", from.display());
            BackendError::io(context, io::Error::other(e))
        })?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| BackendError::io("relativize path", io::Error::other(e)))?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| {
                BackendError::io(format!("create directory {}", target.display()), e)
            })?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    BackendError::io(format!("create directory {}", parent.display()), e)
                })?;
            }
            fs::copy(entry.path(), &target).map_err(|e| {
                BackendError::io(
                    format!("copy {} to {}", entry.path().display(), target.display()),
                    e,
                )
            })?;
            copied += 1;
        } else {
            warn!(path = %entry.path().display(), "skipping special file");
        }
    }
    debug!(files = copied, "copied directory tree");
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), BackendError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| BackendError::io(format!("chmod {}", path.display()), e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), BackendError> {
    Ok(())
}
