//! PowerShell script execution for the Hyper-V driver.

use std::process::Command;

use tracing::{debug, instrument, warn};

use crate::cancel::CancelToken;
use crate::error::BackendError;
use crate::io::process::{RunOptions, run_command};

/// Runs a PowerShell script and returns its trimmed stdout.
pub trait PowerShell: Send + Sync {
    fn output(&self, cancel: &CancelToken, script: &str) -> Result<String, BackendError>;
}

/// Spawns `powershell.exe` (or another host such as `pwsh`) per script.
#[derive(Debug, Clone)]
pub struct PwshRunner {
    program: String,
    output_limit_bytes: usize,
}

impl Default for PwshRunner {
    fn default() -> Self {
        Self {
            program: "powershell.exe".to_string(),
            output_limit_bytes: 1_000_000,
        }
    }
}

impl PwshRunner {
    pub fn new(program: impl Into<String>, output_limit_bytes: usize) -> Self {
        Self {
            program: program.into(),
            output_limit_bytes,
        }
    }
}

impl PowerShell for PwshRunner {
    #[instrument(skip_all, fields(program = %self.program))]
    fn output(&self, cancel: &CancelToken, script: &str) -> Result<String, BackendError> {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "-NoProfile",
            "-NonInteractive",
            "-ExecutionPolicy",
            "Bypass",
            "-Command",
            "-",
        ]);
        let output = run_command(
            cmd,
            cancel,
            RunOptions {
                stdin: Some(script.as_bytes()),
                timeout: None,
                output_limit_bytes: self.output_limit_bytes,
            },
        )?;

        if !output.status.success() {
            let stderr = output.stderr_lossy();
            warn!(exit_code = ?output.status.code(), "powershell script failed");
            return Err(BackendError::backend(
                self.program.clone(),
                format!(
                    "exit status {:?}: {}",
                    output.status.code(),
                    stderr.trim()
                ),
            ));
        }
        let stdout = output.stdout_lossy();
        debug!(bytes = stdout.len(), "powershell script finished");
        Ok(stdout.trim().to_string())
    }
}

/// Quote `s` as a PowerShell single-quoted string literal.
pub fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub fn is_true(output: &str) -> bool {
    output.trim().eq_ignore_ascii_case("true")
}

pub fn is_false(output: &str) -> bool {
    output.trim().eq_ignore_ascii_case("false")
}
