//! Upload files and run shell commands on the target through the session's
//! communicator.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::communicator::{Communicator, FileMeta, RemoteCmd};
use crate::core::types::StepAction;
use crate::core::wrapper::{CommandWrapper, EnvPrefix};
use crate::state::{BuildState, Session};
use crate::step::{Step, halt};

/// A local file or directory copied to an absolute path on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct StepProvision {
    pub uploads: Vec<Upload>,
    pub commands: Vec<String>,
    /// Environment every command sees.
    pub env: EnvPrefix,
}

impl StepProvision {
    pub fn new(uploads: Vec<Upload>, commands: Vec<String>) -> Self {
        Self {
            uploads,
            commands,
            env: EnvPrefix::default(),
        }
    }

    pub fn with_env(mut self, env: EnvPrefix) -> Self {
        self.env = env;
        self
    }

    fn is_empty(&self) -> bool {
        self.uploads.is_empty() && self.commands.is_empty()
    }

    fn provision(
        &self,
        cancel: &CancelToken,
        session: &Session<'_>,
        communicator: &dyn Communicator,
    ) -> Result<()> {
        for upload in &self.uploads {
            session.ui.say(&format!(
                "Uploading {} => {}",
                upload.source.display(),
                upload.destination.display()
            ));
            upload_one(cancel, communicator, &upload.source, &upload.destination)
                .with_context(|| format!("upload {}", upload.source.display()))?;
        }
        for command in &self.commands {
            session
                .ui
                .say(&format!("Provisioning with shell command: {command}"));
            let line = self
                .env
                .wrap(command)
                .with_context(|| format!("prepare command '{command}'"))?;
            let mut cmd = RemoteCmd::new(line);
            cmd.run_checked(communicator, cancel)
                .with_context(|| format!("run '{command}'"))?;
            let stdout = cmd.stdout.trim_end();
            if !stdout.is_empty() {
                session.ui.say(stdout);
            }
            debug!(command = %command, "provisioning command finished");
        }
        Ok(())
    }
}

fn upload_one(
    cancel: &CancelToken,
    communicator: &dyn Communicator,
    source: &Path,
    destination: &Path,
) -> Result<()> {
    let metadata = source
        .metadata()
        .with_context(|| format!("stat {}", source.display()))?;
    if metadata.is_dir() {
        communicator.upload_dir(cancel, destination, source, &[])?;
        return Ok(());
    }
    let mut file = File::open(source).with_context(|| format!("open {}", source.display()))?;
    let meta = FileMeta::from_metadata(&metadata);
    communicator.upload(cancel, destination, &mut file, Some(&meta))?;
    Ok(())
}

impl Step for StepProvision {
    fn name(&self) -> &str {
        "provision"
    }

    fn run(
        &mut self,
        cancel: &CancelToken,
        session: &Session<'_>,
        state: &mut BuildState,
    ) -> StepAction {
        if self.is_empty() {
            debug!("nothing to provision");
            return StepAction::Continue;
        }
        let Some(communicator) = session.communicator else {
            return halt(
                session,
                state,
                anyhow!("provisioning is configured but the session has no communicator"),
            );
        };
        info!(
            uploads = self.uploads.len(),
            commands = self.commands.len(),
            "provisioning"
        );
        match self.provision(cancel, session, communicator) {
            Ok(()) => StepAction::Continue,
            Err(err) => halt(session, state, err),
        }
    }
}
