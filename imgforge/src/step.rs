//! The contract every build step implements.

use tracing::error;

use crate::cancel::CancelToken;
use crate::core::types::StepAction;
use crate::state::{BuildState, Session};

/// One unit of build work that may acquire a backend resource.
///
/// `run` is called at most once per build. On an unrecoverable condition it
/// records the error in `state`, reports it through the UI, and returns
/// [`StepAction::Halt`] (see [`halt`]).
///
/// `cleanup` is called once for every step whose `run` was entered, in
/// reverse order, however the build ended. It must check its own record in
/// `state` before releasing anything, and may only log failures. It receives a
/// fresh token so teardown is not aborted by the cancellation that stopped
/// the build.
pub trait Step {
    fn name(&self) -> &str;

    fn run(&mut self, cancel: &CancelToken, session: &Session<'_>, state: &mut BuildState)
    -> StepAction;

    fn cleanup(&mut self, _session: &Session<'_>, _state: &mut BuildState) {}
}

/// Report `err`, record it as the build error, and halt.
pub fn halt(session: &Session<'_>, state: &mut BuildState, err: anyhow::Error) -> StepAction {
    let message = format!("{err:#}");
    error!(err = %message, "step halted");
    session.ui.error(&message);
    state.record_error(err);
    StepAction::Halt
}
