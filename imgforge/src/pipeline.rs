//! Runs steps in order and guarantees reverse-order cleanup.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::anyhow;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::types::{BuildOutcome, StepAction};
use crate::error::is_cancellation;
use crate::state::{BuildState, Session};
use crate::step::{Step, halt};

/// An ordered list of steps with a single `run` entry point.
pub struct Pipeline {
    steps: Vec<Box<dyn Step>>,
    entered: Vec<String>,
}

impl Pipeline {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            steps,
            entered: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Names of the steps whose `run` was entered by the last [`Pipeline::run`],
    /// in entry order.
    pub fn entered(&self) -> &[String] {
        &self.entered
    }

    /// Run every step until one halts or `cancel` fires, then clean up every
    /// entered step in reverse order of entry.
    ///
    /// The outcome is decided by the forward pass alone; nothing a cleanup
    /// does can change it, and `state.error` after return is the error the
    /// forward pass recorded. A step whose `run` panics halts the build.
    #[instrument(skip_all, fields(steps = self.steps.len()))]
    pub fn run(
        &mut self,
        cancel: &CancelToken,
        session: &Session<'_>,
        state: &mut BuildState,
    ) -> BuildOutcome {
        self.entered.clear();
        let mut halted_by: Option<String> = None;
        let mut cancelled = false;

        for step in &mut self.steps {
            if cancel.is_cancelled() {
                warn!("cancellation requested, not starting further steps");
                cancelled = true;
                break;
            }
            let name = step.name().to_string();
            info!(step = %name, "running step");
            self.entered.push(name.clone());
            let run = AssertUnwindSafe(|| step.run(cancel, session, state));
            let action = match catch_unwind(run) {
                Ok(action) => action,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    halt(session, state, anyhow!("step {name} panicked: {message}"))
                }
            };
            if action == StepAction::Halt {
                warn!(step = %name, "step halted");
                halted_by = Some(name);
                break;
            }
        }

        let outcome = classify(cancelled, halted_by.as_deref(), state);

        let build_error = state.error.take();
        let entered = self.entered.len();
        for step in self.steps[..entered].iter_mut().rev() {
            debug!(step = step.name(), "cleaning up step");
            let cleaned = catch_unwind(AssertUnwindSafe(|| step.cleanup(session, state)));
            if let Err(payload) = cleaned {
                warn!(
                    step = step.name(),
                    panic = %panic_message(payload.as_ref()),
                    "cleanup panicked"
                );
            }
        }
        if let Some(err) = state.error.take() {
            warn!(err = %format!("{err:#}"), "error recorded during cleanup");
        }
        state.error = build_error;

        info!(outcome = ?outcome, "pipeline finished");
        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn classify(cancelled: bool, halted_by: Option<&str>, state: &BuildState) -> BuildOutcome {
    if cancelled || state.error.as_ref().is_some_and(is_cancellation) {
        return BuildOutcome::Cancelled;
    }
    match halted_by {
        None => BuildOutcome::Completed,
        Some(name) => BuildOutcome::Halted {
            error: state
                .error
                .as_ref()
                .map(|err| format!("{err:#}"))
                .unwrap_or_else(|| format!("step {name} halted")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::NullDriver;
    use crate::test_support::{Journal, RecordingUi, ScriptedStep};

    fn run(steps: Vec<ScriptedStep>, cancel: &CancelToken) -> (BuildOutcome, Pipeline, BuildState) {
        let ui = RecordingUi::new();
        let session = Session::new(&NullDriver, &ui);
        let mut state = BuildState::new("vm");
        let mut pipeline = Pipeline::new(
            steps
                .into_iter()
                .map(|s| Box::new(s) as Box<dyn Step>)
                .collect(),
        );
        let outcome = pipeline.run(cancel, &session, &mut state);
        (outcome, pipeline, state)
    }

    #[test]
    fn all_steps_continue_and_clean_up_in_reverse() {
        let journal = Journal::new();
        let (outcome, pipeline, _) = run(
            vec![
                ScriptedStep::new("a", &journal),
                ScriptedStep::new("b", &journal),
                ScriptedStep::new("c", &journal),
            ],
            &CancelToken::new(),
        );
        assert_eq!(outcome, BuildOutcome::Completed);
        assert_eq!(pipeline.entered(), ["a", "b", "c"]);
        assert_eq!(
            journal.entries(),
            [
                "run:a",
                "run:b",
                "run:c",
                "cleanup:c",
                "cleanup:b",
                "cleanup:a"
            ]
        );
    }

    #[test]
    fn halt_stops_forward_progress_and_cleans_halting_step() {
        let journal = Journal::new();
        let (outcome, pipeline, state) = run(
            vec![
                ScriptedStep::new("a", &journal),
                ScriptedStep::new("b", &journal).halting_with("disk full"),
                ScriptedStep::new("c", &journal),
            ],
            &CancelToken::new(),
        );
        assert_eq!(
            outcome,
            BuildOutcome::Halted {
                error: "disk full".to_string()
            }
        );
        assert_eq!(pipeline.entered(), ["a", "b"]);
        assert_eq!(
            journal.entries(),
            ["run:a", "run:b", "cleanup:b", "cleanup:a"]
        );
        assert!(state.error.is_some());
    }

    #[test]
    fn halt_without_error_names_the_step() {
        let journal = Journal::new();
        let (outcome, _, _) = run(
            vec![ScriptedStep::new("mount", &journal).halting()],
            &CancelToken::new(),
        );
        assert_eq!(
            outcome,
            BuildOutcome::Halted {
                error: "step mount halted".to_string()
            }
        );
    }

    #[test]
    fn cancellation_between_steps_skips_the_rest() {
        let journal = Journal::new();
        let cancel = CancelToken::new();
        let (outcome, pipeline, _) = run(
            vec![
                ScriptedStep::new("a", &journal).cancelling(&cancel),
                ScriptedStep::new("b", &journal),
            ],
            &cancel,
        );
        assert_eq!(outcome, BuildOutcome::Cancelled);
        assert_eq!(pipeline.entered(), ["a"]);
        assert_eq!(journal.entries(), ["run:a", "cleanup:a"]);
    }

    #[test]
    fn cancelled_backend_call_is_reported_as_cancelled() {
        let journal = Journal::new();
        let (outcome, _, _) = run(
            vec![
                ScriptedStep::new("a", &journal),
                ScriptedStep::new("b", &journal).halting_with_cancellation(),
            ],
            &CancelToken::new(),
        );
        assert_eq!(outcome, BuildOutcome::Cancelled);
        assert_eq!(
            journal.entries(),
            ["run:a", "run:b", "cleanup:b", "cleanup:a"]
        );
    }

    #[test]
    fn cleanup_errors_never_become_the_build_error() {
        let journal = Journal::new();
        let (outcome, _, state) = run(
            vec![
                ScriptedStep::new("a", &journal).recording_in_cleanup("teardown broke"),
                ScriptedStep::new("b", &journal).halting(),
            ],
            &CancelToken::new(),
        );
        assert_eq!(
            outcome,
            BuildOutcome::Halted {
                error: "step b halted".to_string()
            }
        );
        assert!(state.error.is_none());
    }

    #[test]
    fn completed_build_keeps_no_cleanup_error() {
        let journal = Journal::new();
        let (outcome, _, state) = run(
            vec![ScriptedStep::new("a", &journal).recording_in_cleanup("teardown broke")],
            &CancelToken::new(),
        );
        assert_eq!(outcome, BuildOutcome::Completed);
        assert!(state.error.is_none());
    }

    #[test]
    fn build_error_survives_cleanup_errors() {
        let journal = Journal::new();
        let (_, _, state) = run(
            vec![
                ScriptedStep::new("a", &journal).recording_in_cleanup("teardown broke"),
                ScriptedStep::new("b", &journal).halting_with("disk full"),
            ],
            &CancelToken::new(),
        );
        assert_eq!(state.error.expect("build error").to_string(), "disk full");
    }

    #[test]
    fn panicking_step_halts_and_everything_entered_is_cleaned_up() {
        let journal = Journal::new();
        let (outcome, pipeline, state) = run(
            vec![
                ScriptedStep::new("a", &journal),
                ScriptedStep::new("b", &journal).panicking("index out of bounds"),
                ScriptedStep::new("c", &journal),
            ],
            &CancelToken::new(),
        );
        assert_eq!(
            outcome,
            BuildOutcome::Halted {
                error: "step b panicked: index out of bounds".to_string()
            }
        );
        assert_eq!(pipeline.entered(), ["a", "b"]);
        assert_eq!(
            journal.entries(),
            ["run:a", "run:b", "cleanup:b", "cleanup:a"]
        );
        assert!(state.error.is_some());
    }

    #[test]
    fn already_cancelled_token_enters_nothing() {
        let journal = Journal::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let (outcome, pipeline, _) = run(vec![ScriptedStep::new("a", &journal)], &cancel);
        assert_eq!(outcome, BuildOutcome::Cancelled);
        assert!(pipeline.entered().is_empty());
        assert!(journal.entries().is_empty());
    }
}
