//! Typed failures at the driver and communicator boundary.
//!
//! Orchestration code works with `anyhow::Error`, but callers must still be able
//! to tell a cancellation or an empty answer apart from a hard backend failure.
//! Those kinds are carried as [`BackendError`] and recovered by downcasting.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    /// A pre-flight check found a missing privilege, feature, or tool.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The backend call itself failed.
    #[error("{op} failed: {message}")]
    Backend { op: String, message: String },

    /// The call succeeded but the backend has no answer yet.
    #[error("no {what} available yet")]
    NoAnswer { what: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation {op} is not supported by this driver")]
    Unsupported { op: String },

    /// A command wrapper cannot express the command in its target context.
    #[error("command rejected: {0}")]
    CommandRejected(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl BackendError {
    pub fn backend(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            op: op.into(),
            message: message.into(),
        }
    }

    pub fn no_answer(what: impl Into<String>) -> Self {
        Self::NoAnswer { what: what.into() }
    }

    pub fn unsupported(op: impl Into<String>) -> Self {
        Self::Unsupported { op: op.into() }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Only empty answers are worth polling again.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::NoAnswer { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// True if any error in the chain is [`BackendError::Cancelled`].
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<BackendError>())
        .any(BackendError::is_cancelled)
}
