//! Cooperative cancellation shared by every backend call in a session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::BackendError;

/// Upper bound on how long a blocking backend call may go without looking at
/// its [`CancelToken`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One-shot cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    fired: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.fired.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Fail with [`BackendError::Cancelled`] once the token has fired.
    pub fn check(&self) -> Result<(), BackendError> {
        if self.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());
        other.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(BackendError::Cancelled)));
    }
}
