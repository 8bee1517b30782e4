//! Pipeline termination signal

use appfw_errors::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Single shot termination signal shared by the phase managers.
///
/// Closing the signal twice is a caller bug; the second call errors
/// instead of silently re-cancelling.
#[derive(Debug, Default)]
pub struct TerminationSignal {
    token: CancellationToken,
    terminated: AtomicBool,
}

impl TerminationSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the signal; all managers unblock on their next tick.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal was already closed.
    pub fn terminate(&self) -> Result<()> {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return Err(Error::internal("termination signal already closed"));
        }
        self.token.cancel();
        Ok(())
    }

    /// Resolves once the signal is closed.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminate_unblocks_waiters() {
        let sig = TerminationSignal::new();
        assert!(!sig.is_terminated());
        sig.terminate().unwrap();
        // Must resolve immediately.
        sig.cancelled().await;
        assert!(sig.is_terminated());
    }

    #[test]
    fn double_terminate_is_an_error() {
        let sig = TerminationSignal::new();
        sig.terminate().unwrap();
        assert!(sig.terminate().is_err());
    }
}
