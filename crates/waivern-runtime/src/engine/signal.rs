//! External stop signalling for a run.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// Why a run was asked to stop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(strum::Display)]
pub enum StopCause {
    /// The run's wall-clock deadline expired.
    #[strum(serialize = "timeout")]
    Timeout,
    /// An external cost collaborator reported the budget as exceeded.
    #[strum(serialize = "budget exceeded")]
    Budget,
    /// An external stop request.
    #[strum(serialize = "stopped")]
    External,
}

/// Handle used to stop a run from the outside.
///
/// Cancelling is cooperative: running producers receive the signal through
/// their context and are expected to stop promptly; pending nodes never
/// start. The executor records the first cause it observes.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
    cause: Arc<Mutex<Option<StopCause>>>,
}

impl StopSignal {
    /// Creates an inert signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the run to stop with the given cause.
    ///
    /// The first cause wins; later calls only re-trigger cancellation.
    pub fn stop(&self, cause: StopCause) {
        let mut slot = self.cause.lock().expect("stop cause lock poisoned");
        slot.get_or_insert(cause);
        drop(slot);
        self.token.cancel();
    }

    /// Returns the recorded cause, if the signal has fired.
    pub fn cause(&self) -> Option<StopCause> {
        *self.cause.lock().expect("stop cause lock poisoned")
    }

    /// Returns whether the signal has fired.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the signal fires.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Returns the underlying token, for plumbing into producer contexts.
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}
