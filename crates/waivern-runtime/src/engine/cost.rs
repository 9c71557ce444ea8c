//! Run cost accounting.

use std::sync::{Arc, Mutex};

use super::signal::{StopCause, StopSignal};

/// Accumulates producer-reported cost for one run.
///
/// Producers that spend money (LLM calls, metered APIs) report each spend
/// through the handle in their [`ProducerContext`]; once the accumulated
/// total exceeds the runbook's `cost_limit`, the tracker fires the run's
/// stop signal with [`StopCause::Budget`] and the executor cancels the run
/// exactly as it does for a timeout. Without a limit the tracker only
/// accumulates.
///
/// [`ProducerContext`]: crate::producer::ProducerContext
#[derive(Debug, Clone)]
pub struct CostTracker {
    spent: Arc<Mutex<f64>>,
    limit: Option<f64>,
    signal: StopSignal,
}

impl CostTracker {
    /// Creates a tracker that fires `signal` once `limit` is exceeded.
    pub fn new(limit: Option<f64>, signal: StopSignal) -> Self {
        Self {
            spent: Arc::new(Mutex::new(0.0)),
            limit,
            signal,
        }
    }

    /// Creates a tracker with no limit, for contexts outside a run.
    pub fn unlimited() -> Self {
        Self::new(None, StopSignal::new())
    }

    /// Records a spend and fires the budget stop once the limit is
    /// exceeded.
    pub fn record(&self, cost: f64) {
        let mut spent = self.spent.lock().expect("cost lock poisoned");
        *spent += cost;
        let exceeded = self.limit.is_some_and(|limit| *spent > limit);
        drop(spent);

        if exceeded {
            self.signal.stop(StopCause::Budget);
        }
    }

    /// Returns the total cost reported so far.
    pub fn spent(&self) -> f64 {
        *self.spent.lock().expect("cost lock poisoned")
    }

    /// Returns the configured limit, if any.
    pub fn limit(&self) -> Option<f64> {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_without_limit() {
        let tracker = CostTracker::unlimited();
        tracker.record(0.5);
        tracker.record(0.25);
        assert_eq!(tracker.spent(), 0.75);
    }

    #[test]
    fn test_fires_budget_stop_once_limit_exceeded() {
        let signal = StopSignal::new();
        let tracker = CostTracker::new(Some(1.0), signal.clone());

        tracker.record(0.6);
        assert!(!signal.is_stopped());

        tracker.record(0.6);
        assert!(signal.is_stopped());
        assert_eq!(signal.cause(), Some(StopCause::Budget));
    }

    #[test]
    fn test_limit_is_inclusive() {
        let signal = StopSignal::new();
        let tracker = CostTracker::new(Some(1.0), signal.clone());
        tracker.record(1.0);
        assert!(!signal.is_stopped());
    }
}
