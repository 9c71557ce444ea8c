//! Concurrency measurement for scheduler tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Tracks how many producers are inside their `produce` call at once.
///
/// Used to assert the executor's concurrency bound: every mock enters the
/// gauge on start and leaves on drop, and the peak is inspected after the
/// run.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    /// Creates a shared gauge.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Enters the gauge, returning a guard that leaves on drop.
    pub fn enter(self: &Arc<Self>) -> GaugeGuard {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        GaugeGuard {
            gauge: Arc::clone(self),
        }
    }

    /// Returns the highest concurrent occupancy observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Occupancy guard handed out by [`ConcurrencyGauge::enter`].
#[derive(Debug)]
pub struct GaugeGuard {
    gauge: Arc<ConcurrencyGauge>,
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_tracks_maximum() {
        let gauge = ConcurrencyGauge::new();
        let a = gauge.enter();
        let b = gauge.enter();
        drop(a);
        let c = gauge.enter();
        drop(b);
        drop(c);
        assert_eq!(gauge.peak(), 2);
    }
}
