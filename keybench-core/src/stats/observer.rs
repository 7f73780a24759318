use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Records durations, returning the observation count and average duration in milliseconds.
///
/// Both counters are updated independently without locks, so a [`reset`](Self::reset) racing
/// with [`observe`](Self::observe) may attribute a duration to the wrong interval. This is only
/// used for live throughput estimates, never for final results.
#[derive(Debug, Default)]
pub struct DurationObserver {
    count: AtomicU64,
    cumulative_ms: AtomicU64,
}

impl DurationObserver {
    /// Creates an observer with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `duration` and increments the operation count by `delta`.
    pub fn observe(&self, duration: Duration, delta: u64) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.cumulative_ms.fetch_add(millis, Ordering::Relaxed);
        self.count.fetch_add(delta, Ordering::Relaxed);
    }

    /// Returns `(count, average milliseconds)` of all observations since the last reset, and
    /// zeroes both counters.
    ///
    /// Returns `(0, 0)` if nothing was observed.
    pub fn reset(&self) -> (u64, u64) {
        let count = self.count.swap(0, Ordering::Relaxed);
        let cumulative_ms = self.cumulative_ms.swap(0, Ordering::Relaxed);

        if count == 0 {
            return (0, 0);
        }

        (count, cumulative_ms / count)
    }
}
