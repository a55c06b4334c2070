//! Motion aggregation
//!
//! Pointer deltas arrive at irregular intervals. The aggregator folds whatever
//! accumulated since the previous call into one [`MotionSample`] carrying the
//! elapsed time, so the curve can work in counts per second.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::trace;

/// Shortest interval a sample may report
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// Aggregated pointer motion over one interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub dx: f64,
    pub dy: f64,
    /// Always at least [`MIN_SAMPLE_INTERVAL`]
    pub dt_seconds: f64,
}

#[derive(Debug, Default)]
struct Pending {
    dx: f64,
    dy: f64,
    last: Option<Instant>,
}

/// Thread-safe accumulator for raw pointer deltas
#[derive(Debug, Default)]
pub struct MotionAggregator {
    pending: Mutex<Pending>,
}

impl MotionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, dx: i32, dy: i32) -> MotionSample {
        self.add_at(dx, dy, Instant::now())
    }

    /// Folds a delta observed at `now` into a sample and clears the
    /// accumulator.
    pub fn add_at(&self, dx: i32, dy: i32, now: Instant) -> MotionSample {
        let mut pending = self.pending.lock();
        pending.dx += f64::from(dx);
        pending.dy += f64::from(dy);

        let elapsed = match pending.last {
            Some(last) => now.saturating_duration_since(last),
            None => MIN_SAMPLE_INTERVAL,
        };
        pending.last = Some(now);

        let sample = MotionSample {
            dx: pending.dx,
            dy: pending.dy,
            dt_seconds: elapsed.max(MIN_SAMPLE_INTERVAL).as_secs_f64(),
        };
        pending.dx = 0.0;
        pending.dy = 0.0;

        trace!("Aggregated motion sample: {:?}", sample);
        sample
    }

    /// Next call to [`add`](Self::add) behaves like the very first one.
    pub fn reset(&self) {
        let mut pending = self.pending.lock();
        pending.dx = 0.0;
        pending.dy = 0.0;
        pending.last = None;
    }
}
