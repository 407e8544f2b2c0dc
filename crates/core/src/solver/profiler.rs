//! Stage timing
//!
//! `ProfilerScope` guards wrap each pipeline stage and emit their wall time at
//! `trace` level; `FrameTimer` keeps the step duration shown to users.
use std::time::Instant;
use tracing::trace;

/// Wall-clock guard for one named stage, reported on drop
pub struct ProfilerScope {
    start: Instant,
    name: &'static str,
}

impl ProfilerScope {
    /// Start timing `name`
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Milliseconds since the scope was opened
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for ProfilerScope {
    fn drop(&mut self) {
        trace!("{}: {:.3} ms", self.name, self.elapsed_ms());
    }
}

/// Last and smoothed step duration
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameTimer {
    last_frame_time_ms: f64,
    average_frame_time_ms: f64,
}

impl FrameTimer {
    /// Weight of the newest sample in the smoothed average
    const SMOOTHING: f64 = 0.1;

    /// Timer with no samples
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step duration (ms); the first sample seeds the average
    pub fn record(&mut self, time_ms: f64) {
        self.average_frame_time_ms = if self.last_frame_time_ms == 0.0 {
            time_ms
        } else {
            self.average_frame_time_ms + Self::SMOOTHING * (time_ms - self.average_frame_time_ms)
        };
        self.last_frame_time_ms = time_ms;
    }

    /// Most recent sample (ms)
    pub fn last_frame_time_ms(&self) -> f64 {
        self.last_frame_time_ms
    }

    /// Exponentially smoothed duration (ms)
    pub fn average_frame_time_ms(&self) -> f64 {
        self.average_frame_time_ms
    }
}
