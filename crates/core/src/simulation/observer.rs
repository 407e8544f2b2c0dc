//! Callbacks for renderers and UIs
//!
//! Observers are invoked on the stepping thread after the state lock has been
//! released, so they may call back into the simulation (poll the render
//! queue, read ranges). They must not block for long: the next step waits.

use crate::solver::JacobiReport;
use crate::stability::CourantReport;

/// Summary of one completed step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Iteration index of the step (1-based)
    pub iteration: u64,
    /// Simulated time after the step (s)
    pub simulated_time: f64,
    /// Timestep used (s)
    pub time_step: f64,
    /// Wall-clock duration of the step (ms)
    pub step_duration_ms: f64,
    /// Frames waiting in the render queue after publishing
    pub queued_frames: usize,
    /// Frames evicted by this publish
    pub evicted_frames: usize,
    /// Jacobi outcome of the x and y velocity diffusion
    pub diffusion: [JacobiReport; 2],
    /// Jacobi outcome of the pressure solve
    pub pressure: JacobiReport,
}

/// Receives simulation events; every method defaults to a no-op
pub trait SimulationObserver: Send + Sync {
    /// A step finished and its frame was queued
    fn on_frame_ready(&self, _frame: &FrameInfo) {}

    /// The simulation was reinitialized or resized
    fn on_restart(&self) {}

    /// The Courant classification changed
    fn on_stability_changed(&self, _report: &CourantReport) {}
}
