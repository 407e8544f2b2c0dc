//! Thread-safe simulation driver
//!
//! `FluidSimulation` combines:
//! - the [`SimulationState`] behind a mutex
//! - a solver backend chosen by [`crate::config::SolverKind`]
//! - a non-reentrant step guard shared by manual and background steps
//! - an optional background loop thread (`start`/`stop`)
//! - the stability monitor and observer notifications
//!
//! A renderer talks to it through the render queue: poll a frame, draw it,
//! hand it back with `recycle`.

mod observer;
mod pool;
mod render_queue;
mod state;

pub use observer::{FrameInfo, SimulationObserver};
pub use pool::{FieldPool, Pool, Poolable, SnapshotPool};
pub use render_queue::RenderQueue;
pub use state::SimulationState;

use crate::config::{JacobiSettings, SimulationConfig, StabilityThresholds};
use crate::error::SimError;
use crate::grid::{BorderType, FieldKind, FieldRange, GridSnapshot, ObstacleGrid};
use crate::solver::{create_fluid_solver, FluidSolver, FrameTimer};
use crate::stability::{self, CourantReport, StabilityMonitor};
use parking_lot::{Mutex, RwLock};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, trace, warn};

/// What a call to [`FluidSimulation::step`] did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// The step ran and its frame was queued
    Completed(FrameInfo),
    /// Another step was in progress; this call did nothing
    Skipped,
}

thread_local! {
    /// Set while this thread is inside a step (observer callbacks included)
    static IN_STEP: Cell<bool> = const { Cell::new(false) };
}

/// Clears the in-progress flag when dropped, also on unwind
struct StepGuard<'a>(&'a AtomicBool);

impl<'a> StepGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        IN_STEP.with(|in_step| in_step.set(true));
        Self(flag)
    }
}

impl Drop for StepGuard<'_> {
    fn drop(&mut self) {
        IN_STEP.with(|in_step| in_step.set(false));
        self.0.store(false, Ordering::Release);
    }
}

struct Shared {
    state: Mutex<SimulationState>,
    solver: Box<dyn FluidSolver>,
    render_queue: RwLock<Arc<RenderQueue>>,
    monitor: Mutex<StabilityMonitor>,
    timer: Mutex<FrameTimer>,
    observers: RwLock<Vec<Arc<dyn SimulationObserver>>>,
    stepping: AtomicBool,
    running: AtomicBool,
}

impl Shared {
    fn step(&self, dt: Option<f64>) -> Result<StepOutcome, SimError> {
        if self
            .stepping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("Step already in progress, dropping request");
            return Ok(StepOutcome::Skipped);
        }
        let guard = StepGuard::enter(&self.stepping);

        let (frame, max_velocity, cell_size) = {
            let mut state = self.state.lock();
            let dt = dt.unwrap_or(state.config().time_step);
            let frame = state.advance(self.solver.as_ref(), dt)?;
            let max_velocity = state.current_snapshot().max_velocity_component();
            (frame, max_velocity, state.cell_size().0)
        };
        self.timer.lock().record(frame.step_duration_ms);

        for observer in self.observers.read().iter() {
            observer.on_frame_ready(&frame);
        }
        drop(guard);

        let (report, changed) = self
            .monitor
            .lock()
            .check(max_velocity, frame.time_step, cell_size);
        if changed {
            for observer in self.observers.read().iter() {
                observer.on_stability_changed(&report);
            }
        }
        Ok(StepOutcome::Completed(frame))
    }

    fn run_loop(&self) {
        info!("Simulation loop started");
        while self.running.load(Ordering::Acquire) {
            if let Err(e) = self.step(None) {
                error!("Step failed, stopping loop: {}", e);
                self.running.store(false, Ordering::Release);
                break;
            }
            let sleep_ms = self.state.lock().config().sleep_interval_ms;
            if sleep_ms > 0 {
                thread::sleep(Duration::from_millis(sleep_ms));
            }
        }
        info!("Simulation loop stopped");
    }

    fn notify_restart(&self) {
        self.monitor.lock().reset();
        for observer in self.observers.read().iter() {
            observer.on_restart();
        }
    }
}

/// Thread-safe 2D incompressible fluid simulation
pub struct FluidSimulation {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FluidSimulation {
    /// Validate `config` and build the state and solver backend
    pub fn new(config: SimulationConfig) -> Result<Self, SimError> {
        let solver = create_fluid_solver(config.solver, &config.parallel)?;
        let monitor = StabilityMonitor::new(config.stability);
        let state = SimulationState::new(config)?;
        let render_queue = Arc::clone(state.render_queue());
        info!("Fluid simulation ready ({} backend)", solver.name());
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                solver,
                render_queue: RwLock::new(render_queue),
                monitor: Mutex::new(monitor),
                timer: Mutex::new(FrameTimer::new()),
                observers: RwLock::new(Vec::new()),
                stepping: AtomicBool::new(false),
                running: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Advance one step using the configured time step
    ///
    /// Returns [`StepOutcome::Skipped`] without doing anything if a step is
    /// already running on another thread.
    pub fn step(&self) -> Result<StepOutcome, SimError> {
        self.shared.step(None)
    }

    /// Advance one step of `dt` seconds
    pub fn step_by(&self, dt: f64) -> Result<StepOutcome, SimError> {
        SimError::require_positive("time_step", dt)?;
        self.shared.step(Some(dt))
    }

    /// Start the background loop; `false` if it was already running
    pub fn start(&self) -> Result<bool, SimError> {
        let mut worker = self.worker.lock();
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        // A loop that stopped on its own leaves a finished handle behind
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                warn!("Previous simulation loop panicked");
            }
        }
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("fluid-sim-loop".to_string())
            .spawn(move || shared.run_loop())
            .map_err(|e| {
                self.shared.running.store(false, Ordering::Release);
                SimError::ThreadPool(format!("could not spawn simulation loop: {e}"))
            })?;
        *worker = Some(handle);
        Ok(true)
    }

    /// Stop the background loop and wait until no step is in progress
    ///
    /// Safe to call when not running, and from an observer callback (the
    /// step in progress is then left to finish on its own).
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Simulation loop panicked");
            }
        }
        if IN_STEP.with(Cell::get) {
            return;
        }
        while self.shared.stepping.load(Ordering::Acquire) {
            thread::yield_now();
        }
    }

    /// True while the background loop is active
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// True while a step (manual or background) is executing
    pub fn is_step_in_progress(&self) -> bool {
        self.shared.stepping.load(Ordering::Acquire)
    }

    /// Reset time, fields, obstacles and the render queue
    pub fn reinitialize(&self) -> Result<(), SimError> {
        self.shared.state.lock().reinitialize()?;
        self.shared.notify_restart();
        Ok(())
    }

    /// Change the grid resolution (rebuilds pools and the render queue)
    pub fn resize(&self, width: usize, height: usize) -> Result<(), SimError> {
        {
            let mut state = self.shared.state.lock();
            state.resize(width, height)?;
            *self.shared.render_queue.write() = Arc::clone(state.render_queue());
        }
        self.shared.notify_restart();
        Ok(())
    }

    /// Register an observer
    pub fn add_observer(&self, observer: Arc<dyn SimulationObserver>) {
        self.shared.observers.write().push(observer);
    }

    /// Queue frames are published to (replaced by [`Self::resize`])
    pub fn render_queue(&self) -> Arc<RenderQueue> {
        Arc::clone(&*self.shared.render_queue.read())
    }

    /// Take the oldest queued frame; hand it back with [`Self::recycle`]
    pub fn poll_render_queue(&self) -> Option<GridSnapshot> {
        self.shared.render_queue.read().poll()
    }

    /// Run `f` on the oldest queued frame without removing it
    pub fn peek_render_queue<R>(&self, f: impl FnOnce(&GridSnapshot) -> R) -> Option<R> {
        let queue = self.shared.render_queue.read();
        let frame = queue.peek()?;
        let result = f(&*frame);
        Some(result)
    }

    /// Return a consumed frame to the snapshot pool
    pub fn recycle(&self, frame: GridSnapshot) -> Result<(), SimError> {
        self.shared.render_queue.read().recycle(frame)
    }

    /// Run `f` on the current snapshot (holds the state lock)
    pub fn with_current_snapshot<R>(&self, f: impl FnOnce(&GridSnapshot) -> R) -> R {
        f(self.shared.state.lock().current_snapshot())
    }

    /// Run `f` on the whole state (holds the state lock)
    pub fn with_state<R>(&self, f: impl FnOnce(&SimulationState) -> R) -> R {
        f(&self.shared.state.lock())
    }

    /// Smoothed extrema of one field, for legend scaling
    pub fn field_range(&self, kind: FieldKind) -> FieldRange {
        self.shared.state.lock().field_range(kind)
    }

    /// Courant number of the current state, `None` when the flow is at rest
    ///
    /// Uses the `dt` of the last completed step, so a `step_by` override is
    /// honored. Before the first step the configured time step is used.
    pub fn courant_number(&self) -> Option<f64> {
        let state = self.shared.state.lock();
        let dt = state.last_time_step().unwrap_or(state.config().time_step);
        stability::courant_number(
            state.current_snapshot().max_velocity_component(),
            dt,
            state.cell_size().0,
        )
    }

    /// Report of the last stability check
    pub fn last_stability_report(&self) -> Option<CourantReport> {
        self.shared.monitor.lock().last_report()
    }

    /// Simulated seconds since the last reinitialization
    pub fn simulated_time(&self) -> f64 {
        self.shared.state.lock().simulated_time()
    }

    /// Steps since the last reinitialization
    pub fn iteration(&self) -> u64 {
        self.shared.state.lock().iteration()
    }

    /// Snapshot of the configuration including every setter change
    pub fn config(&self) -> SimulationConfig {
        self.shared.state.lock().config().clone()
    }

    /// Duration of the last step and the smoothed average (ms)
    pub fn step_timing(&self) -> (f64, f64) {
        let timer = self.shared.timer.lock();
        (timer.last_frame_time_ms(), timer.average_frame_time_ms())
    }

    /// Name of the solver backend
    pub fn solver_name(&self) -> &'static str {
        self.shared.solver.name()
    }

    /// Dynamic viscosity in Pa·s; finite and > 0
    pub fn set_dynamic_viscosity(&self, value: f64) -> Result<(), SimError> {
        self.shared.state.lock().set_dynamic_viscosity(value)
    }

    /// Fluid density in kg/m³; finite and > 0
    pub fn set_volume_density(&self, value: f64) -> Result<(), SimError> {
        self.shared.state.lock().set_volume_density(value)
    }

    /// Inflow speed in m/s, within [0, speed of sound]
    pub fn set_initial_inflow_speed(&self, value: f64) -> Result<(), SimError> {
        self.shared.state.lock().set_initial_inflow_speed(value)
    }

    /// Step length used by `step` and the loop; finite and > 0
    pub fn set_time_step(&self, value: f64) -> Result<(), SimError> {
        self.shared.state.lock().set_time_step(value)
    }

    /// Pause between background loop steps, read before each sleep
    pub fn set_sleep_interval_ms(&self, value: u64) {
        self.shared.state.lock().set_sleep_interval_ms(value);
    }

    /// Confinement strength within [0, 1]
    pub fn set_vortex_confinement_factor(&self, value: f64) -> Result<(), SimError> {
        self.shared.state.lock().set_vortex_confinement_factor(value)
    }

    /// Physical extent in meters; both finite and > 0
    pub fn set_physical_size(&self, width: f64, height: f64) -> Result<(), SimError> {
        self.shared.state.lock().set_physical_size(width, height)
    }

    /// Change the border layout and redraw the border cells
    pub fn set_border_type(&self, border_type: BorderType) {
        self.shared.state.lock().set_border_type(border_type);
    }

    /// Uniform force added each step; both components finite
    pub fn set_external_force(&self, fx: f64, fy: f64) -> Result<(), SimError> {
        self.shared.state.lock().set_external_force(fx, fy)
    }

    /// Jacobi limits; max_iterations >= 1 and tolerance >= 0
    pub fn set_jacobi_settings(&self, settings: JacobiSettings) -> Result<(), SimError> {
        self.shared.state.lock().set_jacobi_settings(settings)
    }

    /// Courant thresholds; requires 0 < warn < error
    ///
    /// Also resets the monitor so the next step re-reports its status.
    pub fn set_stability_thresholds(
        &self,
        thresholds: StabilityThresholds,
    ) -> Result<(), SimError> {
        self.shared.state.lock().set_stability_thresholds(thresholds)?;
        self.shared.monitor.lock().set_thresholds(thresholds);
        Ok(())
    }

    /// Replace the current snapshot (must match the grid size)
    pub fn set_current_snapshot(&self, snapshot: GridSnapshot) -> Result<(), SimError> {
        self.shared.state.lock().set_current_snapshot(snapshot)
    }

    /// Replace the obstacle grid (must match the grid size)
    pub fn set_obstacle_grid(&self, obstacles: ObstacleGrid) -> Result<(), SimError> {
        self.shared.state.lock().set_obstacle_grid(obstacles)
    }
}

impl Drop for FluidSimulation {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverKind;
    use std::sync::atomic::AtomicUsize;

    fn config() -> SimulationConfig {
        SimulationConfig {
            solver: SolverKind::Sequential,
            time_step: 0.005,
            ..SimulationConfig::with_grid(24, 12)
        }
    }

    #[derive(Default)]
    struct Counter {
        frames: AtomicUsize,
        restarts: AtomicUsize,
        stability: AtomicUsize,
    }

    impl SimulationObserver for Counter {
        fn on_frame_ready(&self, _frame: &FrameInfo) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }

        fn on_restart(&self) {
            self.restarts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stability_changed(&self, _report: &CourantReport) {
            self.stability.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_step_notifies_observers() {
        let sim = FluidSimulation::new(config()).unwrap();
        let counter = Arc::new(Counter::default());
        sim.add_observer(counter.clone());

        for _ in 0..3 {
            assert!(matches!(sim.step().unwrap(), StepOutcome::Completed(_)));
        }
        assert_eq!(counter.frames.load(Ordering::SeqCst), 3);
        // First check always reports
        assert!(counter.stability.load(Ordering::SeqCst) >= 1);
        assert_eq!(sim.iteration(), 3);
        assert!(sim.last_stability_report().is_some());

        sim.reinitialize().unwrap();
        assert_eq!(counter.restarts.load(Ordering::SeqCst), 1);
        assert_eq!(sim.iteration(), 0);
    }

    #[test]
    fn test_step_guard_drops_reentrant_call() {
        let sim = FluidSimulation::new(config()).unwrap();
        sim.shared.stepping.store(true, Ordering::Release);
        assert_eq!(sim.step().unwrap(), StepOutcome::Skipped);
        assert_eq!(sim.iteration(), 0);
        sim.shared.stepping.store(false, Ordering::Release);
        assert!(matches!(sim.step().unwrap(), StepOutcome::Completed(_)));
    }

    #[test]
    fn test_step_by_rejects_bad_dt() {
        let sim = FluidSimulation::new(config()).unwrap();
        assert!(sim.step_by(0.0).is_err());
        assert!(sim.step_by(f64::NAN).is_err());
        assert_eq!(sim.iteration(), 0);
        assert!(!sim.is_step_in_progress());
    }

    #[test]
    fn test_courant_number_uses_last_step_dt() {
        let sim = FluidSimulation::new(config()).unwrap();
        sim.step_by(0.02).unwrap();
        let report = sim.last_stability_report().unwrap();
        assert!(report.number.is_some());
        assert_eq!(sim.courant_number(), report.number);
        assert_eq!(sim.with_state(SimulationState::last_time_step), Some(0.02));

        sim.reinitialize().unwrap();
        assert_eq!(sim.with_state(SimulationState::last_time_step), None);
    }

    #[test]
    fn test_render_queue_round_trip() {
        let sim = FluidSimulation::new(config()).unwrap();
        sim.step().unwrap();
        sim.step().unwrap();
        assert_eq!(sim.peek_render_queue(GridSnapshot::width), Some(24));
        let frame = sim.poll_render_queue().unwrap();
        sim.recycle(frame).unwrap();
        assert_eq!(sim.render_queue().len(), 1);
    }

    #[test]
    fn test_resize_swaps_render_queue() {
        let sim = FluidSimulation::new(config()).unwrap();
        sim.step().unwrap();
        let old_queue = sim.render_queue();
        sim.resize(16, 16).unwrap();
        assert!(!Arc::ptr_eq(&old_queue, &sim.render_queue()));
        assert!(old_queue.is_empty());
        sim.step().unwrap();
        let frame = sim.poll_render_queue().unwrap();
        assert_eq!(frame.dimensions(), (16, 16));
        sim.recycle(frame).unwrap();
    }

    #[test]
    fn test_stability_threshold_setter_validates() {
        let sim = FluidSimulation::new(config()).unwrap();
        let bad = StabilityThresholds {
            warn: 1.0,
            error: 0.5,
        };
        assert!(sim.set_stability_thresholds(bad).is_err());
        assert_eq!(sim.config().stability, StabilityThresholds::default());
    }
}
