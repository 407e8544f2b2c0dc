//! Simulation state and the step pipeline that advances it
//!
//! [`SimulationState`] owns everything one step reads and writes: the
//! current snapshot, the obstacle grid, the pools, the render queue and the
//! validated parameters. It is not thread-safe on its own;
//! [`super::FluidSimulation`] wraps it in a mutex.

use super::observer::FrameInfo;
use super::pool::{FieldPool, SnapshotPool};
use super::render_queue::RenderQueue;
use crate::config::{
    constants, validate_grid_size, JacobiSettings, SimulationConfig, StabilityThresholds,
};
use crate::error::SimError;
use crate::grid::{BorderType, FieldKind, FieldRange, GridSnapshot, ObstacleGrid};
use crate::solver::stages::{self, StageContext};
use crate::solver::{FluidSolver, JacobiReport, ProfilerScope};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Everything a step needs, plus the run counters
pub struct SimulationState {
    config: SimulationConfig,
    kinematic_viscosity: f64,
    external_force: (f64, f64),
    current: GridSnapshot,
    obstacles: ObstacleGrid,
    snapshot_pool: Arc<SnapshotPool>,
    field_pool: FieldPool,
    render_queue: Arc<RenderQueue>,
    simulated_time: f64,
    iteration: u64,
    last_time_step: Option<f64>,
}

/// Jacobi outcomes of the stages that ran one
struct StageReports {
    diffusion: [JacobiReport; 2],
    pressure: JacobiReport,
}

impl SimulationState {
    /// Build a state from a validated configuration
    ///
    /// The current snapshot starts zeroed (ambient temperature) and the
    /// obstacle grid gets the default layout for `config.border_type`.
    pub fn new(config: SimulationConfig) -> Result<Self, SimError> {
        config.validate()?;
        let (width, height) = (config.grid_width, config.grid_height);
        let snapshot_pool = Arc::new(SnapshotPool::new(width, height, config.pool_reserve));
        let render_queue = Arc::new(RenderQueue::new(
            config.render_queue_capacity,
            Arc::clone(&snapshot_pool),
        ));
        info!(
            "Simulation state: {}x{} cells over {}x{} m, border {:?}",
            width, height, config.physical_width, config.physical_height, config.border_type
        );
        Ok(Self {
            kinematic_viscosity: config.kinematic_viscosity(),
            external_force: (0.0, 0.0),
            current: GridSnapshot::new(width, height),
            obstacles: ObstacleGrid::with_default_layout(width, height, config.border_type),
            snapshot_pool,
            field_pool: FieldPool::new(width, height, 2),
            render_queue,
            simulated_time: 0.0,
            iteration: 0,
            last_time_step: None,
            config,
        })
    }

    /// Current configuration (reflects every setter)
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// `(grid_width, grid_height)`
    pub fn dimensions(&self) -> (usize, usize) {
        (self.config.grid_width, self.config.grid_height)
    }

    /// Cell extent `(x, y)` in meters
    pub fn cell_size(&self) -> (f64, f64) {
        (
            self.config.physical_width / self.config.grid_width as f64,
            self.config.physical_height / self.config.grid_height as f64,
        )
    }

    /// Cells per meter `(x, y)`
    pub fn cells_per_meter(&self) -> (f64, f64) {
        let (cx, cy) = self.cell_size();
        (1.0 / cx, 1.0 / cy)
    }

    /// ν = μ / ρ (m²/s), re-derived by the viscosity and density setters
    pub fn kinematic_viscosity(&self) -> f64 {
        self.kinematic_viscosity
    }

    /// Uniform force added every step
    pub fn external_force(&self) -> (f64, f64) {
        self.external_force
    }

    /// Snapshot holding the latest time level
    pub fn current_snapshot(&self) -> &GridSnapshot {
        &self.current
    }

    /// Smoothed extrema of one field of the current snapshot
    pub fn field_range(&self, kind: FieldKind) -> FieldRange {
        self.current.range(kind)
    }

    /// Obstacle markers
    pub fn obstacle_grid(&self) -> &ObstacleGrid {
        &self.obstacles
    }

    /// Pool the step pipeline borrows snapshots from
    pub fn snapshot_pool(&self) -> &Arc<SnapshotPool> {
        &self.snapshot_pool
    }

    /// Queue finished frames are published to
    pub fn render_queue(&self) -> &Arc<RenderQueue> {
        &self.render_queue
    }

    /// Simulated seconds since the last reinitialization
    pub fn simulated_time(&self) -> f64 {
        self.simulated_time
    }

    /// Steps since the last reinitialization
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// `dt` of the last completed step, `None` before the first one
    pub fn last_time_step(&self) -> Option<f64> {
        self.last_time_step
    }

    /// Dynamic viscosity in Pa·s; finite and > 0, recomputes the kinematic viscosity
    pub fn set_dynamic_viscosity(&mut self, value: f64) -> Result<(), SimError> {
        self.config.dynamic_viscosity = SimError::require_positive("dynamic_viscosity", value)?;
        self.kinematic_viscosity = self.config.kinematic_viscosity();
        Ok(())
    }

    /// Fluid density in kg/m³; finite and > 0, recomputes the kinematic viscosity
    pub fn set_volume_density(&mut self, value: f64) -> Result<(), SimError> {
        self.config.volume_density = SimError::require_positive("volume_density", value)?;
        self.kinematic_viscosity = self.config.kinematic_viscosity();
        Ok(())
    }

    /// Inflow speed in m/s, within [0, speed of sound]
    pub fn set_initial_inflow_speed(&mut self, value: f64) -> Result<(), SimError> {
        self.config.initial_inflow_speed = SimError::require_range(
            "initial_inflow_speed",
            value,
            0.0,
            constants::SPEED_OF_SOUND,
        )?;
        Ok(())
    }

    /// Default step length in seconds; finite and > 0
    pub fn set_time_step(&mut self, value: f64) -> Result<(), SimError> {
        self.config.time_step = SimError::require_positive("time_step", value)?;
        Ok(())
    }

    /// Pause between background loop steps; 0 runs back to back
    pub fn set_sleep_interval_ms(&mut self, value: u64) {
        self.config.sleep_interval_ms = value;
    }

    /// Confinement strength within [0, 1]; 0 skips the stage
    pub fn set_vortex_confinement_factor(&mut self, value: f64) -> Result<(), SimError> {
        self.config.vortex_confinement_factor =
            SimError::require_range("vortex_confinement_factor", value, 0.0, 1.0)?;
        Ok(())
    }

    /// Physical extent of the domain in meters
    pub fn set_physical_size(&mut self, width: f64, height: f64) -> Result<(), SimError> {
        let width = SimError::require_positive("physical_width", width)?;
        let height = SimError::require_positive("physical_height", height)?;
        self.config.physical_width = width;
        self.config.physical_height = height;
        Ok(())
    }

    /// Change the border layout and redraw the border cells
    pub fn set_border_type(&mut self, border_type: BorderType) {
        self.config.border_type = border_type;
        self.obstacles.draw_border(border_type);
    }

    /// Uniform force added after diffusion; both components finite
    pub fn set_external_force(&mut self, fx: f64, fy: f64) -> Result<(), SimError> {
        if !fx.is_finite() || !fy.is_finite() {
            return Err(SimError::invalid_parameter(
                "external_force",
                format!("must be finite, got ({fx}, {fy})"),
            ));
        }
        self.external_force = (fx, fy);
        Ok(())
    }

    /// Jacobi limits; max_iterations >= 1 and tolerance >= 0
    pub fn set_jacobi_settings(&mut self, settings: JacobiSettings) -> Result<(), SimError> {
        let candidate = SimulationConfig {
            jacobi: settings,
            ..self.config.clone()
        };
        candidate.validate()?;
        self.config = candidate;
        Ok(())
    }

    /// Courant thresholds; requires 0 < warn < error
    pub fn set_stability_thresholds(
        &mut self,
        thresholds: StabilityThresholds,
    ) -> Result<(), SimError> {
        let candidate = SimulationConfig {
            stability: thresholds,
            ..self.config.clone()
        };
        candidate.validate()?;
        self.config = candidate;
        Ok(())
    }

    /// Replace the current snapshot; the old one goes back to the pool
    pub fn set_current_snapshot(&mut self, snapshot: GridSnapshot) -> Result<(), SimError> {
        if snapshot.dimensions() != self.dimensions() {
            return Err(SimError::size_mismatch(
                "snapshot",
                self.dimensions(),
                snapshot.dimensions(),
            ));
        }
        let old = std::mem::replace(&mut self.current, snapshot);
        self.snapshot_pool.give_back(old)
    }

    /// Replace the obstacle grid
    pub fn set_obstacle_grid(&mut self, obstacles: ObstacleGrid) -> Result<(), SimError> {
        if obstacles.dimensions() != self.dimensions() {
            return Err(SimError::size_mismatch(
                "obstacle grid",
                self.dimensions(),
                obstacles.dimensions(),
            ));
        }
        self.obstacles = obstacles;
        Ok(())
    }

    /// Back to time zero: fresh fields, default obstacles, empty render queue
    pub fn reinitialize(&mut self) -> Result<(), SimError> {
        self.render_queue.clear()?;
        self.simulated_time = 0.0;
        self.iteration = 0;
        self.last_time_step = None;
        self.current.reset();
        let (width, height) = self.dimensions();
        self.obstacles = ObstacleGrid::with_default_layout(width, height, self.config.border_type);
        info!("Simulation reinitialized");
        Ok(())
    }

    /// Change the grid resolution
    ///
    /// Builds new pools and a new render queue (frames of the old size are
    /// dropped with the old queue) and reinitializes.
    pub fn resize(&mut self, width: usize, height: usize) -> Result<(), SimError> {
        validate_grid_size(width, height)?;
        self.render_queue.clear()?;

        self.config.grid_width = width;
        self.config.grid_height = height;
        self.snapshot_pool = Arc::new(SnapshotPool::new(width, height, self.config.pool_reserve));
        self.field_pool = FieldPool::new(width, height, 2);
        self.render_queue = Arc::new(RenderQueue::new(
            self.config.render_queue_capacity,
            Arc::clone(&self.snapshot_pool),
        ));
        self.current = GridSnapshot::new(width, height);
        info!("Grid resized to {}x{}", width, height);
        self.reinitialize()
    }

    /// Run one full step of `dt` seconds
    ///
    /// The old current snapshot becomes the previous time level: advection
    /// reads it, and afterwards it is published to the render queue. If a
    /// stage fails, that level is restored as current and the counters are
    /// rolled back.
    pub fn advance(&mut self, solver: &dyn FluidSolver, dt: f64) -> Result<FrameInfo, SimError> {
        SimError::require_positive("time_step", dt)?;
        let started = Instant::now();
        let _scope = ProfilerScope::new("step");

        let counters = (self.simulated_time, self.iteration);
        self.simulated_time += dt;
        self.iteration += 1;

        if self.config.border_type == BorderType::WindTunnel {
            let _scope = ProfilerScope::new("inject_inflow");
            stages::inject_inflow_velocity(
                &mut self.current,
                &self.obstacles,
                self.config.initial_inflow_speed,
            );
            solver.apply_boundary_conditions(&mut self.current, &self.obstacles);
        }

        let next = self.snapshot_pool.acquire();
        let previous = std::mem::replace(&mut self.current, next);
        let reports = match self.run_stages(solver, &previous, dt) {
            Ok(reports) => reports,
            Err(e) => {
                let partial = std::mem::replace(&mut self.current, previous);
                (self.simulated_time, self.iteration) = counters;
                self.snapshot_pool.give_back(partial)?;
                return Err(e);
            }
        };

        let evicted_frames = {
            let _scope = ProfilerScope::new("publish");
            self.render_queue.push(previous)?
        };
        self.last_time_step = Some(dt);

        let frame = FrameInfo {
            iteration: self.iteration,
            simulated_time: self.simulated_time,
            time_step: dt,
            step_duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            queued_frames: self.render_queue.len(),
            evicted_frames,
            diffusion: reports.diffusion,
            pressure: reports.pressure,
        };
        debug!(
            "Step {} t={:.4}s in {:.2} ms, {} frame(s) queued",
            frame.iteration, frame.simulated_time, frame.step_duration_ms, frame.queued_frames
        );
        Ok(frame)
    }

    fn run_stages(
        &mut self,
        solver: &dyn FluidSolver,
        previous: &GridSnapshot,
        dt: f64,
    ) -> Result<StageReports, SimError> {
        let (cell_x, cell_y) = self.cell_size();
        let cells_per_meter = self.cells_per_meter();

        {
            let _scope = ProfilerScope::new("advect");
            stages::advect(solver, previous, &mut self.current, dt, cells_per_meter)?;
            solver.apply_boundary_conditions(&mut self.current, &self.obstacles);
        }

        if self.config.vortex_confinement_factor > 0.0 {
            let _scope = ProfilerScope::new("vorticity_confinement");
            stages::vorticity_confinement(
                solver,
                &mut self.current,
                &self.obstacles,
                self.config.vortex_confinement_factor,
                cell_x,
            );
            solver.apply_boundary_conditions(&mut self.current, &self.obstacles);
        }

        let stage = StageContext {
            solver,
            obstacles: &self.obstacles,
            scratch: &self.field_pool,
            jacobi: &self.config.jacobi,
            cell_x,
            cell_y,
        };

        let diffusion = {
            let _scope = ProfilerScope::new("diffuse");
            let reports =
                stages::diffuse(&stage, &mut self.current, dt, self.kinematic_viscosity)?;
            solver.apply_boundary_conditions(&mut self.current, &self.obstacles);
            reports
        };

        let (fx, fy) = self.external_force;
        stages::add_force(&mut self.current, fx, fy);

        let pressure = {
            let _scope = ProfilerScope::new("project");
            stages::divergence(&mut self.current, cell_x, cell_y);
            let report = stages::pressure_solve(&stage, &mut self.current)?;
            stages::pressure_gradient(&mut self.current, cell_x, cell_y);
            stages::subtract_pressure_gradient(&mut self.current, &self.obstacles);
            solver.apply_boundary_conditions(&mut self.current, &self.obstacles);
            report
        };

        stages::update_min_max(&mut self.current, &self.obstacles, self.iteration);

        Ok(StageReports {
            diffusion,
            pressure,
        })
    }
}
