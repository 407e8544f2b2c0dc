//! Simulation configuration
//!
//! [`SimulationConfig`] gathers every physical and numerical parameter of a
//! simulation. It is serde-serializable so front-ends can load it from a file,
//! and [`SimulationConfig::validate`] enforces the parameter domains before a
//! simulation is built from it.

use crate::error::SimError;
use crate::grid::BorderType;
use serde::{Deserialize, Serialize};

/// Physical constants and numerical defaults
pub mod constants {
    /// Speed of sound in air (m/s), upper bound for the inflow speed
    pub const SPEED_OF_SOUND: f64 = 340.0;

    /// Ambient temperature used to seed fresh snapshots (K)
    pub const AMBIENT_TEMPERATURE: f64 = 293.15;

    /// Dynamic viscosity of air at 20°C (Pa·s)
    pub const AIR_DYNAMIC_VISCOSITY: f64 = 1.81e-5;

    /// Density of air at sea level (kg/m³)
    pub const AIR_DENSITY: f64 = 1.225;

    /// Default cap on Jacobi sweeps per solve
    pub const MAX_JACOBI_ITERATIONS: usize = 50;

    /// Default convergence threshold on the per-sweep relative change
    pub const MAX_JACOBI_DIFF: f64 = 1e-4;

    /// Smallest grid dimension the stencils support
    pub const MIN_GRID_SIZE: usize = 3;
}

/// Jacobi iteration settings shared by diffusion and the pressure solve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JacobiSettings {
    /// Maximum number of sweeps per solve
    pub max_iterations: usize,
    /// Stop once the smallest relative change in a sweep drops below this
    pub tolerance: f64,
}

impl Default for JacobiSettings {
    fn default() -> Self {
        Self {
            max_iterations: constants::MAX_JACOBI_ITERATIONS,
            tolerance: constants::MAX_JACOBI_DIFF,
        }
    }
}

/// Courant-number thresholds for the stability monitor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityThresholds {
    /// At or above this the monitor warns
    pub warn: f64,
    /// At or above this the monitor reports an error
    pub error: f64,
}

impl Default for StabilityThresholds {
    fn default() -> Self {
        Self {
            warn: 0.5,
            error: 1.0,
        }
    }
}

/// Work splitting for the parallel solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelSettings {
    /// Index ranges at or below this many cells are solved sequentially
    pub subtask_size: usize,
    /// Worker threads; 0 uses rayon's global pool
    pub threads: usize,
}

impl Default for ParallelSettings {
    fn default() -> Self {
        Self {
            subtask_size: 4096,
            threads: 0,
        }
    }
}

/// Which solver backend to run the kernels on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Single-threaded kernels
    Sequential,
    /// Divide-and-conquer kernels on a work-stealing pool
    #[default]
    Parallel,
}

/// Full configuration of a fluid simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Grid width in cells
    pub grid_width: usize,
    /// Grid height in cells
    pub grid_height: usize,
    /// Domain width in meters
    pub physical_width: f64,
    /// Domain height in meters
    pub physical_height: f64,
    /// Dynamic viscosity μ (Pa·s)
    pub dynamic_viscosity: f64,
    /// Volume density ρ (kg/m³)
    pub volume_density: f64,
    /// Speed stamped by inflow cells (m/s)
    pub initial_inflow_speed: f64,
    /// Simulated seconds per step
    pub time_step: f64,
    /// Pause between steps of the background loop (ms)
    pub sleep_interval_ms: u64,
    /// Vorticity confinement strength in `[0, 1]`
    pub vortex_confinement_factor: f64,
    /// Boundary drawn around the domain on reinitialization
    pub border_type: BorderType,
    /// Frames kept in the render queue before the oldest is dropped
    pub render_queue_capacity: usize,
    /// Snapshots pre-allocated by the pool
    pub pool_reserve: usize,
    /// Kernel backend
    pub solver: SolverKind,
    /// Jacobi iteration settings
    pub jacobi: JacobiSettings,
    /// Courant thresholds
    pub stability: StabilityThresholds,
    /// Parallel work splitting
    pub parallel: ParallelSettings,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grid_width: 200,
            grid_height: 100,
            physical_width: 10.0,
            physical_height: 5.0,
            dynamic_viscosity: constants::AIR_DYNAMIC_VISCOSITY,
            volume_density: constants::AIR_DENSITY,
            initial_inflow_speed: 5.0,
            time_step: 0.001,
            sleep_interval_ms: 0,
            vortex_confinement_factor: 0.2,
            border_type: BorderType::WindTunnel,
            render_queue_capacity: 4,
            pool_reserve: 4,
            solver: SolverKind::default(),
            jacobi: JacobiSettings::default(),
            stability: StabilityThresholds::default(),
            parallel: ParallelSettings::default(),
        }
    }
}

impl SimulationConfig {
    /// Create a configuration for a `width`×`height` grid, everything else default
    pub fn with_grid(width: usize, height: usize) -> Self {
        Self {
            grid_width: width,
            grid_height: height,
            ..Self::default()
        }
    }

    /// Kinematic viscosity ν = μ / ρ (m²/s)
    pub fn kinematic_viscosity(&self) -> f64 {
        self.dynamic_viscosity / self.volume_density
    }

    /// Check every parameter domain
    ///
    /// Values are never clamped; the first violation is returned.
    pub fn validate(&self) -> Result<(), SimError> {
        validate_grid_size(self.grid_width, self.grid_height)?;
        SimError::require_positive("physical_width", self.physical_width)?;
        SimError::require_positive("physical_height", self.physical_height)?;
        SimError::require_positive("dynamic_viscosity", self.dynamic_viscosity)?;
        SimError::require_positive("volume_density", self.volume_density)?;
        SimError::require_range(
            "initial_inflow_speed",
            self.initial_inflow_speed,
            0.0,
            constants::SPEED_OF_SOUND,
        )?;
        SimError::require_positive("time_step", self.time_step)?;
        SimError::require_range(
            "vortex_confinement_factor",
            self.vortex_confinement_factor,
            0.0,
            1.0,
        )?;
        if self.render_queue_capacity == 0 {
            return Err(SimError::invalid_parameter(
                "render_queue_capacity",
                "must hold at least one frame",
            ));
        }
        if self.jacobi.max_iterations == 0 {
            return Err(SimError::invalid_parameter(
                "jacobi.max_iterations",
                "must allow at least one sweep",
            ));
        }
        if self.jacobi.tolerance.is_nan() || self.jacobi.tolerance < 0.0 {
            return Err(SimError::invalid_parameter(
                "jacobi.tolerance",
                format!("must be non-negative, got {}", self.jacobi.tolerance),
            ));
        }
        SimError::require_positive("stability.warn", self.stability.warn)?;
        if self.stability.error.is_nan() || self.stability.error <= self.stability.warn {
            return Err(SimError::invalid_parameter(
                "stability.error",
                format!(
                    "must exceed the warn threshold {}, got {}",
                    self.stability.warn, self.stability.error
                ),
            ));
        }
        if self.parallel.subtask_size == 0 {
            return Err(SimError::invalid_parameter(
                "parallel.subtask_size",
                "must be at least one cell",
            ));
        }
        Ok(())
    }
}

/// Grids smaller than the central-difference stencil are rejected
pub(crate) fn validate_grid_size(width: usize, height: usize) -> Result<(), SimError> {
    let min = constants::MIN_GRID_SIZE;
    if width < min || height < min {
        return Err(SimError::invalid_parameter(
            "grid_size",
            format!("must be at least {min}x{min}, got {width}x{height}"),
        ));
    }
    Ok(())
}
