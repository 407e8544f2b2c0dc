//! Fluid Simulation Core Library
//!
//! A 2D incompressible fluid solver based on Stam's stable-fluids method, for
//! wind-tunnel style experiments around obstacles.
//!
//! ## Step Pipeline
//!
//! Each step runs on a collocated grid:
//! - Inflow injection and boundary conditions on obstacle cells
//! - Semi-Lagrangian advection of velocity, temperature and density
//! - Optional vorticity confinement
//! - Jacobi diffusion of the velocity components
//! - Pressure projection (divergence, Jacobi pressure solve, gradient
//!   subtraction)
//!
//! Grid-wide passes run sequentially or on a rayon work-stealing pool. Finished
//! time levels are published to a bounded render queue backed by a snapshot
//! pool, so a renderer never allocates.

pub mod config;
pub mod error;
pub mod grid;
pub mod math;
pub mod simulation;
pub mod solver;
pub mod stability;

// Re-export core types
pub use config::{
    JacobiSettings, ParallelSettings, SimulationConfig, SolverKind, StabilityThresholds,
};
pub use error::SimError;
pub use grid::{
    BorderType, BoundaryType, FieldKind, FieldRange, GridSnapshot, ObstacleCell, ObstacleGrid,
    ScalarField,
};
pub use simulation::{
    FieldPool, FluidSimulation, FrameInfo, RenderQueue, SimulationObserver, SimulationState,
    SnapshotPool, StepOutcome,
};
pub use solver::{create_fluid_solver, FluidSolver, JacobiReport};
pub use stability::{CourantReport, CourantStatus, StabilityMonitor};
