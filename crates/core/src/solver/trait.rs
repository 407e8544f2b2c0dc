//! Fluid solver trait definition
//!
//! This module defines the `FluidSolver` trait, the kernel backend the step
//! pipeline drives. The sequential and the rayon-parallel backends implement
//! it with the same per-cell kernels, so they produce identical fields.

use super::context::{
    AdvectContext, AdvectTargets, ConfinementContext, CurlContext, JacobiContext, VelocityTargets,
};
use crate::grid::{GridSnapshot, ObstacleGrid};

/// Backend-agnostic interface for the grid-wide solver passes
///
/// Every method receives its operands through a per-call context; a backend
/// holds no simulation state of its own.
pub trait FluidSolver: Send + Sync {
    /// Semi-Lagrangian advection of velocity, temperature and area density
    ///
    /// Writes every cell covered by `targets`, sampling from `ctx.source`.
    fn advect(&self, ctx: &AdvectContext<'_>, targets: AdvectTargets<'_>);

    /// One Jacobi sweep writing the next iterate into `out`
    ///
    /// # Returns
    ///
    /// The minimum relative change over cells whose value changed
    /// (`f64::INFINITY` when nothing changed)
    fn jacobi_sweep(&self, ctx: &JacobiContext<'_>, out: &mut [f64]) -> f64;

    /// Scalar curl of the velocity into `out` (zero on obstructed cells)
    fn compute_curl(&self, ctx: &CurlContext<'_>, out: &mut [f64]);

    /// Add the vorticity-confinement force derived from `ctx.curl`
    fn apply_confinement(&self, ctx: &ConfinementContext<'_>, targets: VelocityTargets<'_>);

    /// Enforce the boundary condition of every obstructed cell
    fn apply_boundary_conditions(&self, snapshot: &mut GridSnapshot, obstacles: &ObstacleGrid);

    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Check if this backend runs on a thread pool
    ///
    /// # Returns
    ///
    /// `true` if multi-threaded, `false` if sequential
    fn is_parallel(&self) -> bool;
}
