//! Single-threaded solver backend
//!
//! Runs every kernel once over the whole grid on the calling thread. This is
//! the reference the parallel backend is checked against.

use super::boundary;
use super::context::{
    AdvectContext, AdvectTargets, ConfinementContext, CurlContext, JacobiContext, VelocityTargets,
};
use super::kernels;
use super::r#trait::FluidSolver;
use crate::grid::{GridSnapshot, ObstacleGrid};

/// Sequential implementation of [`FluidSolver`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialFluidSolver;

impl SequentialFluidSolver {
    /// Create the sequential backend
    pub fn new() -> Self {
        Self
    }
}

impl FluidSolver for SequentialFluidSolver {
    fn advect(&self, ctx: &AdvectContext<'_>, targets: AdvectTargets<'_>) {
        kernels::advect_range(ctx, targets);
    }

    fn jacobi_sweep(&self, ctx: &JacobiContext<'_>, out: &mut [f64]) -> f64 {
        kernels::jacobi_range(ctx, 0, out)
    }

    fn compute_curl(&self, ctx: &CurlContext<'_>, out: &mut [f64]) {
        kernels::curl_range(ctx, 0, out);
    }

    fn apply_confinement(&self, ctx: &ConfinementContext<'_>, targets: VelocityTargets<'_>) {
        kernels::confinement_range(ctx, targets);
    }

    fn apply_boundary_conditions(&self, snapshot: &mut GridSnapshot, obstacles: &ObstacleGrid) {
        boundary::apply_all(snapshot, obstacles);
    }

    fn name(&self) -> &'static str {
        "sequential"
    }

    fn is_parallel(&self) -> bool {
        false
    }
}
