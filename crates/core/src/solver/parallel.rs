//! Multi-threaded solver backend
//!
//! Each pass is a range task over the flat cell indices `[0, size)`. A task
//! larger than `subtask_size` cells bisects itself with `rayon::join`, so idle
//! workers steal the halves; leaves run the same kernels as the sequential
//! backend. Results are therefore bit-identical to it.

use super::boundary::{self, BoundaryUpdate};
use super::context::{
    AdvectContext, AdvectTargets, BoundaryContext, ConfinementContext, CurlContext, JacobiContext,
    VelocityTargets,
};
use super::kernels;
use super::r#trait::FluidSolver;
use crate::config::ParallelSettings;
use crate::error::SimError;
use crate::grid::{GridSnapshot, ObstacleGrid};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::ops::Range;
use tracing::debug;

/// Fork-join implementation of [`FluidSolver`]
pub struct ParallelFluidSolver {
    subtask_size: usize,
    /// Dedicated pool, or `None` to run on rayon's global pool
    pool: Option<ThreadPool>,
}

impl ParallelFluidSolver {
    /// Create the parallel backend
    ///
    /// `threads == 0` uses rayon's global pool; otherwise a dedicated pool
    /// with that many workers is built.
    pub fn new(settings: &ParallelSettings) -> Result<Self, SimError> {
        let pool = if settings.threads == 0 {
            None
        } else {
            let pool = ThreadPoolBuilder::new()
                .num_threads(settings.threads)
                .thread_name(|i| format!("fluid-worker-{i}"))
                .build()
                .map_err(|e| SimError::ThreadPool(e.to_string()))?;
            Some(pool)
        };
        let solver = Self {
            subtask_size: settings.subtask_size.max(1),
            pool,
        };
        debug!(
            "Parallel solver: {} threads, subtask size {}",
            solver.threads(),
            solver.subtask_size
        );
        Ok(solver)
    }

    /// Cells below which a task stops splitting
    pub fn subtask_size(&self) -> usize {
        self.subtask_size
    }

    /// Worker count of the pool the passes run on
    pub fn threads(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, ThreadPool::current_num_threads)
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

fn advect_split(ctx: &AdvectContext<'_>, targets: AdvectTargets<'_>, threshold: usize) {
    if targets.len() <= threshold {
        kernels::advect_range(ctx, targets);
        return;
    }
    let mid = targets.len() / 2;
    let (left, right) = targets.split_at(mid);
    rayon::join(
        || advect_split(ctx, left, threshold),
        || advect_split(ctx, right, threshold),
    );
}

fn jacobi_split(ctx: &JacobiContext<'_>, start: usize, out: &mut [f64], threshold: usize) -> f64 {
    if out.len() <= threshold {
        return kernels::jacobi_range(ctx, start, out);
    }
    let mid = out.len() / 2;
    let (left, right) = out.split_at_mut(mid);
    let (left_min, right_min) = rayon::join(
        || jacobi_split(ctx, start, left, threshold),
        || jacobi_split(ctx, start + mid, right, threshold),
    );
    right_min.min(left_min)
}

fn curl_split(ctx: &CurlContext<'_>, start: usize, out: &mut [f64], threshold: usize) {
    if out.len() <= threshold {
        kernels::curl_range(ctx, start, out);
        return;
    }
    let mid = out.len() / 2;
    let (left, right) = out.split_at_mut(mid);
    rayon::join(
        || curl_split(ctx, start, left, threshold),
        || curl_split(ctx, start + mid, right, threshold),
    );
}

fn confinement_split(ctx: &ConfinementContext<'_>, targets: VelocityTargets<'_>, threshold: usize) {
    if targets.len() <= threshold {
        kernels::confinement_range(ctx, targets);
        return;
    }
    let mid = targets.len() / 2;
    let (left, right) = targets.split_at(mid);
    rayon::join(
        || confinement_split(ctx, left, threshold),
        || confinement_split(ctx, right, threshold),
    );
}

fn boundary_split(
    ctx: &BoundaryContext<'_>,
    range: Range<usize>,
    threshold: usize,
) -> Vec<BoundaryUpdate> {
    if range.len() <= threshold {
        let mut updates = Vec::new();
        boundary::collect_range(ctx, range, &mut updates);
        return updates;
    }
    let mid = range.start + range.len() / 2;
    let (mut left, right) = rayon::join(
        || boundary_split(ctx, range.start..mid, threshold),
        || boundary_split(ctx, mid..range.end, threshold),
    );
    left.extend(right);
    left
}

impl FluidSolver for ParallelFluidSolver {
    fn advect(&self, ctx: &AdvectContext<'_>, targets: AdvectTargets<'_>) {
        self.install(|| advect_split(ctx, targets, self.subtask_size));
    }

    fn jacobi_sweep(&self, ctx: &JacobiContext<'_>, out: &mut [f64]) -> f64 {
        self.install(|| jacobi_split(ctx, 0, out, self.subtask_size))
    }

    fn compute_curl(&self, ctx: &CurlContext<'_>, out: &mut [f64]) {
        self.install(|| curl_split(ctx, 0, out, self.subtask_size));
    }

    fn apply_confinement(&self, ctx: &ConfinementContext<'_>, targets: VelocityTargets<'_>) {
        self.install(|| confinement_split(ctx, targets, self.subtask_size));
    }

    fn apply_boundary_conditions(&self, snapshot: &mut GridSnapshot, obstacles: &ObstacleGrid) {
        // Gather first: resolving reads free cells of the same snapshot
        let updates = {
            let ctx = BoundaryContext {
                snapshot: &*snapshot,
                obstacles,
            };
            let size = snapshot.size();
            self.install(|| boundary_split(&ctx, 0..size, self.subtask_size))
        };
        for update in &updates {
            update.apply(snapshot);
        }
    }

    fn name(&self) -> &'static str {
        "parallel"
    }

    fn is_parallel(&self) -> bool {
        true
    }
}
