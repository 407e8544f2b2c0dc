//! Fluid solver module
//!
//! The step pipeline is a fixed sequence of stages (see [`stages`]). The
//! grid-wide passes inside them go through the `FluidSolver` trait, which has
//! a sequential and a rayon fork-join implementation sharing the same
//! per-cell kernels.
//!
//! # Backend Selection
//!
//! [`create_fluid_solver`] builds the backend named by [`SolverKind`]:
//! 1. `Sequential`: everything runs on the stepping thread
//! 2. `Parallel`: ranges bisect down to `subtask_size` cells on a
//!    work-stealing pool
//!
//! # Example
//!
//! ```rust,ignore
//! use fluid_sim_core::config::{ParallelSettings, SolverKind};
//! use fluid_sim_core::solver::create_fluid_solver;
//!
//! let solver = create_fluid_solver(SolverKind::Parallel, &ParallelSettings::default())?;
//! ```

mod boundary;
mod context;
pub mod jacobi;
mod kernels;
mod parallel;
pub mod profiler;
mod sequential;
pub mod stages;
mod r#trait;

// Re-exports
pub use boundary::BoundaryUpdate;
pub use context::{
    AdvectContext, AdvectTargets, BoundaryContext, ConfinementContext, CurlContext, JacobiContext,
    VelocityTargets,
};
pub use jacobi::{JacobiReport, JacobiSystem};
pub use parallel::ParallelFluidSolver;
pub use profiler::{FrameTimer, ProfilerScope};
pub use r#trait::FluidSolver;
pub use sequential::SequentialFluidSolver;
pub use stages::StageContext;

use crate::config::{ParallelSettings, SolverKind};
use crate::error::SimError;
use tracing::info;

/// Create the solver backend for `kind`
///
/// # Returns
///
/// A boxed `FluidSolver`, or [`SimError::ThreadPool`] if a dedicated pool was
/// requested and could not be built
pub fn create_fluid_solver(
    kind: SolverKind,
    parallel: &ParallelSettings,
) -> Result<Box<dyn FluidSolver>, SimError> {
    match kind {
        SolverKind::Sequential => {
            info!("Using sequential solver backend");
            Ok(Box::new(SequentialFluidSolver::new()))
        }
        SolverKind::Parallel => {
            let solver = ParallelFluidSolver::new(parallel)?;
            info!(
                "Using parallel solver backend ({} threads, subtask size {})",
                solver.threads(),
                solver.subtask_size()
            );
            Ok(Box::new(solver))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_matches_kind() {
        let settings = ParallelSettings::default();
        let sequential = create_fluid_solver(SolverKind::Sequential, &settings).unwrap();
        assert!(!sequential.is_parallel());
        assert_eq!(sequential.name(), "sequential");

        let parallel = create_fluid_solver(SolverKind::Parallel, &settings).unwrap();
        assert!(parallel.is_parallel());
        assert_eq!(parallel.name(), "parallel");
    }
}
