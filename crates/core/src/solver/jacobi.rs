//! Jacobi iteration driver
//!
//! Solves `(4 + alpha) x - Σneighbors = alpha * rhs` style systems in place on
//! one snapshot field. Each sweep enforces the boundary conditions first, runs
//! the backend's sweep into a pooled scratch buffer, and copies the buffer
//! back. Iteration stops once the smallest relative change seen in a sweep
//! drops below the tolerance, or after `max_iterations` sweeps.

use super::context::JacobiContext;
use super::r#trait::FluidSolver;
use crate::config::JacobiSettings;
use crate::error::SimError;
use crate::grid::{FieldKind, GridSnapshot, ObstacleGrid, ScalarField};
use crate::simulation::FieldPool;
use tracing::trace;

/// One linear system to relax
pub struct JacobiSystem<'a> {
    /// Snapshot field holding the unknowns (updated in place)
    pub target: FieldKind,
    /// Right-hand side, same size as the snapshot
    pub rhs: &'a ScalarField,
    pub alpha: f64,
    pub r_beta: f64,
}

/// Outcome of one solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JacobiReport {
    /// Sweeps performed
    pub sweeps: usize,
    /// Stopping metric of the last sweep (`f64::INFINITY` if nothing changed)
    pub metric: f64,
    /// True when the metric fell below the tolerance
    pub converged: bool,
}

/// Relax `system` on `snapshot`
///
/// The scratch buffer is borrowed from `scratch` and returned before this
/// function returns, also on error.
pub fn solve(
    solver: &dyn FluidSolver,
    snapshot: &mut GridSnapshot,
    obstacles: &ObstacleGrid,
    system: &JacobiSystem<'_>,
    scratch: &FieldPool,
    settings: &JacobiSettings,
) -> Result<JacobiReport, SimError> {
    let dims = snapshot.dimensions();
    let rhs_dims = (system.rhs.width(), system.rhs.height());
    if rhs_dims != dims {
        return Err(SimError::size_mismatch("jacobi rhs", dims, rhs_dims));
    }
    if scratch.dimensions() != dims {
        return Err(SimError::size_mismatch(
            "jacobi scratch pool",
            dims,
            scratch.dimensions(),
        ));
    }

    let mut buffer = scratch.acquire();
    let mut report = JacobiReport {
        sweeps: 0,
        metric: f64::INFINITY,
        converged: false,
    };

    for sweep in 1..=settings.max_iterations {
        solver.apply_boundary_conditions(snapshot, obstacles);

        let ctx = JacobiContext {
            field: snapshot.field(system.target).as_slice(),
            rhs: system.rhs.as_slice(),
            width: dims.0,
            height: dims.1,
            alpha: system.alpha,
            r_beta: system.r_beta,
        };
        let metric = solver.jacobi_sweep(&ctx, buffer.as_mut_slice());
        snapshot.field_mut(system.target).copy_from(&buffer);

        report.sweeps = sweep;
        report.metric = metric;
        if metric < settings.tolerance {
            report.converged = true;
            break;
        }
    }

    scratch.give_back(buffer)?;
    trace!(
        "Jacobi {:?}: {} sweeps, metric {:e}, converged {}",
        system.target,
        report.sweeps,
        report.metric,
        report.converged
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SequentialFluidSolver;

    fn settings(max_iterations: usize, tolerance: f64) -> JacobiSettings {
        JacobiSettings {
            max_iterations,
            tolerance,
        }
    }

    #[test]
    fn test_stops_on_smallest_change_not_largest() {
        // One cell barely moves while another moves a lot. The stopping rule
        // looks at the smallest change, so one sweep is enough.
        let mut snapshot = GridSnapshot::new(5, 5);
        snapshot.pressure.fill(1.0);
        let mut rhs = ScalarField::new(5, 5);
        rhs.set(1, 1, 1e-6);
        rhs.set(3, 3, 50.0);

        let obstacles = ObstacleGrid::new(5, 5);
        let scratch = FieldPool::new(5, 5, 1);
        let system = JacobiSystem {
            target: FieldKind::Pressure,
            rhs: &rhs,
            alpha: 1.0,
            r_beta: 0.25,
        };
        let report = solve(
            &SequentialFluidSolver::new(),
            &mut snapshot,
            &obstacles,
            &system,
            &scratch,
            &settings(50, 1e-4),
        )
        .unwrap();

        assert_eq!(report.sweeps, 1);
        assert!(report.converged);
        assert!((report.metric - 2.5e-7).abs() < 1e-12);
        assert!(snapshot.pressure.get(3, 3) > 10.0);
        assert_eq!(scratch.outstanding(), 0);
    }

    #[test]
    fn test_zero_tolerance_runs_every_sweep() {
        let mut snapshot = GridSnapshot::new(4, 4);
        snapshot.velocity_x.set(1, 1, 1.0);
        let rhs = snapshot.velocity_x.clone();
        let scratch = FieldPool::new(4, 4, 1);
        let system = JacobiSystem {
            target: FieldKind::VelocityX,
            rhs: &rhs,
            alpha: 2.0,
            r_beta: 1.0 / 6.0,
        };
        let report = solve(
            &SequentialFluidSolver::new(),
            &mut snapshot,
            &ObstacleGrid::new(4, 4),
            &system,
            &scratch,
            &settings(7, 0.0),
        )
        .unwrap();
        assert_eq!(report.sweeps, 7);
        assert!(!report.converged);
    }

    #[test]
    fn test_rhs_size_mismatch_rejected() {
        let mut snapshot = GridSnapshot::new(4, 4);
        let rhs = ScalarField::new(3, 4);
        let scratch = FieldPool::new(4, 4, 0);
        let system = JacobiSystem {
            target: FieldKind::Pressure,
            rhs: &rhs,
            alpha: 1.0,
            r_beta: 0.2,
        };
        let err = solve(
            &SequentialFluidSolver::new(),
            &mut snapshot,
            &ObstacleGrid::new(4, 4),
            &system,
            &scratch,
            &settings(5, 1e-4),
        )
        .unwrap_err();
        assert!(matches!(err, SimError::SizeMismatch { .. }));
        assert_eq!(scratch.total_created(), 0);
    }
}
