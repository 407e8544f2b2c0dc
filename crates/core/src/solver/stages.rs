//! The individual stages of one simulation step
//!
//! Stages operate on a single snapshot (advection also reads the previous
//! one). The grid-wide passes are delegated to a [`FluidSolver`] backend; the
//! cheap bookkeeping passes run inline.

use super::context::{
    AdvectContext, AdvectTargets, ConfinementContext, CurlContext, VelocityTargets,
};
use super::jacobi::{self, JacobiReport, JacobiSystem};
use super::r#trait::FluidSolver;
use crate::config::JacobiSettings;
use crate::error::SimError;
use crate::grid::{BoundaryType, FieldKind, GridSnapshot, ObstacleGrid, ScalarField};
use crate::math::{grid_direction, vector_magnitude};
use crate::simulation::FieldPool;

/// Cells past an inflow cell that receive the inflow velocity
pub const INFLOW_RAY_LENGTH: isize = 5;

/// Rows per area-density stripe
pub const STRIPE_HEIGHT: usize = 10;

/// Shared operands of the stages that relax a linear system
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub solver: &'a dyn FluidSolver,
    pub obstacles: &'a ObstacleGrid,
    /// Pool for the Jacobi right-hand side and iterate buffers
    pub scratch: &'a FieldPool,
    pub jacobi: &'a JacobiSettings,
    /// Cell extent along x (m)
    pub cell_x: f64,
    /// Cell extent along y (m)
    pub cell_y: f64,
}

impl StageContext<'_> {
    fn relax(
        &self,
        snapshot: &mut GridSnapshot,
        target: FieldKind,
        rhs_source: FieldKind,
        alpha: f64,
        r_beta: f64,
    ) -> Result<JacobiReport, SimError> {
        let mut rhs = self.scratch.acquire();
        if (rhs.width(), rhs.height()) != snapshot.dimensions() {
            let actual = (rhs.width(), rhs.height());
            self.scratch.give_back(rhs)?;
            return Err(SimError::size_mismatch(
                "scratch field",
                snapshot.dimensions(),
                actual,
            ));
        }
        rhs.copy_from(snapshot.field(rhs_source));
        let system = JacobiSystem {
            target,
            rhs: &rhs,
            alpha,
            r_beta,
        };
        let result = jacobi::solve(
            self.solver,
            snapshot,
            self.obstacles,
            &system,
            self.scratch,
            self.jacobi,
        );
        self.scratch.give_back(rhs)?;
        result
    }
}

/// Area density stamped on row `y` by the inflow: alternating bands of 1 and 0
#[inline]
pub fn stripe_density(y: usize) -> f64 {
    if (y / STRIPE_HEIGHT) % 2 == 0 {
        1.0
    } else {
        0.0
    }
}

/// Stamp the inflow velocity along the normal of every oriented inflow cell
///
/// Targets are the cells 1..=5 steps along the snapped normal; off-grid or
/// obstructed targets are skipped.
pub fn inject_inflow_velocity(snapshot: &mut GridSnapshot, obstacles: &ObstacleGrid, speed: f64) {
    let width = obstacles.width();
    for (index, cell) in obstacles.obstacles() {
        if cell.obstacle_type() != BoundaryType::Inflow {
            continue;
        }
        let angle = cell.average_normal_angle();
        let Some((dx, dy)) = grid_direction(angle) else {
            continue;
        };
        let (vx, vy) = (speed * angle.cos(), speed * angle.sin());
        let x = (index % width) as isize;
        let y = (index / width) as isize;

        for step in 1..=INFLOW_RAY_LENGTH {
            let Some(target) = obstacles.checked_index(x + step * dx, y + step * dy) else {
                continue;
            };
            if obstacles.is_obstructed(target) {
                continue;
            }
            snapshot.velocity_x.as_mut_slice()[target] = vx;
            snapshot.velocity_y.as_mut_slice()[target] = vy;
            snapshot.velocity_magnitude.as_mut_slice()[target] = vector_magnitude(vx, vy);
            snapshot.area_density.as_mut_slice()[target] = stripe_density(target / width);
        }
    }
}

/// Semi-Lagrangian advection from `source` into `target`
///
/// `target` first receives a full copy of `source`, so pressure, the derived
/// fields and the smoothed ranges carry over; velocity, temperature and area
/// density are then resampled.
pub fn advect(
    solver: &dyn FluidSolver,
    source: &GridSnapshot,
    target: &mut GridSnapshot,
    dt: f64,
    cells_per_meter: (f64, f64),
) -> Result<(), SimError> {
    if source.dimensions() != target.dimensions() {
        return Err(SimError::size_mismatch(
            "advection target",
            source.dimensions(),
            target.dimensions(),
        ));
    }
    target.copy_from(source);
    let ctx = AdvectContext {
        source,
        dt,
        cells_per_meter_x: cells_per_meter.0,
        cells_per_meter_y: cells_per_meter.1,
    };
    solver.advect(&ctx, AdvectTargets::from_snapshot(target));
    Ok(())
}

/// Vorticity confinement with strength `factor`; no-op when `factor == 0`
///
/// The curl is left in `velocity_curl`.
pub fn vorticity_confinement(
    solver: &dyn FluidSolver,
    snapshot: &mut GridSnapshot,
    obstacles: &ObstacleGrid,
    factor: f64,
    cell_size: f64,
) {
    if factor == 0.0 {
        return;
    }
    let (width, height) = snapshot.dimensions();

    let curl_ctx = CurlContext {
        velocity_x: snapshot.velocity_x.as_slice(),
        velocity_y: snapshot.velocity_y.as_slice(),
        obstacles,
        width,
        height,
    };
    solver.compute_curl(&curl_ctx, snapshot.velocity_curl.as_mut_slice());

    let force_ctx = ConfinementContext {
        curl: snapshot.velocity_curl.as_slice(),
        obstacles,
        width,
        height,
        scale: factor * cell_size,
    };
    let targets = VelocityTargets {
        offset: 0,
        velocity_x: snapshot.velocity_x.as_mut_slice(),
        velocity_y: snapshot.velocity_y.as_mut_slice(),
    };
    solver.apply_confinement(&force_ctx, targets);
}

/// Viscous diffusion of both velocity components
///
/// `alpha = cell² / (dt·ν)`, `rBeta = 1 / (4 + alpha)`; the right-hand side is
/// the component before iterating.
pub fn diffuse(
    stage: &StageContext<'_>,
    snapshot: &mut GridSnapshot,
    dt: f64,
    kinematic_viscosity: f64,
) -> Result<[JacobiReport; 2], SimError> {
    let alpha = stage.cell_x * stage.cell_y / (dt * kinematic_viscosity);
    let r_beta = 1.0 / (4.0 + alpha);
    let x = stage.relax(
        snapshot,
        FieldKind::VelocityX,
        FieldKind::VelocityX,
        alpha,
        r_beta,
    )?;
    let y = stage.relax(
        snapshot,
        FieldKind::VelocityY,
        FieldKind::VelocityY,
        alpha,
        r_beta,
    )?;
    Ok([x, y])
}

/// Add a uniform force to every cell
pub fn add_force(snapshot: &mut GridSnapshot, fx: f64, fy: f64) {
    if fx == 0.0 && fy == 0.0 {
        return;
    }
    for v in snapshot.velocity_x.as_mut_slice() {
        *v += fx;
    }
    for v in snapshot.velocity_y.as_mut_slice() {
        *v += fy;
    }
}

/// Central-difference divergence of the velocity into `velocity_divergence`
pub fn divergence(snapshot: &mut GridSnapshot, cell_x: f64, cell_y: f64) {
    let (width, height) = snapshot.dimensions();
    let vx = &snapshot.velocity_x;
    let vy = &snapshot.velocity_y;
    let out = snapshot.velocity_divergence.as_mut_slice();

    for y in 0..height {
        for x in 0..width {
            let (xi, yi) = (x as isize, y as isize);
            let dvx = vx.get_clamped(xi + 1, yi) - vx.get_clamped(xi - 1, yi);
            let dvy = vy.get_clamped(xi, yi + 1) - vy.get_clamped(xi, yi - 1);
            out[x + y * width] = 0.5 * (dvx / cell_x + dvy / cell_y);
        }
    }
}

/// Relax the pressure Poisson equation against `velocity_divergence`
///
/// `alpha = -(cellX·cellY)`, `rBeta = 1/4`.
pub fn pressure_solve(
    stage: &StageContext<'_>,
    snapshot: &mut GridSnapshot,
) -> Result<JacobiReport, SimError> {
    stage.relax(
        snapshot,
        FieldKind::Pressure,
        FieldKind::VelocityDivergence,
        -(stage.cell_x * stage.cell_y),
        0.25,
    )
}

/// Central-difference pressure gradient into `pressure_gradient_x/y`
pub fn pressure_gradient(snapshot: &mut GridSnapshot, cell_x: f64, cell_y: f64) {
    let (width, height) = snapshot.dimensions();
    let p = &snapshot.pressure;
    let gx = snapshot.pressure_gradient_x.as_mut_slice();
    let gy = snapshot.pressure_gradient_y.as_mut_slice();

    for y in 0..height {
        for x in 0..width {
            let (xi, yi) = (x as isize, y as isize);
            let idx = x + y * width;
            gx[idx] = 0.5 * (p.get_clamped(xi + 1, yi) - p.get_clamped(xi - 1, yi)) / cell_x;
            gy[idx] = 0.5 * (p.get_clamped(xi, yi + 1) - p.get_clamped(xi, yi - 1)) / cell_y;
        }
    }
}

/// Subtract the pressure gradient from the velocity of free cells and
/// refresh `velocity_magnitude`
pub fn subtract_pressure_gradient(snapshot: &mut GridSnapshot, obstacles: &ObstacleGrid) {
    let gx = snapshot.pressure_gradient_x.as_slice();
    let gy = snapshot.pressure_gradient_y.as_slice();
    let vx = snapshot.velocity_x.as_mut_slice();
    let vy = snapshot.velocity_y.as_mut_slice();
    let magnitude = snapshot.velocity_magnitude.as_mut_slice();

    for idx in 0..vx.len() {
        if obstacles.is_obstructed(idx) {
            continue;
        }
        vx[idx] -= gx[idx];
        vy[idx] -= gy[idx];
        magnitude[idx] = vector_magnitude(vx[idx], vy[idx]);
    }
}

/// Fold this step's extrema over free cells into every field's range
///
/// Fields are left alone when every cell is obstructed.
pub fn update_min_max(snapshot: &mut GridSnapshot, obstacles: &ObstacleGrid, iteration: u64) {
    for kind in FieldKind::ALL {
        let extrema = free_extrema(snapshot.field(kind), obstacles);
        if let Some((min, max)) = extrema {
            snapshot.range_mut(kind).update(min, max, iteration);
        }
    }
}

fn free_extrema(field: &ScalarField, obstacles: &ObstacleGrid) -> Option<(f64, f64)> {
    field
        .as_slice()
        .iter()
        .enumerate()
        .filter(|&(idx, _)| !obstacles.is_obstructed(idx))
        .fold(None, |acc, (_, &v)| match acc {
            None => Some((v, v)),
            Some((min, max)) => Some((min.min(v), max.max(v))),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ObstacleCell;
    use crate::solver::SequentialFluidSolver;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn l2(field: &ScalarField) -> f64 {
        field.as_slice().iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    #[test]
    fn test_stripe_density_bands() {
        assert_eq!(stripe_density(0), 1.0);
        assert_eq!(stripe_density(9), 1.0);
        assert_eq!(stripe_density(10), 0.0);
        assert_eq!(stripe_density(19), 0.0);
        assert_eq!(stripe_density(20), 1.0);
    }

    #[test]
    fn test_inflow_ray_skips_obstacles_and_edges() {
        let mut obstacles = ObstacleGrid::new(8, 4);
        obstacles.set(0, 1, Some(ObstacleCell::new(BoundaryType::Inflow, 0.0)));
        obstacles.set(3, 1, Some(ObstacleCell::new(BoundaryType::Stick, f64::NAN)));
        // Pointing off-grid: nothing to stamp
        obstacles.set(
            0,
            3,
            Some(ObstacleCell::new(BoundaryType::Inflow, std::f64::consts::PI)),
        );
        let mut snapshot = GridSnapshot::new(8, 4);
        inject_inflow_velocity(&mut snapshot, &obstacles, 2.0);

        for x in [1, 2, 4, 5] {
            assert_relative_eq!(snapshot.velocity_x.get(x, 1), 2.0);
            assert_eq!(snapshot.area_density.get(x, 1), 1.0);
        }
        assert_eq!(snapshot.velocity_x.get(3, 1), 0.0);
        assert_eq!(snapshot.velocity_x.get(6, 1), 0.0);
        assert!(snapshot.velocity_x.as_slice()[24..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_uniform_advection_shifts_by_whole_cells() {
        let (w, h) = (12, 3);
        let mut source = GridSnapshot::new(w, h);
        source.velocity_x.fill(2.0);
        for y in 0..h {
            source.area_density.set(4, y, 1.0);
        }
        source.pressure.fill(0.5);
        let mut target = GridSnapshot::new(w, h);

        // 2 m/s * 0.5 s * 1 cell/m = one cell to the right
        advect(
            &SequentialFluidSolver::new(),
            &source,
            &mut target,
            0.5,
            (1.0, 1.0),
        )
        .unwrap();

        for y in 0..h {
            assert_eq!(target.area_density.get(4, y), 0.0);
            assert_eq!(target.area_density.get(5, y), 1.0);
        }
        assert!(target.velocity_x.as_slice().iter().all(|&v| v == 2.0));
        assert_eq!(target.pressure, source.pressure);
    }

    #[test]
    fn test_vorticity_skipped_when_factor_zero() {
        let mut snapshot = GridSnapshot::new(6, 6);
        snapshot.velocity_x.set(2, 3, 1.0);
        let before = snapshot.clone();
        vorticity_confinement(
            &SequentialFluidSolver::new(),
            &mut snapshot,
            &ObstacleGrid::new(6, 6),
            0.0,
            0.1,
        );
        assert_eq!(snapshot, before);
    }

    #[test]
    fn test_add_force_is_uniform() {
        let mut snapshot = GridSnapshot::new(3, 3);
        add_force(&mut snapshot, 0.5, -1.0);
        assert!(snapshot.velocity_x.as_slice().iter().all(|&v| v == 0.5));
        assert!(snapshot.velocity_y.as_slice().iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_min_max_ignores_obstructed_cells() {
        let mut snapshot = GridSnapshot::new(3, 3);
        snapshot.pressure.set(0, 0, 100.0);
        snapshot.pressure.set(2, 2, -3.0);
        snapshot.pressure.set(1, 1, 4.0);
        let mut obstacles = ObstacleGrid::new(3, 3);
        obstacles.set(0, 0, Some(ObstacleCell::unoriented(BoundaryType::Zero)));

        update_min_max(&mut snapshot, &obstacles, 1);
        assert_eq!(snapshot.range(FieldKind::Pressure).bounds(), (-3.0, 4.0));
    }

    #[test]
    fn test_projection_reduces_divergence() {
        let (w, h) = (32, 32);
        let (cell_x, cell_y) = (0.1, 0.1);
        let mut rng = StdRng::seed_from_u64(7);
        let mut snapshot = GridSnapshot::new(w, h);

        // A few Gaussian sources and sinks, far enough from the edges that
        // the flux through the border is negligible
        for _ in 0..4 {
            let cx = rng.random_range(11.0..21.0);
            let cy = rng.random_range(11.0..21.0);
            let strength = rng.random_range(-1.0..1.0);
            for y in 0..h {
                for x in 0..w {
                    let (dx, dy) = (x as f64 - cx, y as f64 - cy);
                    let g = strength * (-(dx * dx + dy * dy) / 16.0).exp();
                    let idx = x + y * w;
                    snapshot.velocity_x.as_mut_slice()[idx] += dx * g;
                    snapshot.velocity_y.as_mut_slice()[idx] += dy * g;
                }
            }
        }

        divergence(&mut snapshot, cell_x, cell_y);
        let before = l2(&snapshot.velocity_divergence);
        assert!(before > 1.0);

        let obstacles = ObstacleGrid::new(w, h);
        let scratch = FieldPool::new(w, h, 2);
        let settings = JacobiSettings {
            max_iterations: 2000,
            tolerance: 0.0,
        };
        let solver = SequentialFluidSolver::new();
        let stage = StageContext {
            solver: &solver,
            obstacles: &obstacles,
            scratch: &scratch,
            jacobi: &settings,
            cell_x,
            cell_y,
        };
        pressure_solve(&stage, &mut snapshot).unwrap();
        pressure_gradient(&mut snapshot, cell_x, cell_y);
        subtract_pressure_gradient(&mut snapshot, &obstacles);
        divergence(&mut snapshot, cell_x, cell_y);
        let after = l2(&snapshot.velocity_divergence);

        assert!(after < 0.5 * before, "divergence {before} -> {after}");
        assert_eq!(scratch.outstanding(), 0);
    }

    #[test]
    fn test_diffusion_smooths_a_spike() {
        let mut snapshot = GridSnapshot::new(9, 9);
        snapshot.velocity_x.set(4, 4, 1.0);
        let obstacles = ObstacleGrid::new(9, 9);
        let scratch = FieldPool::new(9, 9, 2);
        let settings = JacobiSettings::default();
        let solver = SequentialFluidSolver::new();
        let stage = StageContext {
            solver: &solver,
            obstacles: &obstacles,
            scratch: &scratch,
            jacobi: &settings,
            cell_x: 1.0,
            cell_y: 1.0,
        };
        diffuse(&stage, &mut snapshot, 1.0, 1.0).unwrap();
        let peak = snapshot.velocity_x.get(4, 4);
        assert!(peak < 1.0 && peak > 0.0);
        assert!(snapshot.velocity_x.get(3, 4) > 0.0);
        assert_eq!(snapshot.velocity_y.as_slice().iter().sum::<f64>(), 0.0);
    }
}
