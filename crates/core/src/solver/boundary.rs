//! Boundary-condition enforcement at obstructed cells
//!
//! Every obstructed cell is first zeroed (velocity and pressure). Unless it is
//! a `Zero` cell, the neighbor one step along its snapped normal is then read
//! and the cell takes a value derived from it:
//!
//! | Type      | Velocity                         | Pressure | Density |
//! |-----------|----------------------------------|----------|---------|
//! | `Inflow`  | `(nvx·|cos θ|, nvy·|sin θ|)`     | `-np`    | kept    |
//! | `Outflow` | `(nvx·|cos θ|, nvy·|sin θ|)`     | `np`     | `nd`    |
//! | `Slip`    | normal component reflected       | 0        | kept    |
//! | `Stick`   | `-nv`                            | 0        | kept    |
//!
//! A neighbor that is off-grid or itself obstructed, or a NaN normal, leaves
//! the cell zeroed. Only obstructed cells are written and only free cells are
//! read, so cells can be resolved in any order or concurrently.

use super::context::BoundaryContext;
use crate::grid::{BoundaryType, GridSnapshot, ObstacleCell, ObstacleGrid};
use crate::math::{grid_direction, vector_magnitude};
use nalgebra::{Rotation2, Vector2};
use std::ops::Range;

/// Resolved values for one obstructed cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryUpdate {
    pub index: usize,
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub pressure: f64,
    /// Set only by `Outflow` cells
    pub area_density: Option<f64>,
}

impl BoundaryUpdate {
    fn zeroed(index: usize) -> Self {
        Self {
            index,
            velocity_x: 0.0,
            velocity_y: 0.0,
            pressure: 0.0,
            area_density: None,
        }
    }

    /// Write the resolved values into `snapshot`
    #[inline]
    pub fn apply(&self, snapshot: &mut GridSnapshot) {
        let i = self.index;
        snapshot.velocity_x.as_mut_slice()[i] = self.velocity_x;
        snapshot.velocity_y.as_mut_slice()[i] = self.velocity_y;
        snapshot.velocity_magnitude.as_mut_slice()[i] =
            vector_magnitude(self.velocity_x, self.velocity_y);
        snapshot.pressure.as_mut_slice()[i] = self.pressure;
        if let Some(density) = self.area_density {
            snapshot.area_density.as_mut_slice()[i] = density;
        }
    }
}

/// Reflect `v` about the wall whose normal points along `angle`
fn reflect_normal_component(angle: f64, v: Vector2<f64>) -> Vector2<f64> {
    let rotation = Rotation2::new(angle);
    let mut local = rotation.inverse() * v;
    local.x = -local.x;
    rotation * local
}

/// Compute the boundary values of obstructed cell `index`
pub fn resolve(ctx: &BoundaryContext<'_>, index: usize, cell: &ObstacleCell) -> BoundaryUpdate {
    let zeroed = BoundaryUpdate::zeroed(index);
    let kind = cell.obstacle_type();
    if kind == BoundaryType::Zero {
        return zeroed;
    }

    let angle = cell.average_normal_angle();
    let Some((dx, dy)) = grid_direction(angle) else {
        return zeroed;
    };
    let width = ctx.obstacles.width();
    let x = (index % width) as isize;
    let y = (index / width) as isize;
    let neighbor = match ctx.obstacles.checked_index(x + dx, y + dy) {
        Some(n) if !ctx.obstacles.is_obstructed(n) => n,
        _ => return zeroed,
    };

    let snapshot = ctx.snapshot;
    let nvx = snapshot.velocity_x.as_slice()[neighbor];
    let nvy = snapshot.velocity_y.as_slice()[neighbor];
    let np = snapshot.pressure.as_slice()[neighbor];

    match kind {
        BoundaryType::Zero => zeroed,
        BoundaryType::Inflow => BoundaryUpdate {
            velocity_x: nvx * angle.cos().abs(),
            velocity_y: nvy * angle.sin().abs(),
            pressure: -np,
            ..zeroed
        },
        BoundaryType::Outflow => BoundaryUpdate {
            velocity_x: nvx * angle.cos().abs(),
            velocity_y: nvy * angle.sin().abs(),
            pressure: np,
            area_density: Some(snapshot.area_density.as_slice()[neighbor]),
            ..zeroed
        },
        BoundaryType::Slip => {
            let v = reflect_normal_component(angle, Vector2::new(nvx, nvy));
            BoundaryUpdate {
                velocity_x: v.x,
                velocity_y: v.y,
                ..zeroed
            }
        }
        BoundaryType::Stick => BoundaryUpdate {
            velocity_x: -nvx,
            velocity_y: -nvy,
            ..zeroed
        },
    }
}

/// Resolve every obstructed cell in `range` into `out`
pub fn collect_range(
    ctx: &BoundaryContext<'_>,
    range: Range<usize>,
    out: &mut Vec<BoundaryUpdate>,
) {
    for index in range {
        if let Some(cell) = ctx.obstacles.cell_at(index) {
            out.push(resolve(ctx, index, cell));
        }
    }
}

/// Resolve and write every obstructed cell, one at a time
pub fn apply_all(snapshot: &mut GridSnapshot, obstacles: &ObstacleGrid) {
    for (index, cell) in obstacles.obstacles() {
        let ctx = BoundaryContext {
            snapshot: &*snapshot,
            obstacles,
        };
        let update = resolve(&ctx, index, cell);
        update.apply(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::BorderType;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    /// 5x5 grid with one obstacle at (2, 2) and a known neighbor state
    fn setup(cell: ObstacleCell, neighbor: (usize, usize)) -> (GridSnapshot, ObstacleGrid) {
        let mut obstacles = ObstacleGrid::new(5, 5);
        obstacles.set(2, 2, Some(cell));
        let mut snapshot = GridSnapshot::new(5, 5);
        snapshot.velocity_x.fill(9.0);
        snapshot.velocity_y.fill(9.0);
        snapshot.pressure.fill(9.0);
        let (nx, ny) = neighbor;
        snapshot.velocity_x.set(nx, ny, 2.0);
        snapshot.velocity_y.set(nx, ny, -3.0);
        snapshot.pressure.set(nx, ny, 1.5);
        snapshot.area_density.set(nx, ny, 0.75);
        (snapshot, obstacles)
    }

    fn cell_state(snapshot: &GridSnapshot) -> (f64, f64, f64) {
        (
            snapshot.velocity_x.get(2, 2),
            snapshot.velocity_y.get(2, 2),
            snapshot.pressure.get(2, 2),
        )
    }

    #[test]
    fn test_stick_reverses_neighbor_velocity() {
        let (mut snapshot, obstacles) =
            setup(ObstacleCell::new(BoundaryType::Stick, 0.0), (3, 2));
        apply_all(&mut snapshot, &obstacles);
        assert_eq!(cell_state(&snapshot), (-2.0, 3.0, 0.0));
    }

    #[test]
    fn test_zero_cell_is_zeroed() {
        let (mut snapshot, obstacles) = setup(ObstacleCell::new(BoundaryType::Zero, 0.0), (3, 2));
        apply_all(&mut snapshot, &obstacles);
        assert_eq!(cell_state(&snapshot), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_slip_reflects_only_normal_component() {
        // Normal along +x: vx flips, vy kept
        let (mut snapshot, obstacles) =
            setup(ObstacleCell::new(BoundaryType::Slip, 0.0), (3, 2));
        apply_all(&mut snapshot, &obstacles);
        let (vx, vy, p) = cell_state(&snapshot);
        assert_relative_eq!(vx, -2.0, epsilon = 1e-12);
        assert_relative_eq!(vy, -3.0, epsilon = 1e-12);
        assert_eq!(p, 0.0);

        // Normal along +y: vy flips, vx kept
        let (mut snapshot, obstacles) =
            setup(ObstacleCell::new(BoundaryType::Slip, FRAC_PI_2), (2, 3));
        apply_all(&mut snapshot, &obstacles);
        let (vx, vy, _) = cell_state(&snapshot);
        assert_relative_eq!(vx, 2.0, epsilon = 1e-12);
        assert_relative_eq!(vy, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inflow_projects_velocity_and_negates_pressure() {
        let (mut snapshot, obstacles) = setup(ObstacleCell::new(BoundaryType::Inflow, PI), (1, 2));
        apply_all(&mut snapshot, &obstacles);
        let (vx, vy, p) = cell_state(&snapshot);
        assert_relative_eq!(vx, 2.0, epsilon = 1e-12);
        assert_relative_eq!(vy, 0.0, epsilon = 1e-12);
        assert_eq!(p, -1.5);
        assert_eq!(snapshot.area_density.get(2, 2), 0.0);
    }

    #[test]
    fn test_outflow_copies_pressure_and_density() {
        let (mut snapshot, obstacles) =
            setup(ObstacleCell::new(BoundaryType::Outflow, -FRAC_PI_2), (2, 1));
        apply_all(&mut snapshot, &obstacles);
        let (vx, vy, p) = cell_state(&snapshot);
        assert_relative_eq!(vx, 0.0, epsilon = 1e-12);
        assert_relative_eq!(vy, -3.0, epsilon = 1e-12);
        assert_eq!(p, 1.5);
        assert_eq!(snapshot.area_density.get(2, 2), 0.75);
    }

    #[test]
    fn test_nan_normal_leaves_cell_zeroed() {
        let (mut snapshot, obstacles) =
            setup(ObstacleCell::unoriented(BoundaryType::Stick), (3, 2));
        apply_all(&mut snapshot, &obstacles);
        assert_eq!(cell_state(&snapshot), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_obstructed_or_offgrid_neighbor_leaves_cell_zeroed() {
        let (mut snapshot, mut obstacles) =
            setup(ObstacleCell::new(BoundaryType::Stick, 0.0), (3, 2));
        obstacles.set(3, 2, Some(ObstacleCell::new(BoundaryType::Zero, f64::NAN)));
        apply_all(&mut snapshot, &obstacles);
        assert_eq!(cell_state(&snapshot), (0.0, 0.0, 0.0));

        let mut obstacles = ObstacleGrid::new(5, 5);
        obstacles.set(0, 0, Some(ObstacleCell::new(BoundaryType::Stick, PI)));
        let mut snapshot = GridSnapshot::new(5, 5);
        snapshot.velocity_x.fill(4.0);
        apply_all(&mut snapshot, &obstacles);
        assert_eq!(snapshot.velocity_x.get(0, 0), 0.0);
    }

    #[test]
    fn test_collect_matches_in_place_application() {
        let obstacles = ObstacleGrid::with_default_layout(16, 12, BorderType::WindTunnel);
        let mut snapshot = GridSnapshot::new(16, 12);
        for (i, v) in snapshot.velocity_x.as_mut_slice().iter_mut().enumerate() {
            *v = (i as f64 * 0.37).sin();
        }
        snapshot.velocity_y.fill(0.5);

        let mut updates = Vec::new();
        collect_range(
            &BoundaryContext {
                snapshot: &snapshot,
                obstacles: &obstacles,
            },
            0..snapshot.size(),
            &mut updates,
        );
        let mut gathered = snapshot.clone();
        for update in &updates {
            update.apply(&mut gathered);
        }

        apply_all(&mut snapshot, &obstacles);
        assert_eq!(updates.len(), obstacles.obstructed_count());
        assert_eq!(gathered, snapshot);
    }
}
