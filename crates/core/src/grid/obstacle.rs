//! Obstacle grid: per-cell boundary markers
//!
//! Each cell is either free (`None`) or carries an [`ObstacleCell`] telling the
//! solver which boundary condition to enforce there and in which direction the
//! fluid side lies (`average_normal_angle`, radians, NaN when undefined).

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

/// Boundary condition enforced at an obstructed cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryType {
    /// Velocity and pressure forced to zero
    Zero,
    /// Free-slip wall: the normal velocity component is reflected
    Slip,
    /// No-slip wall: the whole velocity is reflected
    Stick,
    /// Velocity source; also seeds the inflow ray in wind-tunnel mode
    Inflow,
    /// Open outlet copying its neighbor
    Outflow,
}

/// One obstructed cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObstacleCell {
    /// Boundary condition for this cell
    pub kind: BoundaryType,
    /// Direction towards the fluid (radians), NaN if none
    pub average_normal_angle: f64,
}

impl ObstacleCell {
    /// Cell with an explicit normal
    pub fn new(kind: BoundaryType, average_normal_angle: f64) -> Self {
        Self {
            kind,
            average_normal_angle,
        }
    }

    /// Cell whose normal is filled in later by [`ObstacleGrid::compute_normals`]
    pub fn unoriented(kind: BoundaryType) -> Self {
        Self::new(kind, f64::NAN)
    }

    /// Boundary condition for this cell
    pub fn obstacle_type(&self) -> BoundaryType {
        self.kind
    }

    /// Direction towards the fluid (radians), NaN if none
    pub fn average_normal_angle(&self) -> f64 {
        self.average_normal_angle
    }
}

/// Layout of the border drawn around the domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderType {
    /// Inflow on the left, outflow on the right, slip walls top and bottom
    #[default]
    WindTunnel,
    /// No-slip walls all around
    Box,
    /// Outflow all around
    Open,
}

/// Per-cell obstacle markers for a `width`×`height` grid
#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleGrid {
    cells: Vec<Option<ObstacleCell>>,
    width: usize,
    height: usize,
}

impl ObstacleGrid {
    /// Grid with every cell free
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            cells: vec![None; width * height],
            width,
            height,
        }
    }

    /// Border for `border_type` plus the fixed rectangular obstacle, with normals
    ///
    /// This is the layout a simulation is reset to. The border keeps its
    /// axis-aligned normals; only the obstacle's are derived from neighbors.
    #[must_use]
    pub fn with_default_layout(width: usize, height: usize, border_type: BorderType) -> Self {
        let mut grid = Self::new(width, height);
        grid.draw_default_obstacle();
        grid.compute_normals();
        grid.draw_border(border_type);
        grid
    }

    /// Grid width in cells
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in cells
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// `(width, height)`
    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Number of cells
    #[inline]
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    /// Obstacle at a flat index, `None` for free cells
    #[inline(always)]
    pub fn cell_at(&self, index: usize) -> Option<&ObstacleCell> {
        self.cells[index].as_ref()
    }

    /// True when the cell at `index` carries an obstacle
    #[inline(always)]
    pub fn is_obstructed(&self, index: usize) -> bool {
        self.cells[index].is_some()
    }

    /// True when signed `(x, y)` lies on the grid and is obstructed.
    /// Off-grid coordinates return `None`.
    #[inline]
    pub fn obstructed_at(&self, x: isize, y: isize) -> Option<bool> {
        self.checked_index(x, y).map(|idx| self.is_obstructed(idx))
    }

    /// Flat index of signed `(x, y)` if it lies on the grid
    #[inline(always)]
    pub fn checked_index(&self, x: isize, y: isize) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        (x < self.width && y < self.height).then_some(x + y * self.width)
    }

    /// Place (or clear, with `None`) the obstacle at `(x, y)`
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    pub fn set(&mut self, x: usize, y: usize, cell: Option<ObstacleCell>) {
        assert!(
            x < self.width && y < self.height,
            "Coordinates out of bounds"
        );
        self.cells[x + y * self.width] = cell;
    }

    /// Remove every obstacle
    pub fn clear(&mut self) {
        self.cells.fill(None);
    }

    /// Iterate `(index, cell)` over obstructed cells
    pub fn obstacles(&self) -> impl Iterator<Item = (usize, &ObstacleCell)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(idx, cell)| cell.as_ref().map(|c| (idx, c)))
    }

    /// Number of obstructed cells
    pub fn obstructed_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Redraw the one-cell border for `border_type`
    ///
    /// Border normals point into the domain. Corners become `Zero` cells.
    /// Interior cells are left untouched.
    pub fn draw_border(&mut self, border_type: BorderType) {
        let (w, h) = (self.width, self.height);
        if w == 0 || h == 0 {
            return;
        }
        let (left, right, top, bottom) = match border_type {
            BorderType::WindTunnel => (
                BoundaryType::Inflow,
                BoundaryType::Outflow,
                BoundaryType::Slip,
                BoundaryType::Slip,
            ),
            BorderType::Box => (
                BoundaryType::Stick,
                BoundaryType::Stick,
                BoundaryType::Stick,
                BoundaryType::Stick,
            ),
            BorderType::Open => (
                BoundaryType::Outflow,
                BoundaryType::Outflow,
                BoundaryType::Outflow,
                BoundaryType::Outflow,
            ),
        };

        for x in 0..w {
            self.set(x, 0, Some(ObstacleCell::new(top, FRAC_PI_2)));
            self.set(x, h - 1, Some(ObstacleCell::new(bottom, -FRAC_PI_2)));
        }
        for y in 1..h.saturating_sub(1) {
            self.set(0, y, Some(ObstacleCell::new(left, 0.0)));
            self.set(w - 1, y, Some(ObstacleCell::new(right, PI)));
        }
        for (x, y) in [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)] {
            self.set(x, y, Some(ObstacleCell::new(BoundaryType::Zero, f64::NAN)));
        }
    }

    /// Fill the rectangle `[x0, x1) × [y0, y1)` (clipped to the grid) with `kind`
    ///
    /// The new cells get NaN normals; call [`Self::compute_normals`] afterwards.
    pub fn draw_rectangle(
        &mut self,
        x0: usize,
        y0: usize,
        x1: usize,
        y1: usize,
        kind: BoundaryType,
    ) {
        for y in y0..y1.min(self.height) {
            for x in x0..x1.min(self.width) {
                self.set(x, y, Some(ObstacleCell::unoriented(kind)));
            }
        }
    }

    /// The fixed square obstacle placed a quarter of the way into the domain
    pub fn draw_default_obstacle(&mut self) {
        let side = (self.height / 8).max(1);
        let cx = self.width / 4;
        let cy = self.height / 2;
        let x0 = cx.saturating_sub(side / 2).max(1);
        let y0 = cy.saturating_sub(side / 2).max(1);
        self.draw_rectangle(x0, y0, x0 + side, y0 + side, BoundaryType::Stick);
    }

    /// Recompute every obstacle's normal from its free 8-neighbors
    ///
    /// The normal is the direction of the summed offsets towards free
    /// neighbors. Cells with no free neighbor, or whose offsets cancel out,
    /// get a NaN normal.
    pub fn compute_normals(&mut self) {
        let mut angles = vec![f64::NAN; self.cells.len()];
        for (idx, _) in self.obstacles() {
            let x = (idx % self.width) as isize;
            let y = (idx / self.width) as isize;
            let (mut sx, mut sy) = (0_isize, 0_isize);
            for dy in -1..=1_isize {
                for dx in -1..=1_isize {
                    if (dx, dy) == (0, 0) {
                        continue;
                    }
                    if self.obstructed_at(x + dx, y + dy) == Some(false) {
                        sx += dx;
                        sy += dy;
                    }
                }
            }
            if sx != 0 || sy != 0 {
                angles[idx] = (sy as f64).atan2(sx as f64);
            }
        }
        for (cell, angle) in self.cells.iter_mut().zip(angles) {
            if let Some(cell) = cell {
                cell.average_normal_angle = angle;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_new_grid_is_free() {
        let grid = ObstacleGrid::new(5, 4);
        assert_eq!(grid.size(), 20);
        assert_eq!(grid.obstructed_count(), 0);
        assert!(grid.cell_at(7).is_none());
    }

    #[test]
    fn test_wind_tunnel_border() {
        let mut grid = ObstacleGrid::new(8, 6);
        grid.draw_border(BorderType::WindTunnel);

        let left = grid.cell_at(grid.checked_index(0, 3).unwrap()).unwrap();
        assert_eq!(left.kind, BoundaryType::Inflow);
        assert_eq!(left.average_normal_angle, 0.0);

        let right = grid.cell_at(grid.checked_index(7, 3).unwrap()).unwrap();
        assert_eq!(right.kind, BoundaryType::Outflow);

        let top = grid.cell_at(grid.checked_index(4, 0).unwrap()).unwrap();
        assert_eq!(top.kind, BoundaryType::Slip);

        let corner = grid.cell_at(0).unwrap();
        assert_eq!(corner.kind, BoundaryType::Zero);
        assert!(corner.average_normal_angle.is_nan());

        // Perimeter only
        assert_eq!(grid.obstructed_count(), 2 * 8 + 2 * 4);
    }

    #[test]
    fn test_box_and_open_borders() {
        let mut grid = ObstacleGrid::new(5, 5);
        grid.draw_border(BorderType::Box);
        assert!(grid
            .obstacles()
            .all(|(_, c)| matches!(c.kind, BoundaryType::Stick | BoundaryType::Zero)));

        grid.draw_border(BorderType::Open);
        assert!(grid
            .obstacles()
            .all(|(_, c)| matches!(c.kind, BoundaryType::Outflow | BoundaryType::Zero)));
    }

    #[test]
    fn test_compute_normals_points_to_fluid() {
        let mut grid = ObstacleGrid::new(10, 10);
        grid.draw_border(BorderType::Box);
        grid.compute_normals();

        let left = grid.cell_at(grid.checked_index(0, 5).unwrap()).unwrap();
        assert_relative_eq!(left.average_normal_angle, 0.0);

        let bottom = grid.cell_at(grid.checked_index(5, 9).unwrap()).unwrap();
        assert_relative_eq!(bottom.average_normal_angle, -FRAC_PI_2);

        // Corner only sees its diagonal neighbor
        let corner = grid.cell_at(0).unwrap();
        assert_relative_eq!(corner.average_normal_angle, std::f64::consts::FRAC_PI_4);
    }

    #[test]
    fn test_enclosed_cell_has_nan_normal() {
        let mut grid = ObstacleGrid::new(7, 7);
        grid.draw_rectangle(1, 1, 6, 6, BoundaryType::Stick);
        grid.compute_normals();
        let centre = grid.cell_at(grid.checked_index(3, 3).unwrap()).unwrap();
        assert!(centre.average_normal_angle.is_nan());
        let edge = grid.cell_at(grid.checked_index(1, 3).unwrap()).unwrap();
        assert_relative_eq!(edge.average_normal_angle, PI);
    }

    #[test]
    fn test_default_layout_has_interior_obstacle() {
        let grid = ObstacleGrid::with_default_layout(40, 24, BorderType::WindTunnel);
        let border = 2 * 40 + 2 * 22;
        assert!(grid.obstructed_count() > border);
        let idx = grid.checked_index(10, 12).unwrap();
        assert_eq!(grid.cell_at(idx).map(|c| c.kind), Some(BoundaryType::Stick));
    }

    #[test]
    fn test_checked_index() {
        let grid = ObstacleGrid::new(4, 3);
        assert_eq!(grid.checked_index(-1, 0), None);
        assert_eq!(grid.checked_index(4, 0), None);
        assert_eq!(grid.checked_index(3, 2), Some(11));
    }
}
