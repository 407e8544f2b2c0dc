//! Per-invocation operand bundles for the solver kernels
//!
//! Every kernel call receives its inputs through one of these structs instead
//! of reaching into shared state. The parallel backend splits the mutable
//! targets along the flat cell index and hands each half to a different task.

use crate::grid::{GridSnapshot, ObstacleGrid};

/// Inputs of one semi-Lagrangian advection pass
#[derive(Clone, Copy)]
pub struct AdvectContext<'a> {
    /// Previous time level (read only)
    pub source: &'a GridSnapshot,
    /// Timestep in seconds
    pub dt: f64,
    /// Cells per meter along x
    pub cells_per_meter_x: f64,
    /// Cells per meter along y
    pub cells_per_meter_y: f64,
}

/// Output slices of an advection pass, starting at flat index `offset`
pub struct AdvectTargets<'a> {
    /// Flat index of the first element of every slice
    pub offset: usize,
    pub velocity_x: &'a mut [f64],
    pub velocity_y: &'a mut [f64],
    pub temperature: &'a mut [f64],
    pub area_density: &'a mut [f64],
}

impl<'a> AdvectTargets<'a> {
    /// Borrow the advected fields of a whole snapshot
    pub fn from_snapshot(target: &'a mut GridSnapshot) -> Self {
        Self {
            offset: 0,
            velocity_x: target.velocity_x.as_mut_slice(),
            velocity_y: target.velocity_y.as_mut_slice(),
            temperature: target.temperature.as_mut_slice(),
            area_density: target.area_density.as_mut_slice(),
        }
    }

    /// Number of cells covered
    pub fn len(&self) -> usize {
        self.velocity_x.len()
    }

    /// True when no cell is covered
    pub fn is_empty(&self) -> bool {
        self.velocity_x.is_empty()
    }

    /// Split into `[0, mid)` and `[mid, len)`
    pub fn split_at(self, mid: usize) -> (Self, Self) {
        let (vx_l, vx_r) = self.velocity_x.split_at_mut(mid);
        let (vy_l, vy_r) = self.velocity_y.split_at_mut(mid);
        let (t_l, t_r) = self.temperature.split_at_mut(mid);
        let (d_l, d_r) = self.area_density.split_at_mut(mid);
        (
            Self {
                offset: self.offset,
                velocity_x: vx_l,
                velocity_y: vy_l,
                temperature: t_l,
                area_density: d_l,
            },
            Self {
                offset: self.offset + mid,
                velocity_x: vx_r,
                velocity_y: vy_r,
                temperature: t_r,
                area_density: d_r,
            },
        )
    }
}

/// Inputs of one Jacobi sweep: `new = (l + r + u + d + alpha * rhs) * r_beta`
#[derive(Clone, Copy)]
pub struct JacobiContext<'a> {
    /// Current iterate
    pub field: &'a [f64],
    /// Right-hand side
    pub rhs: &'a [f64],
    pub width: usize,
    pub height: usize,
    pub alpha: f64,
    pub r_beta: f64,
}

/// Inputs of the curl pass of vorticity confinement
#[derive(Clone, Copy)]
pub struct CurlContext<'a> {
    pub velocity_x: &'a [f64],
    pub velocity_y: &'a [f64],
    pub obstacles: &'a ObstacleGrid,
    pub width: usize,
    pub height: usize,
}

/// Inputs of the force pass of vorticity confinement
#[derive(Clone, Copy)]
pub struct ConfinementContext<'a> {
    /// Curl computed by the first pass
    pub curl: &'a [f64],
    pub obstacles: &'a ObstacleGrid,
    pub width: usize,
    pub height: usize,
    /// `factor * cell_size`
    pub scale: f64,
}

/// Velocity slices written by the confinement force, starting at `offset`
pub struct VelocityTargets<'a> {
    pub offset: usize,
    pub velocity_x: &'a mut [f64],
    pub velocity_y: &'a mut [f64],
}

impl<'a> VelocityTargets<'a> {
    /// Borrow the velocity of a whole snapshot
    pub fn from_snapshot(target: &'a mut GridSnapshot) -> Self {
        Self {
            offset: 0,
            velocity_x: target.velocity_x.as_mut_slice(),
            velocity_y: target.velocity_y.as_mut_slice(),
        }
    }

    /// Number of cells covered
    pub fn len(&self) -> usize {
        self.velocity_x.len()
    }

    /// True when no cell is covered
    pub fn is_empty(&self) -> bool {
        self.velocity_x.is_empty()
    }

    /// Split into `[0, mid)` and `[mid, len)`
    pub fn split_at(self, mid: usize) -> (Self, Self) {
        let (vx_l, vx_r) = self.velocity_x.split_at_mut(mid);
        let (vy_l, vy_r) = self.velocity_y.split_at_mut(mid);
        (
            Self {
                offset: self.offset,
                velocity_x: vx_l,
                velocity_y: vy_l,
            },
            Self {
                offset: self.offset + mid,
                velocity_x: vx_r,
                velocity_y: vy_r,
            },
        )
    }
}

/// Inputs of a boundary-condition pass
#[derive(Clone, Copy)]
pub struct BoundaryContext<'a> {
    pub snapshot: &'a GridSnapshot,
    pub obstacles: &'a ObstacleGrid,
}
