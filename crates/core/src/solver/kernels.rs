//! Per-cell kernels shared by both backends
//!
//! Each function processes a contiguous range of flat cell indices. The
//! sequential backend calls them once over the whole grid; the parallel one
//! calls them on the leaves of its bisection.

use super::context::{
    AdvectContext, AdvectTargets, ConfinementContext, CurlContext, JacobiContext, VelocityTargets,
};
use crate::math::{bilinear_interpolate, clamp_index, vector_magnitude, EPSILON};

/// Value at signed `(x, y)` with both coordinates clamped onto the grid
#[inline(always)]
fn sample(data: &[f64], width: usize, height: usize, x: isize, y: isize) -> f64 {
    data[clamp_index(x, width) + clamp_index(y, height) * width]
}

/// Bilinear sample at a fractional grid position
#[inline(always)]
fn sample_bilinear(data: &[f64], width: usize, height: usize, px: f64, py: f64) -> f64 {
    let x0 = px.floor();
    let y0 = py.floor();
    let (fx, fy) = (px - x0, py - y0);
    let (x0, y0) = (x0 as isize, y0 as isize);
    bilinear_interpolate(
        sample(data, width, height, x0, y0),
        sample(data, width, height, x0 + 1, y0),
        sample(data, width, height, x0, y0 + 1),
        sample(data, width, height, x0 + 1, y0 + 1),
        fx,
        fy,
    )
}

/// Backtrace every cell of `out` through the source velocity and resample
pub fn advect_range(ctx: &AdvectContext<'_>, out: AdvectTargets<'_>) {
    let source = ctx.source;
    let (width, height) = source.dimensions();
    let vx = source.velocity_x.as_slice();
    let vy = source.velocity_y.as_slice();
    let temperature = source.temperature.as_slice();
    let density = source.area_density.as_slice();

    let AdvectTargets {
        offset,
        velocity_x: out_vx,
        velocity_y: out_vy,
        temperature: out_temperature,
        area_density: out_density,
    } = out;

    for i in 0..out_vx.len() {
        let idx = offset + i;
        let x = (idx % width) as f64;
        let y = (idx / width) as f64;
        let px = x - ctx.dt * vx[idx] * ctx.cells_per_meter_x;
        let py = y - ctx.dt * vy[idx] * ctx.cells_per_meter_y;

        out_vx[i] = sample_bilinear(vx, width, height, px, py);
        out_vy[i] = sample_bilinear(vy, width, height, px, py);
        out_temperature[i] = sample_bilinear(temperature, width, height, px, py);
        out_density[i] = sample_bilinear(density, width, height, px, py);
    }
}

/// One Jacobi sweep over `[start, start + out.len())`
///
/// Returns the smallest relative change `|new - old| / |old|` among cells
/// whose value changed, or `f64::INFINITY` if none did.
pub fn jacobi_range(ctx: &JacobiContext<'_>, start: usize, out: &mut [f64]) -> f64 {
    let (width, height) = (ctx.width, ctx.height);
    let mut min_change = f64::INFINITY;

    for (i, slot) in out.iter_mut().enumerate() {
        let idx = start + i;
        let x = (idx % width) as isize;
        let y = (idx / width) as isize;

        let neighbors = sample(ctx.field, width, height, x - 1, y)
            + sample(ctx.field, width, height, x + 1, y)
            + sample(ctx.field, width, height, x, y - 1)
            + sample(ctx.field, width, height, x, y + 1);
        let new = (neighbors + ctx.alpha * ctx.rhs[idx]) * ctx.r_beta;
        let old = ctx.field[idx];

        if new != old {
            min_change = min_change.min((new - old).abs() / old.abs());
        }
        *slot = new;
    }

    min_change
}

/// Scalar curl of the velocity; zero on obstructed cells
pub fn curl_range(ctx: &CurlContext<'_>, start: usize, out: &mut [f64]) {
    let (width, height) = (ctx.width, ctx.height);

    for (i, slot) in out.iter_mut().enumerate() {
        let idx = start + i;
        if ctx.obstacles.is_obstructed(idx) {
            *slot = 0.0;
            continue;
        }
        let x = (idx % width) as isize;
        let y = (idx / width) as isize;
        let dvy_dx = sample(ctx.velocity_y, width, height, x + 1, y)
            - sample(ctx.velocity_y, width, height, x - 1, y);
        let dvx_dy = sample(ctx.velocity_x, width, height, x, y + 1)
            - sample(ctx.velocity_x, width, height, x, y - 1);
        *slot = 0.5 * (dvy_dx - dvx_dy);
    }
}

/// Add the confinement force to the velocity of free cells
///
/// Only the cell's own velocity is written, so ranges never overlap.
pub fn confinement_range(ctx: &ConfinementContext<'_>, out: VelocityTargets<'_>) {
    let (width, height) = (ctx.width, ctx.height);
    let abs_curl = |x: isize, y: isize| sample(ctx.curl, width, height, x, y).abs();

    let VelocityTargets {
        offset,
        velocity_x,
        velocity_y,
    } = out;

    for i in 0..velocity_x.len() {
        let idx = offset + i;
        if ctx.obstacles.is_obstructed(idx) {
            continue;
        }
        let x = (idx % width) as isize;
        let y = (idx / width) as isize;

        let gx = 0.5 * (abs_curl(x + 1, y) - abs_curl(x - 1, y));
        let gy = 0.5 * (abs_curl(x, y + 1) - abs_curl(x, y - 1));
        let magnitude = vector_magnitude(gx, gy);
        if magnitude < EPSILON {
            continue;
        }
        let (nx, ny) = (gx / magnitude, gy / magnitude);
        let strength = ctx.scale * ctx.curl[idx];

        velocity_x[i] += strength * ny;
        velocity_y[i] -= strength * nx;
    }
}
