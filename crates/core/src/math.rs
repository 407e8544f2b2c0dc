//! Small numeric helpers used by the per-cell kernels

/// Values whose magnitude is below this are treated as zero
pub const EPSILON: f64 = 1e-9;

/// Linear interpolation between `a` and `b`
#[inline(always)]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Bilinear interpolation inside a unit cell
///
/// `p00` is the sample at the cell origin, `p10` one step along x, `p01` one
/// step along y and `p11` the diagonal corner. `fx`/`fy` are the fractional
/// offsets in `[0, 1)`.
#[inline(always)]
pub fn bilinear_interpolate(p00: f64, p10: f64, p01: f64, p11: f64, fx: f64, fy: f64) -> f64 {
    lerp(lerp(p00, p10, fx), lerp(p01, p11, fx), fy)
}

/// Clamp a signed index into `[0, len)`
#[inline(always)]
pub fn clamp_index(index: isize, len: usize) -> usize {
    if index <= 0 {
        0
    } else {
        (index as usize).min(len.saturating_sub(1))
    }
}

/// Snap values with magnitude below `epsilon` to exactly zero
#[inline(always)]
pub fn normalize_small_to_zero(value: f64, epsilon: f64) -> f64 {
    if value.abs() < epsilon {
        0.0
    } else {
        value
    }
}

/// Euclidean length of `(x, y)`
#[inline(always)]
pub fn vector_magnitude(x: f64, y: f64) -> f64 {
    (x * x + y * y).sqrt()
}

/// Cumulative moving average with weight `1 / iteration`
///
/// Returns `(average, cumulative_sum)` where `cumulative_sum` already includes
/// `new_value`. An `iteration` of zero is treated as the first sample.
#[inline]
pub fn moving_average(new_value: f64, cumulative_sum: f64, iteration: u64) -> (f64, f64) {
    let sum = cumulative_sum + new_value;
    let n = iteration.max(1) as f64;
    (sum / n, sum)
}

/// Nearest of the eight grid directions to `angle` (radians)
///
/// Each component is `cos`/`sin` rounded to -1, 0 or 1. Returns `None` for a
/// NaN angle (no defined direction).
#[inline]
pub fn grid_direction(angle: f64) -> Option<(isize, isize)> {
    if angle.is_nan() {
        return None;
    }
    let dx = normalize_small_to_zero(angle.cos().round(), EPSILON) as isize;
    let dy = normalize_small_to_zero(angle.sin().round(), EPSILON) as isize;
    Some((dx, dy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    #[test]
    fn test_lerp_endpoints() {
        assert_eq!(lerp(2.0, 6.0, 0.0), 2.0);
        assert_eq!(lerp(2.0, 6.0, 1.0), 6.0);
        assert_eq!(lerp(2.0, 6.0, 0.25), 3.0);
    }

    #[test]
    fn test_bilinear_of_constant_is_exact() {
        let c = 0.1 + 0.2;
        for &(fx, fy) in &[(0.0, 0.0), (0.3, 0.7), (0.999, 0.001)] {
            assert_eq!(bilinear_interpolate(c, c, c, c, fx, fy), c);
        }
    }

    #[test]
    fn test_bilinear_weights() {
        // Centre of the cell averages the four corners
        assert_relative_eq!(bilinear_interpolate(0.0, 1.0, 2.0, 3.0, 0.5, 0.5), 1.5);
        assert_relative_eq!(bilinear_interpolate(0.0, 1.0, 2.0, 3.0, 1.0, 0.0), 1.0);
        assert_relative_eq!(bilinear_interpolate(0.0, 1.0, 2.0, 3.0, 0.0, 1.0), 2.0);
    }

    #[test]
    fn test_clamp_index() {
        assert_eq!(clamp_index(-3, 10), 0);
        assert_eq!(clamp_index(4, 10), 4);
        assert_eq!(clamp_index(10, 10), 9);
        assert_eq!(clamp_index(250, 10), 9);
    }

    #[test]
    fn test_moving_average_is_cumulative_mean() {
        let (avg, sum) = moving_average(4.0, 0.0, 1);
        assert_eq!((avg, sum), (4.0, 4.0));
        let (avg, sum) = moving_average(2.0, sum, 2);
        assert_eq!((avg, sum), (3.0, 6.0));
        let (avg, _) = moving_average(0.0, sum, 3);
        assert_eq!(avg, 2.0);
    }

    #[test]
    fn test_grid_direction() {
        assert_eq!(grid_direction(0.0), Some((1, 0)));
        assert_eq!(grid_direction(FRAC_PI_2), Some((0, 1)));
        assert_eq!(grid_direction(PI), Some((-1, 0)));
        assert_eq!(grid_direction(-FRAC_PI_2), Some((0, -1)));
        assert_eq!(grid_direction(FRAC_PI_4), Some((1, 1)));
        assert_eq!(grid_direction(f64::NAN), None);
    }
}
