//! One complete simulation state at a single instant
//!
//! A [`GridSnapshot`] holds the ten scalar fields the solver reads and writes,
//! plus a smoothed min/max per field that renderers use for stable legend
//! scaling.

use super::field::ScalarField;
use crate::config::constants::AMBIENT_TEMPERATURE;
use crate::math::moving_average;
use serde::{Deserialize, Serialize};

/// The ten fields of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Velocity along x (m/s)
    VelocityX,
    /// Velocity along y (m/s)
    VelocityY,
    /// |v| (m/s)
    VelocityMagnitude,
    /// Pressure
    Pressure,
    /// Temperature (K)
    Temperature,
    /// Passive dye used for visual striping
    AreaDensity,
    /// ∇·v
    VelocityDivergence,
    /// ∂p/∂x
    PressureGradientX,
    /// ∂p/∂y
    PressureGradientY,
    /// ∇×v (scalar in 2D)
    VelocityCurl,
}

impl FieldKind {
    /// Number of fields in a snapshot
    pub const COUNT: usize = 10;

    /// Every field, in storage order
    pub const ALL: [FieldKind; Self::COUNT] = [
        FieldKind::VelocityX,
        FieldKind::VelocityY,
        FieldKind::VelocityMagnitude,
        FieldKind::Pressure,
        FieldKind::Temperature,
        FieldKind::AreaDensity,
        FieldKind::VelocityDivergence,
        FieldKind::PressureGradientX,
        FieldKind::PressureGradientY,
        FieldKind::VelocityCurl,
    ];

    /// Position of this field in [`FieldKind::ALL`]
    #[inline]
    pub const fn ordinal(self) -> usize {
        self as usize
    }
}

/// Smoothed extrema of one field: `[minEMA, maxEMA, cumMin, cumMax]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldRange {
    /// Moving average of the per-step minimum
    pub min_ema: f64,
    /// Moving average of the per-step maximum
    pub max_ema: f64,
    /// Sum of all per-step minima so far
    pub cum_min: f64,
    /// Sum of all per-step maxima so far
    pub cum_max: f64,
}

impl FieldRange {
    /// Fold this step's exact extrema in with weight `1 / iteration`
    pub fn update(&mut self, min: f64, max: f64, iteration: u64) {
        let (min_ema, cum_min) = moving_average(min, self.cum_min, iteration);
        let (max_ema, cum_max) = moving_average(max, self.cum_max, iteration);
        *self = Self {
            min_ema,
            max_ema,
            cum_min,
            cum_max,
        };
    }

    /// `(min, max)` to scale a legend with
    pub fn bounds(&self) -> (f64, f64) {
        (self.min_ema, self.max_ema)
    }
}

/// A full set of simulation fields at one timestep
///
/// Fields are public so the solver can borrow several of them disjointly
/// (e.g. read the curl while writing the velocity).
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    /// Velocity along x (m/s)
    pub velocity_x: ScalarField,
    /// Velocity along y (m/s)
    pub velocity_y: ScalarField,
    /// |v| (m/s)
    pub velocity_magnitude: ScalarField,
    /// Pressure
    pub pressure: ScalarField,
    /// Temperature (K)
    pub temperature: ScalarField,
    /// Passive dye
    pub area_density: ScalarField,
    /// ∇·v
    pub velocity_divergence: ScalarField,
    /// ∂p/∂x
    pub pressure_gradient_x: ScalarField,
    /// ∂p/∂y
    pub pressure_gradient_y: ScalarField,
    /// ∇×v
    pub velocity_curl: ScalarField,
    ranges: [FieldRange; FieldKind::COUNT],
    width: usize,
    height: usize,
    /// Lease id assigned by the pool that handed this snapshot out
    pub(crate) lease: Option<u64>,
}

impl GridSnapshot {
    /// Zero-filled snapshot with temperature seeded to the ambient value
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        let zero = || ScalarField::new(width, height);
        Self {
            velocity_x: zero(),
            velocity_y: zero(),
            velocity_magnitude: zero(),
            pressure: zero(),
            temperature: ScalarField::with_value(width, height, AMBIENT_TEMPERATURE),
            area_density: zero(),
            velocity_divergence: zero(),
            pressure_gradient_x: zero(),
            pressure_gradient_y: zero(),
            velocity_curl: zero(),
            ranges: [FieldRange::default(); FieldKind::COUNT],
            width,
            height,
            lease: None,
        }
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
        self.width * self.height
    }

    /// Flat index of `(x, y)`
    #[inline(always)]
    pub fn index(&self, x: usize, y: usize) -> usize {
        x + y * self.width
    }

    /// Borrow one field by kind
    pub fn field(&self, kind: FieldKind) -> &ScalarField {
        match kind {
            FieldKind::VelocityX => &self.velocity_x,
            FieldKind::VelocityY => &self.velocity_y,
            FieldKind::VelocityMagnitude => &self.velocity_magnitude,
            FieldKind::Pressure => &self.pressure,
            FieldKind::Temperature => &self.temperature,
            FieldKind::AreaDensity => &self.area_density,
            FieldKind::VelocityDivergence => &self.velocity_divergence,
            FieldKind::PressureGradientX => &self.pressure_gradient_x,
            FieldKind::PressureGradientY => &self.pressure_gradient_y,
            FieldKind::VelocityCurl => &self.velocity_curl,
        }
    }

    /// Mutably borrow one field by kind
    pub fn field_mut(&mut self, kind: FieldKind) -> &mut ScalarField {
        match kind {
            FieldKind::VelocityX => &mut self.velocity_x,
            FieldKind::VelocityY => &mut self.velocity_y,
            FieldKind::VelocityMagnitude => &mut self.velocity_magnitude,
            FieldKind::Pressure => &mut self.pressure,
            FieldKind::Temperature => &mut self.temperature,
            FieldKind::AreaDensity => &mut self.area_density,
            FieldKind::VelocityDivergence => &mut self.velocity_divergence,
            FieldKind::PressureGradientX => &mut self.pressure_gradient_x,
            FieldKind::PressureGradientY => &mut self.pressure_gradient_y,
            FieldKind::VelocityCurl => &mut self.velocity_curl,
        }
    }

    /// Smoothed extrema of one field
    pub fn range(&self, kind: FieldKind) -> FieldRange {
        self.ranges[kind.ordinal()]
    }

    /// Mutable smoothed extrema of one field
    pub fn range_mut(&mut self, kind: FieldKind) -> &mut FieldRange {
        &mut self.ranges[kind.ordinal()]
    }

    /// Copy every field and range from `other`, keeping this snapshot's lease
    ///
    /// # Panics
    ///
    /// Panics if the dimensions differ
    pub fn copy_from(&mut self, other: &GridSnapshot) {
        for kind in FieldKind::ALL {
            self.field_mut(kind).copy_from(other.field(kind));
        }
        self.ranges = other.ranges;
    }

    /// Zero every field (temperature back to ambient) and forget the ranges
    pub fn reset(&mut self) {
        for kind in FieldKind::ALL {
            let value = if kind == FieldKind::Temperature {
                AMBIENT_TEMPERATURE
            } else {
                0.0
            };
            self.field_mut(kind).fill(value);
        }
        self.ranges = [FieldRange::default(); FieldKind::COUNT];
    }

    /// Largest `|vx|` or `|vy|` anywhere on the grid
    pub fn max_velocity_component(&self) -> f64 {
        self.velocity_x
            .as_slice()
            .iter()
            .chain(self.velocity_y.as_slice())
            .fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }
}
