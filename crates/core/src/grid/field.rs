//! Dense scalar field over the simulation grid
//!
//! A [`ScalarField`] stores one value per cell as a flat `Vec<f64>` indexed
//! `x + y * width`. Dimensions are fixed at creation.

use crate::math::clamp_index;

/// Scalar field container
///
/// Stores 2D field data as a flat `Vec<f64>` in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    data: Vec<f64>,
    width: usize,
    height: usize,
    /// Lease id assigned by the pool that handed this field out
    pub(crate) lease: Option<u64>,
}

impl ScalarField {
    /// Create a new field with given dimensions, initialized to zero
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_value(width, height, 0.0)
    }

    /// Create a new field with given dimensions, initialized to a value
    #[must_use]
    pub fn with_value(width: usize, height: usize, value: f64) -> Self {
        Self {
            data: vec![value; width * height],
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

    /// Number of cells (`width * height`)
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-sized field
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get reference to field data
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Get mutable reference to field data
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Flat index of `(x, y)`
    #[inline(always)]
    pub fn index(&self, x: usize, y: usize) -> usize {
        x + y * self.width
    }

    /// Get value at grid position
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        assert!(
            x < self.width && y < self.height,
            "Coordinates out of bounds"
        );
        self.data[self.index(x, y)]
    }

    /// Value at signed coordinates, clamped to the nearest valid cell
    #[inline(always)]
    pub fn get_clamped(&self, x: isize, y: isize) -> f64 {
        let cx = clamp_index(x, self.width);
        let cy = clamp_index(y, self.height);
        self.data[cx + cy * self.width]
    }

    /// Set value at grid position
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        assert!(
            x < self.width && y < self.height,
            "Coordinates out of bounds"
        );
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    /// Fill entire field with a value
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Overwrite this field's values with `other`'s
    ///
    /// # Panics
    ///
    /// Panics if the dimensions differ
    pub fn copy_from(&mut self, other: &ScalarField) {
        assert_eq!(
            (self.width, self.height),
            (other.width, other.height),
            "Field dimensions differ"
        );
        self.data.copy_from_slice(&other.data);
    }
}
