//! Error type shared by the whole crate
//!
//! Every synchronous rejection (bad parameter, wrong grid size, pool misuse) is
//! reported through [`SimError`]. Numerical stability problems are *not* errors;
//! they are reported by the stability monitor as [`crate::stability::CourantReport`].

use std::fmt;

/// Errors that can occur when configuring or driving a simulation
///
/// All variants are local and recoverable: the operation that returned the error
/// did not modify any state.
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// A parameter was outside its allowed domain
    InvalidParameter {
        /// Parameter name (e.g. `"dynamic_viscosity"`)
        name: &'static str,
        /// Description of the violated constraint
        message: String,
    },
    /// A snapshot, field or obstacle grid did not match the simulation grid
    SizeMismatch {
        /// What was being assigned or returned
        what: &'static str,
        /// Expected `(width, height)`
        expected: (usize, usize),
        /// Actual `(width, height)`
        actual: (usize, usize),
    },
    /// An object was returned to a pool that did not lease it out
    PoolMisuse {
        /// Description of the misuse
        message: String,
    },
    /// The worker thread pool could not be created
    ThreadPool(String),
}

impl SimError {
    /// Create an invalid-parameter error
    pub fn invalid_parameter(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }

    /// Create a size-mismatch error
    pub fn size_mismatch(
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    ) -> Self {
        Self::SizeMismatch {
            what,
            expected,
            actual,
        }
    }

    /// Reject anything that is not a finite, strictly positive number
    pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<f64, Self> {
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(Self::invalid_parameter(
                name,
                format!("must be finite and positive, got {value}"),
            ))
        }
    }

    /// Reject anything outside the closed range `[min, max]` (NaN included)
    pub(crate) fn require_range(
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    ) -> Result<f64, Self> {
        if (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(Self::invalid_parameter(
                name,
                format!("must be within [{min}, {max}], got {value}"),
            ))
        }
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::InvalidParameter { name, message } => {
                write!(f, "Invalid parameter '{name}': {message}")
            }
            SimError::SizeMismatch {
                what,
                expected,
                actual,
            } => write!(
                f,
                "Size mismatch for {what}: expected {}x{}, got {}x{}",
                expected.0, expected.1, actual.0, actual.1
            ),
            SimError::PoolMisuse { message } => write!(f, "Pool misuse: {message}"),
            SimError::ThreadPool(msg) => write!(f, "Failed to build thread pool: {msg}"),
        }
    }
}

impl std::error::Error for SimError {}
