//! Courant-number stability monitor
//!
//! The Courant number `C = max(|vx|, |vy|) · dt / cell` tells how many cells
//! the fastest parcel crosses per step. The solver is unconditionally stable,
//! but accuracy degrades as `C` grows, so the monitor classifies it and
//! suggests a time step that would bring it back to the warn threshold. It
//! never changes the simulation.

use crate::config::StabilityThresholds;
use crate::math::EPSILON;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Classification of a Courant number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourantStatus {
    /// Below the warn threshold
    #[default]
    Ok,
    /// `warn <= C < error`
    Warn,
    /// `C >= error`
    Error,
    /// Velocity is (numerically) zero; no Courant number defined
    Degenerate,
}

/// Result of one stability check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CourantReport {
    /// Courant number, `None` when degenerate
    pub number: Option<f64>,
    pub status: CourantStatus,
    /// Time step that would bring `C` down to the warn threshold
    /// (only for `Warn` and `Error`)
    pub suggested_time_step: Option<f64>,
}

/// Courant number for the given maximum velocity component
///
/// Returns `None` when `max_velocity` is below [`EPSILON`].
pub fn courant_number(max_velocity: f64, dt: f64, cell_size: f64) -> Option<f64> {
    (max_velocity >= EPSILON).then_some(max_velocity * dt / cell_size)
}

/// Classify a state without logging
pub fn classify(
    max_velocity: f64,
    dt: f64,
    cell_size: f64,
    thresholds: &StabilityThresholds,
) -> CourantReport {
    let Some(number) = courant_number(max_velocity, dt, cell_size) else {
        return CourantReport {
            number: None,
            status: CourantStatus::Degenerate,
            suggested_time_step: None,
        };
    };
    let status = if number >= thresholds.error {
        CourantStatus::Error
    } else if number >= thresholds.warn {
        CourantStatus::Warn
    } else {
        CourantStatus::Ok
    };
    let suggested_time_step = matches!(status, CourantStatus::Warn | CourantStatus::Error)
        .then_some(thresholds.warn * cell_size / max_velocity);
    CourantReport {
        number: Some(number),
        status,
        suggested_time_step,
    }
}

/// Tracks the last status and logs when it changes
#[derive(Debug, Clone, Default)]
pub struct StabilityMonitor {
    thresholds: StabilityThresholds,
    last: Option<CourantReport>,
}

impl StabilityMonitor {
    /// Monitor with the given thresholds
    pub fn new(thresholds: StabilityThresholds) -> Self {
        Self {
            thresholds,
            last: None,
        }
    }

    /// Thresholds in use
    pub fn thresholds(&self) -> StabilityThresholds {
        self.thresholds
    }

    /// Replace the thresholds; the next check re-reports its status
    pub fn set_thresholds(&mut self, thresholds: StabilityThresholds) {
        self.thresholds = thresholds;
        self.last = None;
    }

    /// Most recent report
    pub fn last_report(&self) -> Option<CourantReport> {
        self.last
    }

    /// Forget the last status (after a reinitialization)
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Classify the current state
    ///
    /// Returns the report and whether its status differs from the previous
    /// check. Status changes are logged, warnings and errors at their own
    /// level.
    pub fn check(&mut self, max_velocity: f64, dt: f64, cell_size: f64) -> (CourantReport, bool) {
        let report = classify(max_velocity, dt, cell_size, &self.thresholds);
        let changed = self.last.map(|r| r.status) != Some(report.status);

        if !changed {
            self.last = Some(report);
            return (report, false);
        }
        match (report.status, report.number, report.suggested_time_step) {
            (CourantStatus::Warn, Some(c), Some(suggested)) => warn!(
                "Courant number {:.3} above {:.2}; consider dt <= {:.3e} s",
                c, self.thresholds.warn, suggested
            ),
            (CourantStatus::Error, Some(c), Some(suggested)) => error!(
                "Courant number {:.3} above {:.2}; results unreliable, use dt <= {:.3e} s",
                c, self.thresholds.error, suggested
            ),
            _ => debug!("Stability status: {:?}", report.status),
        }

        self.last = Some(report);
        (report, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn thresholds() -> StabilityThresholds {
        StabilityThresholds {
            warn: 0.5,
            error: 1.0,
        }
    }

    #[test]
    fn test_unit_cell_and_step_table() {
        // cell 1, dt 1: C equals the velocity
        let thresholds = StabilityThresholds {
            warn: 0.5,
            error: 0.8,
        };
        let cases = [
            (0.05, CourantStatus::Ok),
            (0.6, CourantStatus::Warn),
            (0.9, CourantStatus::Error),
            (0.0, CourantStatus::Degenerate),
        ];
        for (velocity, expected) in cases {
            let report = classify(velocity, 1.0, 1.0, &thresholds);
            assert_eq!(report.status, expected, "v = {velocity}");
            if expected == CourantStatus::Degenerate {
                assert!(report.number.is_none());
            } else {
                assert_relative_eq!(report.number.unwrap(), velocity);
            }
        }
    }

    #[test]
    fn test_classification() {
        // cell 0.1, dt 0.01: C = v / 10
        let ok = classify(0.5, 0.01, 0.1, &thresholds());
        assert_eq!(ok.status, CourantStatus::Ok);
        assert_relative_eq!(ok.number.unwrap(), 0.05);
        assert!(ok.suggested_time_step.is_none());

        let warn = classify(6.0, 0.01, 0.1, &thresholds());
        assert_eq!(warn.status, CourantStatus::Warn);
        assert_relative_eq!(warn.number.unwrap(), 0.6);
        // dt that brings C to 0.5
        assert_relative_eq!(warn.suggested_time_step.unwrap(), 0.5 * 0.1 / 6.0);

        let error = classify(20.0, 0.01, 0.1, &thresholds());
        assert_eq!(error.status, CourantStatus::Error);
        assert!(error.suggested_time_step.is_some());

        let degenerate = classify(0.0, 0.01, 0.1, &thresholds());
        assert_eq!(degenerate.status, CourantStatus::Degenerate);
        assert!(degenerate.number.is_none());
    }

    #[test]
    fn test_warn_band_is_half_open() {
        let t = StabilityThresholds {
            warn: 0.25,
            error: 0.5,
        };
        assert_eq!(classify(0.9, 1.0, 1.0, &t).status, CourantStatus::Error);
        assert_eq!(classify(0.5, 1.0, 1.0, &t).status, CourantStatus::Error);
        assert_eq!(classify(0.25, 1.0, 1.0, &t).status, CourantStatus::Warn);
        assert_eq!(classify(0.2, 1.0, 1.0, &t).status, CourantStatus::Ok);
    }

    #[test]
    fn test_monitor_reports_changes_only() {
        let mut monitor = StabilityMonitor::new(thresholds());
        let (_, changed) = monitor.check(0.5, 0.01, 0.1);
        assert!(changed);
        let (_, changed) = monitor.check(0.6, 0.01, 0.1);
        assert!(!changed);
        let (report, changed) = monitor.check(7.0, 0.01, 0.1);
        assert!(changed);
        assert_eq!(report.status, CourantStatus::Warn);
        assert_eq!(monitor.last_report(), Some(report));

        monitor.reset();
        let (_, changed) = monitor.check(7.0, 0.01, 0.1);
        assert!(changed);
    }
}
