//! Pre-scan calibration moves.
//!
//! The lock-in drops the first triggered windows after arming, so two
//! throwaway moves are made before the first counted sample.

use crate::range::AxisRange;

/// First target and reference closer than this are treated as coincident.
pub const COINCIDENCE_TOLERANCE: f64 = 1e-4;

/// Number of bursts read and discarded before sample 0.
pub const CALIBRATION_READS: usize = 2;

/// The two warm-up positions, visited in order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPlan {
    pub points: [f64; 2],
}

impl CalibrationPlan {
    /// Warm-up positions between the reference point and the first target.
    pub fn new(first_target: f64, reference: f64, stepsize: f64) -> Self {
        let delta_x = first_target - reference;
        let points = if delta_x.abs() < COINCIDENCE_TOLERANCE {
            [
                (reference - 2.0 * stepsize).abs(),
                (reference - stepsize).abs(),
            ]
        } else if delta_x > 0.0 {
            [delta_x / 3.0, 2.0 * delta_x / 3.0]
        } else {
            [reference + delta_x / 3.0, reference + 2.0 * delta_x / 3.0]
        };
        Self { points }
    }

    /// Same plan with both points pulled inside `range`.
    pub fn clamped(self, range: &AxisRange) -> Self {
        Self {
            points: self.points.map(|p| range.clamp(p)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_coincident_reference() {
        let plan = CalibrationPlan::new(0.0, 0.0, 0.1);
        assert_abs_diff_eq!(plan.points[0], 0.2);
        assert_abs_diff_eq!(plan.points[1], 0.1);
    }

    #[test]
    fn test_coincidence_tolerance() {
        let plan = CalibrationPlan::new(5.00005, 5.0, 1.0);
        assert_abs_diff_eq!(plan.points[0], 3.0);
        assert_abs_diff_eq!(plan.points[1], 4.0);
    }

    #[test]
    fn test_target_above_reference() {
        let plan = CalibrationPlan::new(3.0, 0.0, 0.1);
        assert_abs_diff_eq!(plan.points[0], 1.0);
        assert_abs_diff_eq!(plan.points[1], 2.0);
    }

    #[test]
    fn test_target_below_reference() {
        let plan = CalibrationPlan::new(4.0, 10.0, 0.5);
        assert_abs_diff_eq!(plan.points[0], 8.0);
        assert_abs_diff_eq!(plan.points[1], 6.0);
    }

    #[test]
    fn test_clamped_to_travel() {
        let plan = CalibrationPlan::new(0.0, 0.0, 4.0).clamped(&AxisRange::new(0.0, 5.0));
        assert_eq!(plan.points, [5.0, 4.0]);
    }
}
