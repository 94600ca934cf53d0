//! Acquisition grid geometry derived from a scan mode.
//!
//! Continuous scans take one row per sweep and sample the sweep into one
//! column per target position. Discrete scans take one row per target and
//! sample a fixed settle window at the demodulator rate.

use hardware::{DaqSettings, GridMode, TriggerEdge, TriggerType};

use crate::config::{ScanKind, ScanMode};

/// Settle window acquired at each target of a discrete scan, in seconds.
pub const DISCRETE_SETTLE_S: f64 = 0.05;

/// Holdoff as a fraction of the burst duration.
pub const HOLDOFF_FRACTION: f64 = 0.95;

/// Absorbs representation error in `delta / stepsize` before flooring, so
/// `1.0 / 0.1` counts as 10 steps rather than 9.
const FLOOR_EPSILON: f64 = 1e-9;

/// Grid parameters for the acquisition module.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DaqGeometry {
    pub rows: usize,
    pub cols: usize,
    pub duration_s: f64,
    pub holdoff_s: f64,
    pub trigger_edge: TriggerEdge,
    pub grid_mode: GridMode,
}

impl DaqGeometry {
    /// Acquisition settings for this geometry with `extra_rows` prepended
    /// for triggers that are read and discarded before the first sample.
    pub fn to_settings(&self, extra_rows: usize, trigger_node: Option<String>) -> DaqSettings {
        DaqSettings {
            rows: self.rows + extra_rows,
            cols: self.cols,
            duration_s: self.duration_s,
            holdoff_s: self.holdoff_s,
            trigger_edge: self.trigger_edge,
            grid_mode: self.grid_mode,
            trigger_type: TriggerType::HardwareTrigger,
            trigger_node,
        }
    }
}

/// Number of evenly spaced points covering `delta` at `stepsize`,
/// `floor(delta / stepsize) + 1`.
///
/// The floor is taken after adding [`FLOOR_EPSILON`], so a span that is an
/// exact multiple of the step keeps its last point even when the division
/// rounds just below the integer: `point_count(0.3, 0.1)` is 4, where a plain
/// floating-point `floor(0.3 / 0.1) + 1` gives 3. Saturates at `usize::MAX`;
/// validated scans never get near that (see [`crate::config::MAX_POINTS`]).
pub fn point_count(delta: f64, stepsize: f64) -> usize {
    // `as` saturates and maps NaN to 0
    ((delta / stepsize + FLOOR_EPSILON).floor() as usize).saturating_add(1)
}

/// Time for a point-to-point move of length `delta`.
///
/// If the axis can reach `velocity` within the move (`sqrt(a * delta) > v`)
/// the profile is trapezoidal, otherwise triangular. Never negative.
pub fn duration_calculator(delta: f64, velocity: f64, acceleration: f64) -> f64 {
    if delta <= 0.0 {
        return 0.0;
    }
    if (acceleration * delta).sqrt() > velocity {
        velocity / acceleration + delta / velocity
    } else {
        (delta / acceleration).sqrt()
    }
}

/// Columns of one discrete settle window at `sampling_rate`.
pub(crate) fn discrete_cols(sampling_rate: f64) -> usize {
    ((DISCRETE_SETTLE_S * sampling_rate + FLOOR_EPSILON).floor() as usize).max(1)
}

/// Derive the acquisition grid for a validated scan mode.
pub fn plan(mode: &ScanMode) -> DaqGeometry {
    let sweep = mode.sweep_axis();
    let step_points = mode.step_axis().map_or(1, |axis| axis.point_count());

    let (rows, cols, duration_s, trigger_edge, grid_mode) = match mode.kind() {
        ScanKind::Continuous => (
            step_points,
            sweep.point_count(),
            duration_calculator(sweep.delta(), sweep.velocity, mode.acceleration()),
            TriggerEdge::Positive,
            GridMode::Linear,
        ),
        ScanKind::Discrete => (
            sweep.point_count().saturating_mul(step_points),
            discrete_cols(mode.sampling_rate()),
            DISCRETE_SETTLE_S,
            TriggerEdge::Negative,
            GridMode::ExactOnGrid,
        ),
    };

    DaqGeometry {
        rows,
        cols,
        duration_s,
        holdoff_s: HOLDOFF_FRACTION * duration_s,
        trigger_edge,
        grid_mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Direction, MainAxis, ScanSpec, SecondaryAxisSpec};
    use approx::assert_abs_diff_eq;

    fn spec(kind: ScanKind) -> ScanSpec {
        ScanSpec {
            kind,
            dimension: 1,
            direction: Direction::Forward,
            edges: [0.0, 1.0],
            stepsize: 0.1,
            velocity: 1.0,
            acceleration: 1.0,
            sampling_rate: 100.0,
            secondary: None,
            main_axis: MainAxis::Primary,
        }
    }

    fn raster(kind: ScanKind, main_axis: MainAxis) -> ScanSpec {
        ScanSpec {
            dimension: 2,
            stepsize: 0.5,
            secondary: Some(SecondaryAxisSpec {
                edges: [0.0, 1.0],
                stepsize: 1.0,
                velocity: Some(2.0),
            }),
            main_axis,
            ..spec(kind)
        }
    }

    #[test]
    fn test_point_count_floors() {
        assert_eq!(point_count(1.0, 0.1), 11);
        assert_eq!(point_count(1.0, 0.3), 4);
        assert_eq!(point_count(0.3, 0.1), 4);
        assert_eq!(point_count(1.0, 1.0), 2);
    }

    #[test]
    fn test_point_count_saturates() {
        assert_eq!(point_count(1e10, 1e-10), usize::MAX);
        assert_eq!(point_count(20.0, 1e-18), usize::MAX);
    }

    #[test]
    fn test_duration_boundary_is_triangular() {
        assert_abs_diff_eq!(duration_calculator(1.0, 1.0, 1.0), 1.0);
    }

    #[test]
    fn test_duration_trapezoidal() {
        // sqrt(4 * 4) = 4 > 2: plateau reached
        assert_abs_diff_eq!(duration_calculator(4.0, 2.0, 4.0), 0.5 + 2.0);
    }

    #[test]
    fn test_duration_triangular() {
        assert_abs_diff_eq!(duration_calculator(0.25, 10.0, 1.0), 0.5);
    }

    #[test]
    fn test_duration_never_negative() {
        for &(d, v, a) in &[(0.0, 1.0, 1.0), (1e-12, 5.0, 0.1), (100.0, 0.5, 50.0)] {
            assert!(duration_calculator(d, v, a) >= 0.0);
        }
    }

    #[test]
    fn test_discrete_line() {
        let geometry = plan(&spec(ScanKind::Discrete).mode().unwrap());
        assert_eq!(geometry.rows, 11);
        assert_eq!(geometry.cols, 5);
        assert_abs_diff_eq!(geometry.duration_s, 0.05);
        assert_eq!(geometry.holdoff_s, 0.95 * geometry.duration_s);
        assert_eq!(geometry.trigger_edge, TriggerEdge::Negative);
        assert_eq!(geometry.grid_mode, GridMode::ExactOnGrid);
    }

    #[test]
    fn test_continuous_line() {
        let geometry = plan(&spec(ScanKind::Continuous).mode().unwrap());
        assert_eq!(geometry.rows, 1);
        assert_eq!(geometry.cols, 11);
        assert_abs_diff_eq!(geometry.duration_s, 1.0);
        assert_eq!(geometry.holdoff_s, 0.95 * geometry.duration_s);
        assert_eq!(geometry.trigger_edge, TriggerEdge::Positive);
        assert_eq!(geometry.grid_mode, GridMode::Linear);
    }

    #[test]
    fn test_discrete_raster_flattens() {
        let geometry = plan(&raster(ScanKind::Discrete, MainAxis::Primary).mode().unwrap());
        assert_eq!(geometry.rows, 6);
        assert_eq!(geometry.cols, 5);
    }

    #[test]
    fn test_continuous_raster_uses_main_axis() {
        let geometry = plan(&raster(ScanKind::Continuous, MainAxis::Primary).mode().unwrap());
        assert_eq!(geometry.rows, 2);
        assert_eq!(geometry.cols, 3);
        assert_abs_diff_eq!(geometry.duration_s, 1.0);

        let geometry = plan(&raster(ScanKind::Continuous, MainAxis::Secondary).mode().unwrap());
        assert_eq!(geometry.rows, 3);
        assert_eq!(geometry.cols, 2);
        // delta 1, v 2, a 1: sqrt(1) < 2, triangular
        assert_abs_diff_eq!(geometry.duration_s, 1.0);
    }

    #[test]
    fn test_settings_include_discarded_rows() {
        let geometry = plan(&spec(ScanKind::Discrete).mode().unwrap());
        let settings = geometry.to_settings(2, Some("/dev4910/demods/0/sample.TrigIn1".into()));
        assert_eq!(settings.rows, 13);
        assert_eq!(settings.cols, 5);
        assert_eq!(settings.trigger_type, TriggerType::HardwareTrigger);
        assert!(settings.trigger_node.is_some());
    }
}
