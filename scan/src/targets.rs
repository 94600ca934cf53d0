//! Target position sequences.
//!
//! Positions are interpolated between the edges rather than accumulated from
//! the stepsize, so the first and last targets are exactly the edges.

use crate::config::{AxisScan, Direction, MainAxis};

/// `n` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let span = end - start;
            let last = n - 1;
            (0..n)
                .map(|i| {
                    if i == last {
                        end
                    } else {
                        start + span * (i as f64 / last as f64)
                    }
                })
                .collect()
        }
    }
}

/// Ordered targets along one axis. `Backward` runs from the upper edge down.
pub fn generate(axis: &AxisScan, direction: Direction) -> Vec<f64> {
    let [low, high] = axis.edges;
    let n = axis.point_count();
    match direction {
        Direction::Forward => linspace(low, high, n),
        Direction::Backward => linspace(high, low, n),
    }
}

/// One row of a serpentine raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterRow {
    /// Position of the stepped axis for this row
    pub step_position: f64,
    /// Sweep axis positions in traversal order
    pub sweep_positions: Vec<f64>,
    /// Whether this row runs opposite to row 0
    pub reversed: bool,
}

impl RasterRow {
    /// Sweep position at which the row starts.
    pub fn start(&self) -> f64 {
        self.sweep_positions.first().copied().unwrap_or(self.step_position)
    }

    /// Sweep position at which the row ends.
    pub fn end(&self) -> f64 {
        self.sweep_positions.last().copied().unwrap_or(self.step_position)
    }
}

/// Row-major serpentine target matrix for a 2-D scan.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterTargets {
    pub main_axis: MainAxis,
    /// Sweep axis positions in row-0 order; column `j` of the output frame
    pub sweep_positions: Vec<f64>,
    pub rows: Vec<RasterRow>,
}

impl RasterTargets {
    /// Build the serpentine matrix. The sweep axis follows `direction` on even
    /// rows and runs reversed on odd rows; the step axis always ascends.
    pub fn generate(
        sweep: &AxisScan,
        step: &AxisScan,
        main_axis: MainAxis,
        direction: Direction,
    ) -> Self {
        let sweep_positions = generate(sweep, direction);
        let rows = generate(step, Direction::Forward)
            .into_iter()
            .enumerate()
            .map(|(r, step_position)| {
                let reversed = r % 2 == 1;
                let mut positions = sweep_positions.clone();
                if reversed {
                    positions.reverse();
                }
                RasterRow {
                    step_position,
                    sweep_positions: positions,
                    reversed,
                }
            })
            .collect();

        Self {
            main_axis,
            sweep_positions,
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn col_count(&self) -> usize {
        self.sweep_positions.len()
    }

    /// Step axis positions, one per row.
    pub fn step_positions(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.step_position).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn axis(edges: [f64; 2], stepsize: f64) -> AxisScan {
        AxisScan {
            edges,
            stepsize,
            velocity: 1.0,
        }
    }

    #[test]
    fn test_line_targets() {
        let targets = generate(&axis([0.0, 1.0], 0.1), Direction::Forward);
        assert_eq!(targets.len(), 11);
        for (i, t) in targets.iter().enumerate() {
            assert_abs_diff_eq!(*t, i as f64 * 0.1, epsilon = 1e-12);
        }
        assert_eq!(targets[0], 0.0);
        assert_eq!(targets[10], 1.0);
    }

    #[test]
    fn test_backward_targets() {
        let targets = generate(&axis([-2.0, 3.0], 0.5), Direction::Backward);
        assert_eq!(targets.len(), 11);
        assert_eq!(targets[0], 3.0);
        assert_eq!(targets[10], -2.0);
    }

    #[test]
    fn test_count_matches_floor_for_uneven_steps() {
        for &(edges, step) in &[([0.0, 1.0], 0.3), ([0.1, 0.75], 0.2), ([5.0, 9.0], 1.5)] {
            let a = axis(edges, step);
            let expected = ((edges[1] - edges[0]) / step).floor() as usize + 1;
            let targets = generate(&a, Direction::Forward);
            assert_eq!(targets.len(), expected);
            assert_eq!(targets[0], edges[0]);
            assert_eq!(*targets.last().unwrap(), edges[1]);
        }
    }

    #[test]
    fn test_linspace_degenerate() {
        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(linspace(2.0, 5.0, 1), vec![2.0]);
    }

    #[test]
    fn test_serpentine_raster() {
        let raster = RasterTargets::generate(
            &axis([0.0, 1.0], 0.5),
            &axis([0.0, 1.0], 1.0),
            MainAxis::Primary,
            Direction::Forward,
        );
        assert_eq!(raster.row_count(), 2);
        assert_eq!(raster.col_count(), 3);
        assert_eq!(raster.step_positions(), vec![0.0, 1.0]);
        assert_eq!(raster.rows[0].sweep_positions, vec![0.0, 0.5, 1.0]);
        assert_eq!(raster.rows[1].sweep_positions, vec![1.0, 0.5, 0.0]);
        // Each row starts where the previous one ended
        assert_eq!(raster.rows[1].start(), raster.rows[0].end());
    }

    #[test]
    fn test_odd_rows_reversed() {
        let raster = RasterTargets::generate(
            &axis([0.0, 2.0], 1.0),
            &axis([0.0, 4.0], 1.0),
            MainAxis::Primary,
            Direction::Forward,
        );
        for (r, row) in raster.rows.iter().enumerate() {
            assert_eq!(row.reversed, r % 2 == 1);
            let mut expected = raster.sweep_positions.clone();
            if r % 2 == 1 {
                expected.reverse();
            }
            assert_eq!(row.sweep_positions, expected);
        }
    }

    #[test]
    fn test_secondary_main_axis_sweeps_secondary() {
        let raster = RasterTargets::generate(
            &axis([0.0, 1.0], 1.0),
            &axis([5.0, 6.0], 1.0),
            MainAxis::Secondary,
            Direction::Forward,
        );
        assert_eq!(raster.main_axis, MainAxis::Secondary);
        assert_eq!(raster.sweep_positions, vec![0.0, 1.0]);
        assert_eq!(raster.step_positions(), vec![5.0, 6.0]);
        assert_eq!(raster.rows[1].start(), 1.0);
        assert_eq!(raster.rows[1].end(), 0.0);
    }
}
