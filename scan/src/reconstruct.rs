//! Burst demultiplexing and output assembly.
//!
//! Each read returns the grid acquired so far. The row for sample `index` sits
//! behind the discarded calibration rows (and, for continuous scans, the
//! lead-in row); in a continuous raster every sweep after the first is also
//! preceded by its step row. Lookups go through [`Reconstructor::burst_row`].

use hardware::Burst;
use ndarray::{Array2, ArrayView1};
use thiserror::Error;

use crate::config::MainAxis;
use crate::targets::linspace;

/// A burst arrived without the data expected for a sample.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataGapError {
    #[error("sample {index}: burst contains no data")]
    EmptyBurst { index: usize },

    #[error("sample {index}: signal path {path} missing from burst")]
    MissingPath { index: usize, path: String },

    #[error("sample {index}: row {row} of {path} not present in burst")]
    MissingRow {
        index: usize,
        row: usize,
        path: String,
    },
}

impl DataGapError {
    /// Sample index the gap belongs to.
    pub fn index(&self) -> usize {
        match self {
            DataGapError::EmptyBurst { index }
            | DataGapError::MissingPath { index, .. }
            | DataGapError::MissingRow { index, .. } => *index,
        }
    }
}

/// Row `row` of `path`, searching the most recent value block first.
pub fn extract_row<'a>(
    burst: &'a Burst,
    path: &str,
    row: usize,
    index: usize,
) -> Result<ArrayView1<'a, f64>, DataGapError> {
    if burst.is_empty() {
        return Err(DataGapError::EmptyBurst { index });
    }
    let blocks = burst.get(path);
    if blocks.is_empty() {
        return Err(DataGapError::MissingPath {
            index,
            path: path.to_string(),
        });
    }
    blocks
        .iter()
        .rev()
        .find_map(|block| block.row(row))
        .filter(|r| !r.is_empty())
        .ok_or_else(|| DataGapError::MissingRow {
            index,
            row,
            path: path.to_string(),
        })
}

/// Mean of row `row` of `path`.
pub fn extract_mean(
    burst: &Burst,
    path: &str,
    row: usize,
    index: usize,
) -> Result<f64, DataGapError> {
    let values = extract_row(burst, path, row, index)?;
    Ok(values.sum() / values.len() as f64)
}

/// Pair each sample of a sweep with its position, assuming constant velocity
/// from `start` to `end`.
pub fn resample_sweep(values: &[f64], start: f64, end: f64) -> Vec<(f64, f64)> {
    linspace(start, end, values.len())
        .into_iter()
        .zip(values.iter().copied())
        .collect()
}

/// Turns bursts into per-signal values for one sample index.
#[derive(Debug, Clone)]
pub struct Reconstructor {
    paths: Vec<String>,
    row_offset: usize,
    row_stride: usize,
}

impl Reconstructor {
    /// `row_offset` is the number of grid rows preceding sample 0,
    /// `row_stride` the number of grid rows each sample advances by.
    pub fn new(paths: Vec<String>, row_offset: usize, row_stride: usize) -> Self {
        Self {
            paths,
            row_offset,
            row_stride: row_stride.max(1),
        }
    }

    /// Grid row holding sample `index`.
    pub fn burst_row(&self, index: usize) -> usize {
        self.row_offset + index * self.row_stride
    }

    /// Mean of the sample's row, one value per subscribed signal.
    pub fn pixel(&self, burst: &Burst, index: usize) -> Result<Vec<f64>, DataGapError> {
        let row = self.burst_row(index);
        self.paths
            .iter()
            .map(|path| extract_mean(burst, path, row, index))
            .collect()
    }

    /// Full time-ordered row of the sample, one per subscribed signal.
    pub fn sweep(&self, burst: &Burst, index: usize) -> Result<Vec<Vec<f64>>, DataGapError> {
        let row = self.burst_row(index);
        self.paths
            .iter()
            .map(|path| extract_row(burst, path, row, index).map(|r| r.to_vec()))
            .collect()
    }
}

/// One point of a line profile: position plus one value per signal.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSample {
    pub position: f64,
    pub values: Vec<f64>,
}

/// 2-D image of one signal, rows in spatial order.
///
/// Rows follow the stepped axis, columns follow the sweep axis in the order
/// of `column_positions`. Pixels never filled (data gaps, aborted scans) are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub signal: String,
    pub values: Array2<f64>,
    pub row_positions: Vec<f64>,
    pub column_positions: Vec<f64>,
    /// Axis swept along each row
    pub main_axis: MainAxis,
    /// Rows that were traversed in reverse and flipped on insertion
    pub reversed_rows: Vec<usize>,
}

impl Frame {
    pub fn new(
        signal: impl Into<String>,
        row_positions: Vec<f64>,
        column_positions: Vec<f64>,
        main_axis: MainAxis,
    ) -> Self {
        let shape = (row_positions.len(), column_positions.len());
        Self {
            signal: signal.into(),
            values: Array2::from_elem(shape, f64::NAN),
            row_positions,
            column_positions,
            main_axis,
            reversed_rows: Vec::new(),
        }
    }

    fn column(&self, temporal: usize, reversed: bool) -> usize {
        if reversed {
            self.values.ncols() - 1 - temporal
        } else {
            temporal
        }
    }

    /// Record the traversal direction of `row`.
    pub fn record_traversal(&mut self, row: usize, reversed: bool) {
        if reversed && !self.reversed_rows.contains(&row) {
            self.reversed_rows.push(row);
        }
    }

    /// Store the `temporal`-th pixel acquired along `row`.
    pub fn set_pixel(&mut self, row: usize, temporal: usize, reversed: bool, value: f64) {
        if row >= self.values.nrows() || temporal >= self.values.ncols() {
            return;
        }
        let col = self.column(temporal, reversed);
        self.values[[row, col]] = value;
        self.record_traversal(row, reversed);
    }

    /// Store a whole row given in acquisition order.
    pub fn insert_row(&mut self, row: usize, temporal: &[f64], reversed: bool) {
        let n = temporal.len().min(self.values.ncols());
        for (t, &value) in temporal.iter().take(n).enumerate() {
            self.set_pixel(row, t, reversed, value);
        }
        self.record_traversal(row, reversed);
    }

    /// Whether only odd rows were flipped.
    pub fn rows_in_spatial_order(&self) -> bool {
        self.reversed_rows.iter().all(|r| r % 2 == 1)
    }
}

/// Reconstructed scan output.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanData {
    Line(Vec<LineSample>),
    /// One frame per subscribed signal
    Raster(Vec<Frame>),
}

impl ScanData {
    /// Number of populated points.
    pub fn len(&self) -> usize {
        match self {
            ScanData::Line(samples) => samples.len(),
            ScanData::Raster(frames) => frames
                .first()
                .map_or(0, |f| f.values.iter().filter(|v| !v.is_nan()).count()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use hardware::SignalBurst;
    use ndarray::array;

    const PATH: &str = "/dev4910/demods/0/sample.R.avg";

    fn burst(grid: Array2<f64>) -> Burst {
        let mut burst = Burst::new();
        burst.push(PATH, SignalBurst::new(grid));
        burst
    }

    #[test]
    fn test_pixel_skips_calibration_rows() {
        let b = burst(array![[9.0, 9.0], [9.0, 9.0], [1.0, 3.0], [4.0, 6.0]]);
        let r = Reconstructor::new(vec![PATH.to_string()], 2, 1);
        assert_eq!(r.burst_row(0), 2);
        assert_abs_diff_eq!(r.pixel(&b, 0).unwrap()[0], 2.0);
        assert_abs_diff_eq!(r.pixel(&b, 1).unwrap()[0], 5.0);
    }

    #[test]
    fn test_missing_row_is_gap() {
        let b = burst(array![[1.0], [2.0]]);
        let r = Reconstructor::new(vec![PATH.to_string()], 2, 1);
        assert_eq!(
            r.pixel(&b, 0),
            Err(DataGapError::MissingRow {
                index: 0,
                row: 2,
                path: PATH.to_string()
            })
        );
    }

    #[test]
    fn test_missing_path_and_empty_burst() {
        let b = burst(array![[1.0], [2.0], [3.0]]);
        let r = Reconstructor::new(vec!["/dev4910/demods/0/sample.X.avg".to_string()], 2, 1);
        assert!(matches!(r.pixel(&b, 0), Err(DataGapError::MissingPath { .. })));

        let err = r.pixel(&Burst::new(), 4).unwrap_err();
        assert_eq!(err, DataGapError::EmptyBurst { index: 4 });
        assert_eq!(err.index(), 4);
    }

    #[test]
    fn test_latest_block_wins() {
        let mut b = burst(array![[0.0], [0.0]]);
        b.push(PATH, SignalBurst::new(array![[0.0], [0.0], [7.0]]));
        assert_abs_diff_eq!(extract_mean(&b, PATH, 2, 0).unwrap(), 7.0);
        assert_abs_diff_eq!(extract_mean(&b, PATH, 1, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_sweep_returns_full_row() {
        let b = burst(array![
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            [1.0, 2.0, 3.0]
        ]);
        let r = Reconstructor::new(vec![PATH.to_string()], 3, 1);
        assert_eq!(r.sweep(&b, 0).unwrap(), vec![vec![1.0, 2.0, 3.0]]);
    }

    #[test]
    fn test_strided_rows_skip_step_triggers() {
        let b = burst(array![
            [0.0, 0.0],
            [0.0, 0.0],
            [0.0, 0.0],
            [1.0, 1.0],
            [9.0, 9.0],
            [2.0, 2.0]
        ]);
        let r = Reconstructor::new(vec![PATH.to_string()], 3, 2);
        assert_eq!(r.burst_row(1), 5);
        assert_eq!(r.sweep(&b, 1).unwrap(), vec![vec![2.0, 2.0]]);
        assert!(r.sweep(&b, 2).is_err());
    }

    #[test]
    fn test_resample_sweep() {
        let pairs = resample_sweep(&[10.0, 20.0, 30.0], 1.0, 0.0);
        assert_eq!(pairs, vec![(1.0, 10.0), (0.5, 20.0), (0.0, 30.0)]);
    }

    #[test]
    fn test_frame_flips_odd_rows() {
        let mut frame = Frame::new(PATH, vec![0.0, 1.0], vec![0.0, 0.5, 1.0], MainAxis::Primary);
        frame.insert_row(0, &[1.0, 2.0, 3.0], false);
        frame.insert_row(1, &[6.0, 5.0, 4.0], true);

        assert_eq!(frame.values, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(frame.reversed_rows, vec![1]);
        assert!(frame.rows_in_spatial_order());
    }

    #[test]
    fn test_frame_pixels_and_gaps() {
        let mut frame = Frame::new(PATH, vec![0.0, 1.0], vec![0.0, 1.0], MainAxis::Primary);
        frame.set_pixel(1, 0, true, 8.0);
        assert_eq!(frame.values[[1, 1]], 8.0);
        assert!(frame.values[[0, 0]].is_nan());
        assert_eq!(ScanData::Raster(vec![frame]).len(), 1);
    }
}
