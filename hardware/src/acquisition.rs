//! Lock-in data acquisition abstraction.
//!
//! The acquisition module runs in hardware-triggered grid mode: every trigger
//! edge from the motion controller opens a window of `duration_s` seconds that
//! is sampled into `cols` columns, and successive triggers fill successive rows.
//! A [`Burst`] is whatever a single `read` call returns: for each subscribed
//! signal path, the value grids accumulated since the previous read.

use std::collections::HashMap;
use std::fmt;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::DeviceResult;

/// Signal edge the acquisition module triggers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerEdge {
    /// Rising edge.
    Positive,
    /// Falling edge.
    Negative,
}

impl fmt::Display for TriggerEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerEdge::Positive => write!(f, "positive"),
            TriggerEdge::Negative => write!(f, "negative"),
        }
    }
}

/// How the acquisition grid maps time samples onto columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridMode {
    /// Linear interpolation onto the column grid (continuous sweeps).
    Linear,
    /// Exact on-grid sampling (step-and-settle scans).
    ExactOnGrid,
}

impl fmt::Display for GridMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridMode::Linear => write!(f, "Linear"),
            GridMode::ExactOnGrid => write!(f, "Exact (on-grid)"),
        }
    }
}

/// Trigger source for the acquisition module. Scans always use the hardware
/// trigger line driven by the motion controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TriggerType {
    #[default]
    HardwareTrigger,
}

/// Grid-mode acquisition settings pushed to the module before a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaqSettings {
    /// Number of triggered rows in the acquisition grid
    pub rows: usize,
    /// Number of samples per row
    pub cols: usize,
    /// Length of each triggered window in seconds
    pub duration_s: f64,
    /// Minimum time between accepted triggers in seconds
    pub holdoff_s: f64,
    /// Edge of the trigger signal that opens a window
    pub trigger_edge: TriggerEdge,
    /// Column interpolation mode
    pub grid_mode: GridMode,
    /// Trigger source
    pub trigger_type: TriggerType,
    /// Node that carries the trigger signal, if any
    pub trigger_node: Option<String>,
}

/// Build the demodulator sample path for a signal component.
///
/// Produces paths like `/dev4910/demods/0/sample.R.avg`.
pub fn demod_sample_path(device_id: &str, demod_index: usize, signal: &str) -> String {
    format!("/{device_id}/demods/{demod_index}/sample.{signal}.avg")
}

/// One block of triggered data for a single signal path.
///
/// The value grid is row-major: row `i` holds the samples of the `i`-th trigger
/// window, columns are time-ordered within the window.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalBurst {
    pub value: Array2<f64>,
}

impl SignalBurst {
    pub fn new(value: Array2<f64>) -> Self {
        Self { value }
    }

    /// Number of trigger rows contained in this burst.
    pub fn rows(&self) -> usize {
        self.value.nrows()
    }

    /// Row `index`, if present.
    pub fn row(&self, index: usize) -> Option<ArrayView1<'_, f64>> {
        if index < self.value.nrows() {
            Some(self.value.row(index))
        } else {
            None
        }
    }
}

/// Data returned by a single acquisition read, keyed by signal path.
///
/// Keys are stored lower-cased, matching how the instrument reports node
/// paths regardless of how they were subscribed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Burst {
    signals: HashMap<String, Vec<SignalBurst>>,
}

impl Burst {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a signal block under `path`.
    pub fn push(&mut self, path: &str, burst: SignalBurst) {
        self.signals
            .entry(path.to_lowercase())
            .or_default()
            .push(burst);
    }

    /// Signal blocks recorded for `path` (case-insensitive). Empty if absent.
    pub fn get(&self, path: &str) -> &[SignalBurst] {
        self.signals
            .get(&path.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether the read returned no data at all.
    pub fn is_empty(&self) -> bool {
        self.signals.values().all(Vec::is_empty)
    }
}

/// Interface for a triggered data acquisition module (lock-in DAQ).
pub trait AcquisitionModule {
    /// Push grid/trigger settings to the instrument.
    fn configure(&mut self, settings: &DaqSettings) -> DeviceResult<()>;

    /// Subscribe to the given signal paths.
    fn subscribe(&mut self, signal_paths: &[String]) -> DeviceResult<()>;

    /// Arm the module; it starts accepting triggers.
    fn execute(&mut self) -> DeviceResult<()>;

    /// Read accumulated data. With `blocking`, waits for at least one new
    /// trigger window or fails with [`crate::DeviceError::Timeout`].
    fn read(&mut self, blocking: bool) -> DeviceResult<Burst>;

    /// Non-blocking: whether all configured rows have been acquired.
    fn finished(&mut self) -> DeviceResult<bool>;

    /// Non-blocking: fraction of configured rows acquired, in `[0, 1]`.
    fn progress(&mut self) -> DeviceResult<f64>;

    /// Stop acquiring and return to idle.
    fn stop(&mut self) -> DeviceResult<()>;
}

impl<T: AcquisitionModule + ?Sized> AcquisitionModule for Box<T> {
    fn configure(&mut self, settings: &DaqSettings) -> DeviceResult<()> {
        (**self).configure(settings)
    }

    fn subscribe(&mut self, signal_paths: &[String]) -> DeviceResult<()> {
        (**self).subscribe(signal_paths)
    }

    fn execute(&mut self) -> DeviceResult<()> {
        (**self).execute()
    }

    fn read(&mut self, blocking: bool) -> DeviceResult<Burst> {
        (**self).read(blocking)
    }

    fn finished(&mut self) -> DeviceResult<bool> {
        (**self).finished()
    }

    fn progress(&mut self) -> DeviceResult<f64> {
        (**self).progress()
    }

    fn stop(&mut self) -> DeviceResult<()> {
        (**self).stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_demod_sample_path() {
        assert_eq!(
            demod_sample_path("dev4910", 0, "R"),
            "/dev4910/demods/0/sample.R.avg"
        );
    }

    #[test]
    fn test_burst_lookup_is_case_insensitive() {
        let mut burst = Burst::new();
        burst.push(
            "/DEV4910/demods/0/sample.R.avg",
            SignalBurst::new(array![[1.0, 2.0]]),
        );

        assert_eq!(burst.get("/dev4910/demods/0/sample.r.avg").len(), 1);
        assert!(burst.get("/dev4910/demods/1/sample.r.avg").is_empty());
        assert!(!burst.is_empty());
    }

    #[test]
    fn test_signal_burst_row_bounds() {
        let sb = SignalBurst::new(array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(sb.rows(), 2);
        assert_eq!(sb.row(1).map(|r| r.to_vec()), Some(vec![3.0, 4.0]));
        assert!(sb.row(2).is_none());
    }

    #[test]
    fn test_grid_mode_display() {
        assert_eq!(GridMode::ExactOnGrid.to_string(), "Exact (on-grid)");
        assert_eq!(TriggerEdge::Negative.to_string(), "negative");
    }
}
