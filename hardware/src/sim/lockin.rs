use std::collections::HashSet;

use ndarray::Array2;
use tracing::debug;

use super::{TriggerEvent, TriggerLine};
use crate::acquisition::{AcquisitionModule, Burst, DaqSettings, GridMode, SignalBurst};
use crate::error::{DeviceError, DeviceResult};

/// Signal model: `(driving_position, aux_position) -> value`.
pub type SignalFn = Box<dyn Fn(f64, f64) -> f64 + Send>;

/// Simulated lock-in running in hardware-triggered grid mode.
///
/// Each blocking read returns the full grid acquired so far, one row per
/// trigger since [`AcquisitionModule::execute`]. Specific read calls can be
/// made to time out or to come back without data for fault-path testing.
pub struct SimulatedLockin {
    line: TriggerLine,
    signal: SignalFn,
    settings: Option<DaqSettings>,
    subscribed: Vec<String>,
    executing: bool,
    grid: Vec<Vec<f64>>,
    reads: usize,
    timeout_reads: HashSet<usize>,
    gap_reads: HashSet<usize>,
}

impl SimulatedLockin {
    pub fn new(line: TriggerLine, signal: SignalFn) -> Self {
        Self {
            line,
            signal,
            settings: None,
            subscribed: Vec::new(),
            executing: false,
            grid: Vec::new(),
            reads: 0,
            timeout_reads: HashSet::new(),
            gap_reads: HashSet::new(),
        }
    }

    /// Make the `n`-th read call (0-based) time out.
    pub fn with_timeout_on_read(mut self, n: usize) -> Self {
        self.timeout_reads.insert(n);
        self
    }

    /// Make the `n`-th read call (0-based) return an empty burst.
    pub fn with_gap_on_read(mut self, n: usize) -> Self {
        self.gap_reads.insert(n);
        self
    }

    /// Settings pushed by the last `configure` call.
    pub fn settings(&self) -> Option<&DaqSettings> {
        self.settings.as_ref()
    }

    /// Subscribed signal paths.
    pub fn subscribed(&self) -> &[String] {
        &self.subscribed
    }

    /// Number of read calls made so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Rows acquired since the module was armed.
    pub fn rows_acquired(&self) -> usize {
        self.grid.len()
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    fn event_row(&self, event: &TriggerEvent, settings: &DaqSettings) -> Vec<f64> {
        let cols = settings.cols.max(1);
        match settings.grid_mode {
            GridMode::ExactOnGrid => vec![(self.signal)(event.to, event.aux); cols],
            GridMode::Linear => (0..cols)
                .map(|j| {
                    let t = if cols == 1 {
                        1.0
                    } else {
                        j as f64 / (cols - 1) as f64
                    };
                    let pos = event.from + (event.to - event.from) * t;
                    (self.signal)(pos, event.aux)
                })
                .collect(),
        }
    }

    fn acquire_pending(&mut self) -> DeviceResult<usize> {
        let settings = self
            .settings
            .clone()
            .ok_or_else(|| DeviceError::InvalidArgument("lock-in not configured".to_string()))?;

        let mut acquired = 0;
        for event in self.line.drain() {
            if self.grid.len() >= settings.rows {
                debug!("Grid full, ignoring trigger at {:.6}", event.to);
                continue;
            }
            let row = self.event_row(&event, &settings);
            self.grid.push(row);
            acquired += 1;
        }
        Ok(acquired)
    }

    fn grid_array(&self) -> DeviceResult<Array2<f64>> {
        let cols = self.settings.as_ref().map(|s| s.cols.max(1)).unwrap_or(1);
        let flat: Vec<f64> = self.grid.iter().flatten().copied().collect();
        Array2::from_shape_vec((self.grid.len(), cols), flat)
            .map_err(|e| DeviceError::Communication(format!("malformed grid: {e}")))
    }
}

impl AcquisitionModule for SimulatedLockin {
    fn configure(&mut self, settings: &DaqSettings) -> DeviceResult<()> {
        if settings.rows == 0 || settings.cols == 0 {
            return Err(DeviceError::InvalidArgument(format!(
                "grid must be non-empty, got {}x{}",
                settings.rows, settings.cols
            )));
        }
        self.settings = Some(settings.clone());
        self.grid.clear();
        Ok(())
    }

    fn subscribe(&mut self, signal_paths: &[String]) -> DeviceResult<()> {
        if signal_paths.is_empty() {
            return Err(DeviceError::InvalidArgument(
                "at least one signal path must be subscribed".to_string(),
            ));
        }
        self.subscribed = signal_paths.to_vec();
        Ok(())
    }

    fn execute(&mut self) -> DeviceResult<()> {
        if self.settings.is_none() {
            return Err(DeviceError::InvalidArgument(
                "lock-in not configured".to_string(),
            ));
        }
        // Triggers fired before arming are never recorded.
        self.line.drain();
        self.grid.clear();
        self.executing = true;
        Ok(())
    }

    fn read(&mut self, blocking: bool) -> DeviceResult<Burst> {
        let call = self.reads;
        self.reads += 1;

        if !self.executing {
            return if blocking {
                Err(DeviceError::Timeout {
                    operation: "read on idle module".to_string(),
                    waited_ms: 0,
                })
            } else {
                Ok(Burst::new())
            };
        }

        if self.timeout_reads.contains(&call) {
            return Err(DeviceError::Timeout {
                operation: format!("read #{call}"),
                waited_ms: 0,
            });
        }

        let acquired = self.acquire_pending()?;
        if blocking && acquired == 0 {
            return Err(DeviceError::Timeout {
                operation: format!("read #{call}: no new trigger"),
                waited_ms: 0,
            });
        }

        let mut burst = Burst::new();
        if self.gap_reads.contains(&call) {
            return Ok(burst);
        }

        let grid = self.grid_array()?;
        for path in &self.subscribed {
            burst.push(path, SignalBurst::new(grid.clone()));
        }
        Ok(burst)
    }

    fn finished(&mut self) -> DeviceResult<bool> {
        Ok(self
            .settings
            .as_ref()
            .is_some_and(|s| self.grid.len() >= s.rows))
    }

    fn progress(&mut self) -> DeviceResult<f64> {
        Ok(match &self.settings {
            Some(s) if s.rows > 0 => (self.grid.len() as f64 / s.rows as f64).min(1.0),
            _ => 0.0,
        })
    }

    fn stop(&mut self) -> DeviceResult<()> {
        self.executing = false;
        Ok(())
    }
}
