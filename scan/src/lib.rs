//! Scan orchestration for a motorized stage synchronized with a triggered
//! lock-in amplifier.
//!
//! A scan goes through these stages:
//!
//! 1. [`config`] validates the scan specification into a [`ScanMode`]
//! 2. [`range`] checks the edges against the stage travel limits
//! 3. [`geometry`] derives the acquisition grid, [`targets`] the positions
//! 4. [`calibration`] plans the two warm-up moves
//! 5. [`orchestrator`] runs the move/trigger/read loop, tracked by [`session`]
//! 6. [`reconstruct`] turns bursts into line samples or frames
//!
//! Samples can be followed live through [`stream`].

pub mod calibration;
pub mod config;
pub mod error;
pub mod geometry;
pub mod orchestrator;
pub mod range;
pub mod reconstruct;
pub mod session;
pub mod stream;
pub mod targets;

pub use calibration::CalibrationPlan;
pub use config::{ConfigError, ScanConfig, ScanKind, ScanMode, ScanSpec};
pub use error::{ScanError, ScanResult};
pub use geometry::DaqGeometry;
pub use orchestrator::{CancelToken, Orchestrator, ProgressHandle, ScanBuilder, ScanOutcome, Stage};
pub use range::{AxisRange, ClampToRange, EdgeRemediation, RangeError, RejectEdges};
pub use reconstruct::{DataGapError, Frame, LineSample, ScanData};
pub use session::{AcquisitionSession, SessionState};
pub use stream::ScanEvent;
