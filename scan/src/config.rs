//! Scan configuration.
//!
//! A [`ScanConfig`] is loaded from a JSON document with four sections:
//!
//! ```json
//! {
//!   "scan":  { "type": "discrete", "dimension": 1, "edges": [0, 1], "stepsize": 0.1,
//!              "velocity": 1, "acceleration": 1, "sampling_rate": 100 },
//!   "daq":   { "device_id": "dev4910", "demod_index": 0, "signals": ["R", "Theta"] },
//!   "stage": { "reference_modes": ["FNL", "FNL"] },
//!   "run":   { "read_retries": 1, "event_buffer": 1024 }
//! }
//! ```
//!
//! Only `scan` is required. [`ScanSpec::mode`] validates the specification and
//! turns the flat document into the [`ScanMode`] tagged union the rest of the
//! crate works with.

use std::path::Path;

use hardware::{demod_sample_path, ReferenceMode, TriggerOutput};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on target points per axis, on raster cells, and on the columns
/// of a discrete settle window.
pub const MAX_POINTS: usize = 1_000_000;

/// Error in a scan specification or configuration file.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{axis} axis: stepsize must be positive, got {stepsize}")]
    NonPositiveStepsize { axis: &'static str, stepsize: f64 },

    #[error("{axis} axis: scan edges have zero length (both at {edge})")]
    ZeroLengthEdges { axis: &'static str, edge: f64 },

    #[error("{axis} axis: stepsize {stepsize} exceeds scan span {span}")]
    StepExceedsSpan {
        axis: &'static str,
        stepsize: f64,
        span: f64,
    },

    #[error("{axis}: {count} points exceed the limit of {max}")]
    TooManyPoints {
        axis: &'static str,
        count: usize,
        max: usize,
    },

    #[error("{field} must be a finite positive number, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} must be finite")]
    NonFinite { field: &'static str },

    #[error("unsupported scan dimension {0}, expected 1 or 2")]
    UnsupportedDimension(u8),

    #[error("2-D scan requires a secondary axis section")]
    MissingSecondaryAxis,

    #[error("{dimension}-D scan cannot run on a {axes}-axis stage")]
    StageMismatch { dimension: u8, axes: u8 },

    #[error("scan has no acquisition module")]
    MissingAcquisition,

    #[error("at least one signal must be subscribed")]
    NoSignals,

    #[error("failed to read config file: {0}")]
    Io(String),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Scan timing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    /// Single sweep per row at constant velocity
    #[serde(alias = "continous")]
    Continuous,
    /// Step-and-settle at every target
    Discrete,
}

/// Traversal direction of the primary axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    #[serde(alias = "FRWD")]
    Forward,
    #[serde(alias = "BCWD")]
    Backward,
}

/// Which axis of a raster defines the sweep (and the burst duration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MainAxis {
    #[default]
    #[serde(alias = "master")]
    Primary,
    #[serde(alias = "servo")]
    Secondary,
}

/// Secondary (servo) axis parameters of a 2-D scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryAxisSpec {
    #[serde(alias = "scan_edges")]
    pub edges: [f64; 2],
    pub stepsize: f64,
    /// Defaults to the primary velocity when absent
    #[serde(default)]
    pub velocity: Option<f64>,
}

fn default_dimension() -> u8 {
    1
}

/// Physical scan parameters, as supplied by configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSpec {
    #[serde(rename = "type")]
    pub kind: ScanKind,
    #[serde(default = "default_dimension")]
    pub dimension: u8,
    #[serde(default)]
    pub direction: Direction,
    /// Primary axis edges, unordered
    #[serde(alias = "scan_edges")]
    pub edges: [f64; 2],
    pub stepsize: f64,
    pub velocity: f64,
    pub acceleration: f64,
    /// Demodulator sampling rate in Hz
    #[serde(alias = "sampling_frequency", alias = "sampling_freq")]
    pub sampling_rate: f64,
    #[serde(default)]
    pub secondary: Option<SecondaryAxisSpec>,
    #[serde(default)]
    pub main_axis: MainAxis,
}

/// Validated parameters for one axis: ordered edges and a positive step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisScan {
    /// Edges with `edges[0] < edges[1]`
    pub edges: [f64; 2],
    pub stepsize: f64,
    pub velocity: f64,
}

impl AxisScan {
    fn validate(
        axis: &'static str,
        edges: [f64; 2],
        stepsize: f64,
        velocity: f64,
    ) -> Result<Self, ConfigError> {
        if !edges[0].is_finite() || !edges[1].is_finite() {
            return Err(ConfigError::NonFinite { field: "edges" });
        }
        if !(stepsize.is_finite() && stepsize > 0.0) {
            return Err(ConfigError::NonPositiveStepsize { axis, stepsize });
        }
        positive("velocity", velocity)?;

        let edges = normalize_edges(edges);
        let span = edges[1] - edges[0];
        if span == 0.0 {
            return Err(ConfigError::ZeroLengthEdges {
                axis,
                edge: edges[0],
            });
        }
        if stepsize > span {
            return Err(ConfigError::StepExceedsSpan {
                axis,
                stepsize,
                span,
            });
        }
        within_cap(axis, crate::geometry::point_count(span, stepsize))?;

        Ok(Self {
            edges,
            stepsize,
            velocity,
        })
    }

    /// Scan length `|edges[1] - edges[0]|`.
    pub fn delta(&self) -> f64 {
        (self.edges[1] - self.edges[0]).abs()
    }

    /// Number of target points along this axis.
    pub fn point_count(&self) -> usize {
        crate::geometry::point_count(self.delta(), self.stepsize)
    }

    /// Same axis with replacement edges (e.g. after range remediation),
    /// re-checked against the stepsize.
    pub fn with_edges(self, axis: &'static str, edges: [f64; 2]) -> Result<Self, ConfigError> {
        Self::validate(axis, edges, self.stepsize, self.velocity)
    }
}

/// Sort a pair of edges ascending.
pub fn normalize_edges(edges: [f64; 2]) -> [f64; 2] {
    if edges[0] <= edges[1] {
        edges
    } else {
        [edges[1], edges[0]]
    }
}

fn within_cap(axis: &'static str, count: usize) -> Result<usize, ConfigError> {
    if count > MAX_POINTS {
        Err(ConfigError::TooManyPoints {
            axis,
            count,
            max: MAX_POINTS,
        })
    } else {
        Ok(count)
    }
}

fn positive(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

/// Scan geometry as a tagged union of dimension and timing mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanMode {
    /// 1-D line profile along the primary axis
    Line {
        kind: ScanKind,
        direction: Direction,
        axis: AxisScan,
        acceleration: f64,
        sampling_rate: f64,
    },
    /// 2-D serpentine raster over both axes
    Raster {
        kind: ScanKind,
        direction: Direction,
        primary: AxisScan,
        secondary: AxisScan,
        main_axis: MainAxis,
        acceleration: f64,
        sampling_rate: f64,
    },
}

impl ScanMode {
    pub fn kind(&self) -> ScanKind {
        match self {
            ScanMode::Line { kind, .. } | ScanMode::Raster { kind, .. } => *kind,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            ScanMode::Line { direction, .. } | ScanMode::Raster { direction, .. } => *direction,
        }
    }

    pub fn acceleration(&self) -> f64 {
        match self {
            ScanMode::Line { acceleration, .. } | ScanMode::Raster { acceleration, .. } => {
                *acceleration
            }
        }
    }

    pub fn sampling_rate(&self) -> f64 {
        match self {
            ScanMode::Line { sampling_rate, .. } | ScanMode::Raster { sampling_rate, .. } => {
                *sampling_rate
            }
        }
    }

    pub fn primary(&self) -> &AxisScan {
        match self {
            ScanMode::Line { axis, .. } => axis,
            ScanMode::Raster { primary, .. } => primary,
        }
    }

    pub fn secondary(&self) -> Option<&AxisScan> {
        match self {
            ScanMode::Line { .. } => None,
            ScanMode::Raster { secondary, .. } => Some(secondary),
        }
    }

    pub fn is_raster(&self) -> bool {
        matches!(self, ScanMode::Raster { .. })
    }

    /// The axis whose motion defines each row (the swept/inner axis).
    pub fn sweep_axis(&self) -> &AxisScan {
        match self {
            ScanMode::Line { axis, .. } => axis,
            ScanMode::Raster {
                primary,
                secondary,
                main_axis,
                ..
            } => match main_axis {
                MainAxis::Primary => primary,
                MainAxis::Secondary => secondary,
            },
        }
    }

    /// The axis stepped between rows of a raster.
    pub fn step_axis(&self) -> Option<&AxisScan> {
        match self {
            ScanMode::Line { .. } => None,
            ScanMode::Raster {
                primary,
                secondary,
                main_axis,
                ..
            } => Some(match main_axis {
                MainAxis::Primary => secondary,
                MainAxis::Secondary => primary,
            }),
        }
    }

    pub fn main_axis(&self) -> MainAxis {
        match self {
            ScanMode::Line { .. } => MainAxis::Primary,
            ScanMode::Raster { main_axis, .. } => *main_axis,
        }
    }

    /// Same mode with replacement edges for the primary and secondary axes.
    pub fn with_edges(
        self,
        primary_edges: [f64; 2],
        secondary_edges: Option<[f64; 2]>,
    ) -> Result<Self, ConfigError> {
        Ok(match self {
            ScanMode::Line {
                kind,
                direction,
                axis,
                acceleration,
                sampling_rate,
            } => ScanMode::Line {
                kind,
                direction,
                axis: axis.with_edges("primary", primary_edges)?,
                acceleration,
                sampling_rate,
            },
            ScanMode::Raster {
                kind,
                direction,
                primary,
                secondary,
                main_axis,
                acceleration,
                sampling_rate,
            } => ScanMode::Raster {
                kind,
                direction,
                primary: primary.with_edges("primary", primary_edges)?,
                secondary: match secondary_edges {
                    Some(edges) => secondary.with_edges("secondary", edges)?,
                    None => secondary,
                },
                main_axis,
                acceleration,
                sampling_rate,
            },
        })
    }
}

impl ScanSpec {
    /// Validate the specification and derive its [`ScanMode`].
    pub fn mode(&self) -> Result<ScanMode, ConfigError> {
        let acceleration = positive("acceleration", self.acceleration)?;
        let sampling_rate = positive("sampling_rate", self.sampling_rate)?;
        let primary = AxisScan::validate("primary", self.edges, self.stepsize, self.velocity)?;
        if self.kind == ScanKind::Discrete {
            within_cap(
                "discrete sample window",
                crate::geometry::discrete_cols(sampling_rate),
            )?;
        }

        match self.dimension {
            1 => Ok(ScanMode::Line {
                kind: self.kind,
                direction: self.direction,
                axis: primary,
                acceleration,
                sampling_rate,
            }),
            2 => {
                let sec = self
                    .secondary
                    .as_ref()
                    .ok_or(ConfigError::MissingSecondaryAxis)?;
                let secondary = AxisScan::validate(
                    "secondary",
                    sec.edges,
                    sec.stepsize,
                    sec.velocity.unwrap_or(self.velocity),
                )?;
                within_cap(
                    "raster",
                    primary.point_count().saturating_mul(secondary.point_count()),
                )?;
                Ok(ScanMode::Raster {
                    kind: self.kind,
                    direction: self.direction,
                    primary,
                    secondary,
                    main_axis: self.main_axis,
                    acceleration,
                    sampling_rate,
                })
            }
            other => Err(ConfigError::UnsupportedDimension(other)),
        }
    }
}

/// Lock-in acquisition settings that are not derived from the scan geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaqConfig {
    pub device_id: String,
    /// Demodulator that receives the trigger
    pub demod_index: usize,
    /// Sample components to subscribe, e.g. `R`, `Theta`, `X`
    pub signals: Vec<String>,
    /// Node carrying the trigger signal, if the instrument needs it spelled out
    pub trigger_node: Option<String>,
}

impl Default for DaqConfig {
    fn default() -> Self {
        Self {
            device_id: "dev4910".to_string(),
            demod_index: 0,
            signals: vec!["R".to_string(), "Theta".to_string()],
            trigger_node: None,
        }
    }
}

impl DaqConfig {
    /// Full node paths of all subscribed signals, in subscription order.
    pub fn signal_paths(&self) -> Vec<String> {
        self.signals
            .iter()
            .map(|s| demod_sample_path(&self.device_id, self.demod_index, s))
            .collect()
    }
}

/// Motion stage setup. Index 0 is the primary axis, 1 the secondary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub reference_modes: [ReferenceMode; 2],
    pub trigger_outputs: [TriggerOutput; 2],
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            reference_modes: [ReferenceMode::NegativeLimit; 2],
            trigger_outputs: [TriggerOutput::InMotion; 2],
        }
    }
}

/// How out-of-range scan edges are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemediationPolicy {
    /// Surface the range error to the caller
    #[default]
    Reject,
    /// Clamp the edges to the axis travel range
    Clamp,
}

/// Execution policy for the acquisition loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Retries after a timed-out read, per target (capped at 1)
    pub read_retries: u8,
    /// Capacity of the live event channel
    pub event_buffer: usize,
    pub remediation: RemediationPolicy,
    /// Upper bound on remediation rounds before giving up
    pub max_remediation_attempts: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            read_retries: 1,
            event_buffer: 1024,
            remediation: RemediationPolicy::Reject,
            max_remediation_attempts: 3,
        }
    }
}

/// Complete scan configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub scan: ScanSpec,
    #[serde(default)]
    pub daq: DaqConfig,
    #[serde(default)]
    pub stage: StageConfig,
    #[serde(default)]
    pub run: RunConfig,
}

impl ScanConfig {
    /// Load and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&contents)
    }

    /// Parse and validate a JSON configuration string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section; returns the derived scan mode.
    pub fn validate(&self) -> Result<ScanMode, ConfigError> {
        if self.daq.signals.is_empty() {
            return Err(ConfigError::NoSignals);
        }
        self.scan.mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::Write;

    fn line_spec() -> ScanSpec {
        ScanSpec {
            kind: ScanKind::Discrete,
            dimension: 1,
            direction: Direction::Forward,
            edges: [1.0, 0.0],
            stepsize: 0.1,
            velocity: 1.0,
            acceleration: 1.0,
            sampling_rate: 100.0,
            secondary: None,
            main_axis: MainAxis::Primary,
        }
    }

    #[test]
    fn test_mode_normalizes_edges() {
        let mode = line_spec().mode().unwrap();
        assert_eq!(mode.primary().edges, [0.0, 1.0]);
        assert!(!mode.is_raster());
        assert_eq!(mode.primary().point_count(), 11);
    }

    #[test]
    fn test_non_positive_stepsize_rejected() {
        let mut spec = line_spec();
        spec.stepsize = 0.0;
        assert!(matches!(
            spec.mode(),
            Err(ConfigError::NonPositiveStepsize { .. })
        ));
        spec.stepsize = -0.5;
        assert!(matches!(
            spec.mode(),
            Err(ConfigError::NonPositiveStepsize { .. })
        ));
    }

    #[test]
    fn test_zero_length_edges_rejected() {
        let mut spec = line_spec();
        spec.edges = [2.0, 2.0];
        assert_eq!(
            spec.mode(),
            Err(ConfigError::ZeroLengthEdges {
                axis: "primary",
                edge: 2.0
            })
        );
    }

    #[test]
    fn test_raster_requires_secondary() {
        let mut spec = line_spec();
        spec.dimension = 2;
        assert_eq!(spec.mode(), Err(ConfigError::MissingSecondaryAxis));

        spec.secondary = Some(SecondaryAxisSpec {
            edges: [0.0, 1.0],
            stepsize: 1.0,
            velocity: None,
        });
        let mode = spec.mode().unwrap();
        assert_abs_diff_eq!(mode.secondary().unwrap().velocity, 1.0);
        assert_eq!(mode.step_axis().unwrap().point_count(), 2);
    }

    #[test]
    fn test_tiny_stepsize_rejected() {
        let mut spec = line_spec();
        spec.edges = [0.0, 20.0];
        spec.stepsize = 1e-18;
        assert_eq!(
            spec.mode(),
            Err(ConfigError::TooManyPoints {
                axis: "primary",
                count: usize::MAX,
                max: MAX_POINTS
            })
        );

        spec.stepsize = 1e-9;
        assert!(matches!(
            spec.mode(),
            Err(ConfigError::TooManyPoints { axis: "primary", .. })
        ));
    }

    #[test]
    fn test_point_cap_is_inclusive() {
        let mut spec = line_spec();
        spec.edges = [0.0, (MAX_POINTS - 1) as f64];
        spec.stepsize = 1.0;
        assert_eq!(spec.mode().unwrap().primary().point_count(), MAX_POINTS);
    }

    #[test]
    fn test_raster_cell_count_capped() {
        let mut spec = line_spec();
        spec.dimension = 2;
        spec.edges = [0.0, 2000.0];
        spec.stepsize = 1.0;
        spec.secondary = Some(SecondaryAxisSpec {
            edges: [0.0, 1000.0],
            stepsize: 1.0,
            velocity: None,
        });
        assert_eq!(
            spec.mode(),
            Err(ConfigError::TooManyPoints {
                axis: "raster",
                count: 2001 * 1001,
                max: MAX_POINTS
            })
        );
    }

    #[test]
    fn test_discrete_window_capped() {
        let mut spec = line_spec();
        spec.sampling_rate = 1e300;
        assert!(matches!(
            spec.mode(),
            Err(ConfigError::TooManyPoints {
                axis: "discrete sample window",
                ..
            })
        ));

        spec.kind = ScanKind::Continuous;
        assert!(spec.mode().is_ok());
    }

    #[test]
    fn test_unsupported_dimension() {
        let mut spec = line_spec();
        spec.dimension = 3;
        assert_eq!(spec.mode(), Err(ConfigError::UnsupportedDimension(3)));
    }

    #[test]
    fn test_main_axis_selects_sweep() {
        let mut spec = line_spec();
        spec.dimension = 2;
        spec.main_axis = MainAxis::Secondary;
        spec.secondary = Some(SecondaryAxisSpec {
            edges: [0.0, 4.0],
            stepsize: 2.0,
            velocity: Some(3.0),
        });
        let mode = spec.mode().unwrap();
        assert_eq!(mode.sweep_axis().edges, [0.0, 4.0]);
        assert_eq!(mode.step_axis().unwrap().edges, [0.0, 1.0]);
    }

    #[test]
    fn test_parse_legacy_field_names() {
        let json = r#"{
            "scan": {
                "type": "continous",
                "scan_edges": [0, 10],
                "stepsize": 1,
                "velocity": 2,
                "acceleration": 1,
                "sampling_frequency": 1000,
                "direction": "BCWD"
            },
            "stage": { "reference_modes": ["FNL", "FPL"], "trigger_outputs": ["InMotion", "LineTrigger"] }
        }"#;
        let config = ScanConfig::from_json_str(json).unwrap();
        assert_eq!(config.scan.kind, ScanKind::Continuous);
        assert_eq!(config.scan.direction, Direction::Backward);
        assert_eq!(config.stage.reference_modes[1], ReferenceMode::PositiveLimit);
        assert_eq!(config.daq, DaqConfig::default());
        assert_eq!(config.run.read_retries, 1);
    }

    #[test]
    fn test_signal_paths() {
        let daq = DaqConfig::default();
        assert_eq!(
            daq.signal_paths(),
            vec![
                "/dev4910/demods/0/sample.R.avg".to_string(),
                "/dev4910/demods/0/sample.Theta.avg".to_string()
            ]
        );
    }

    #[test]
    fn test_empty_signals_rejected() {
        let json = r#"{
            "scan": { "type": "discrete", "edges": [0, 1], "stepsize": 0.5,
                      "velocity": 1, "acceleration": 1, "sampling_rate": 100 },
            "daq": { "signals": [] }
        }"#;
        assert_eq!(ScanConfig::from_json_str(json), Err(ConfigError::NoSignals));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "scan": {{ "type": "discrete", "edges": [0, 1], "stepsize": 0.25,
                 "velocity": 1, "acceleration": 1, "sampling_rate": 100 }} }}"#
        )
        .unwrap();

        let config = ScanConfig::load(file.path()).unwrap();
        assert_eq!(config.scan.dimension, 1);
        assert_eq!(config.scan.mode().unwrap().primary().point_count(), 5);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ScanConfig::load(Path::new("/nonexistent/scan.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
