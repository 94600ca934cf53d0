//! Scan edge validation against axis travel limits.
//!
//! [`validate`] is a pure check. Correcting rejected edges is delegated to an
//! [`EdgeRemediation`] implementation, and [`validate_with_remediation`] runs
//! the check/correct cycle a bounded number of times.

use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::normalize_edges;

/// Travel limits of one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub fn new(min: f64, max: f64) -> Self {
        let [min, max] = normalize_edges([min, max]);
        Self { min, max }
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.min && x <= self.max
    }

    pub fn clamp(&self, x: f64) -> f64 {
        x.clamp(self.min, self.max)
    }
}

impl From<(f64, f64)> for AxisRange {
    fn from((min, max): (f64, f64)) -> Self {
        Self::new(min, max)
    }
}

impl fmt::Display for AxisRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Requested scan edges fall outside the travel range.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("scan edges [{}, {}] outside travel range {allowed}", .requested[0], .requested[1])]
pub struct RangeError {
    pub requested: [f64; 2],
    pub allowed: AxisRange,
}

/// Sort `edges` ascending and check both lie within `range`.
pub fn validate(edges: [f64; 2], range: &AxisRange) -> Result<[f64; 2], RangeError> {
    let edges = normalize_edges(edges);
    if range.contains(edges[0]) && range.contains(edges[1]) {
        Ok(edges)
    } else {
        Err(RangeError {
            requested: edges,
            allowed: *range,
        })
    }
}

/// Source of corrected edges after a [`RangeError`].
pub trait EdgeRemediation {
    /// Propose replacement edges, or `None` to give up.
    fn remediate(&mut self, error: &RangeError) -> Option<[f64; 2]>;
}

/// Clamps both edges to the travel range.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClampToRange;

impl EdgeRemediation for ClampToRange {
    fn remediate(&mut self, error: &RangeError) -> Option<[f64; 2]> {
        let clamped = [
            error.allowed.clamp(error.requested[0]),
            error.allowed.clamp(error.requested[1]),
        ];
        warn!(
            "Clamping scan edges [{}, {}] to [{}, {}]",
            error.requested[0], error.requested[1], clamped[0], clamped[1]
        );
        Some(clamped)
    }
}

/// Never supplies corrections; the range error reaches the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectEdges;

impl EdgeRemediation for RejectEdges {
    fn remediate(&mut self, _error: &RangeError) -> Option<[f64; 2]> {
        None
    }
}

/// Validate `edges`, asking `remediation` for corrections at most
/// `max_attempts` times. Returns the last range error if no valid edges result.
pub fn validate_with_remediation(
    edges: [f64; 2],
    range: &AxisRange,
    remediation: &mut dyn EdgeRemediation,
    max_attempts: usize,
) -> Result<[f64; 2], RangeError> {
    let mut error = match validate(edges, range) {
        Ok(edges) => return Ok(edges),
        Err(e) => e,
    };

    for attempt in 1..=max_attempts {
        let Some(corrected) = remediation.remediate(&error) else {
            break;
        };
        match validate(corrected, range) {
            Ok(edges) => {
                info!("Scan edges accepted after {attempt} remediation attempt(s)");
                return Ok(edges);
            }
            Err(e) => error = e,
        }
    }
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays a fixed list of corrections.
    struct Scripted(Vec<[f64; 2]>);

    impl EdgeRemediation for Scripted {
        fn remediate(&mut self, _error: &RangeError) -> Option<[f64; 2]> {
            if self.0.is_empty() {
                None
            } else {
                Some(self.0.remove(0))
            }
        }
    }

    #[test]
    fn test_validate_sorts_edges() {
        let range = AxisRange::new(0.0, 10.0);
        assert_eq!(validate([8.0, 2.0], &range), Ok([2.0, 8.0]));
    }

    #[test]
    fn test_validate_inclusive_limits() {
        let range = AxisRange::new(-5.0, 5.0);
        assert_eq!(validate([-5.0, 5.0], &range), Ok([-5.0, 5.0]));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let range = AxisRange::new(0.0, 10.0);
        let err = validate([12.0, 1.0], &range).unwrap_err();
        assert_eq!(err.requested, [1.0, 12.0]);
        assert_eq!(err.allowed, range);
    }

    #[test]
    fn test_clamp_remediation() {
        let range = AxisRange::new(0.0, 10.0);
        let edges = validate_with_remediation([-3.0, 4.0], &range, &mut ClampToRange, 3);
        assert_eq!(edges, Ok([0.0, 4.0]));
    }

    #[test]
    fn test_reject_remediation_surfaces_error() {
        let range = AxisRange::new(0.0, 10.0);
        let result = validate_with_remediation([-3.0, 4.0], &range, &mut RejectEdges, 3);
        assert!(result.is_err());
    }

    #[test]
    fn test_remediation_attempts_are_bounded() {
        let range = AxisRange::new(0.0, 10.0);
        let mut script = Scripted(vec![[-1.0, 2.0], [-2.0, 2.0], [1.0, 2.0]]);

        let err = validate_with_remediation([-3.0, 4.0], &range, &mut script, 2).unwrap_err();
        assert_eq!(err.requested, [-2.0, 2.0]);
        assert_eq!(script.0.len(), 1);
    }

    #[test]
    fn test_remediation_succeeds_on_later_attempt() {
        let range = AxisRange::new(0.0, 10.0);
        let mut script = Scripted(vec![[-1.0, 2.0], [1.0, 2.0]]);
        assert_eq!(
            validate_with_remediation([-3.0, 4.0], &range, &mut script, 5),
            Ok([1.0, 2.0])
        );
    }
}
