//! Acquisition session state machine.
//!
//! ```text
//! Idle -> Armed -> Calibrating -> Scanning -> Finished
//!   \________\___________\____________\-----> Cancelled | Failed
//! ```
//!
//! The session also owns the sample index counter, which only starts once
//! both calibration bursts have been discarded.

use std::fmt;

use tracing::info;

use crate::calibration::CALIBRATION_READS;
use crate::error::{ScanError, ScanResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Armed,
    Calibrating,
    Scanning,
    Finished,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Finished | SessionState::Cancelled | SessionState::Failed
        )
    }

    /// Whether the state machine allows `self -> next`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, Armed) | (Armed, Calibrating) | (Calibrating, Scanning) | (Scanning, Finished) => {
                true
            }
            (from, Cancelled | Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Armed => "armed",
            SessionState::Calibrating => "calibrating",
            SessionState::Scanning => "scanning",
            SessionState::Finished => "finished",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Mutable per-scan state.
#[derive(Debug)]
pub struct AcquisitionSession {
    state: SessionState,
    discarded: usize,
    next_index: usize,
}

impl Default for AcquisitionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AcquisitionSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            discarded: 0,
            next_index: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Calibration bursts discarded so far.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Samples counted so far.
    pub fn samples(&self) -> usize {
        self.next_index
    }

    pub fn transition(&mut self, next: SessionState) -> ScanResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ScanError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        if next == SessionState::Scanning && self.discarded < CALIBRATION_READS {
            return Err(ScanError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        info!("Scan session {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Record a discarded calibration burst.
    pub fn discard_calibration_burst(&mut self) -> ScanResult<()> {
        if self.state != SessionState::Calibrating || self.discarded >= CALIBRATION_READS {
            return Err(ScanError::InvalidTransition {
                from: self.state,
                to: SessionState::Calibrating,
            });
        }
        self.discarded += 1;
        Ok(())
    }

    /// Claim the next sample index.
    pub fn next_index(&mut self) -> ScanResult<usize> {
        if self.state != SessionState::Scanning {
            return Err(ScanError::InvalidTransition {
                from: self.state,
                to: SessionState::Scanning,
            });
        }
        let index = self.next_index;
        self.next_index += 1;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibrated() -> AcquisitionSession {
        let mut session = AcquisitionSession::new();
        session.transition(SessionState::Armed).unwrap();
        session.transition(SessionState::Calibrating).unwrap();
        session.discard_calibration_burst().unwrap();
        session.discard_calibration_burst().unwrap();
        session
    }

    #[test]
    fn test_happy_path() {
        let mut session = calibrated();
        session.transition(SessionState::Scanning).unwrap();
        assert_eq!(session.next_index().unwrap(), 0);
        assert_eq!(session.next_index().unwrap(), 1);
        session.transition(SessionState::Finished).unwrap();
        assert_eq!(session.samples(), 2);
        assert!(session.state().is_terminal());
    }

    #[test]
    fn test_scanning_requires_both_discards() {
        let mut session = AcquisitionSession::new();
        session.transition(SessionState::Armed).unwrap();
        session.transition(SessionState::Calibrating).unwrap();
        session.discard_calibration_burst().unwrap();
        assert!(matches!(
            session.transition(SessionState::Scanning),
            Err(ScanError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_no_third_discard() {
        let mut session = calibrated();
        assert!(session.discard_calibration_burst().is_err());
        assert_eq!(session.discarded(), 2);
    }

    #[test]
    fn test_index_only_while_scanning() {
        let mut session = calibrated();
        assert!(session.next_index().is_err());
    }

    #[test]
    fn test_skipping_states_rejected() {
        let mut session = AcquisitionSession::new();
        assert_eq!(
            session.transition(SessionState::Scanning),
            Err(ScanError::InvalidTransition {
                from: SessionState::Idle,
                to: SessionState::Scanning
            })
        );
    }

    #[test]
    fn test_abort_from_any_live_state() {
        let mut session = AcquisitionSession::new();
        session.transition(SessionState::Armed).unwrap();
        session.transition(SessionState::Cancelled).unwrap();
        assert!(session.transition(SessionState::Failed).is_err());
    }
}
