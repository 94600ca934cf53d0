//! Motion axis abstraction.
//!
//! A scan only needs a handful of operations from a positioning stage: homing
//! against a limit switch, blocking absolute moves, travel-range queries, the
//! motion profile (velocity/acceleration), and the hardware trigger output that
//! fires the lock-in acquisition. Concrete controllers (PI C-663 over GCS, or the
//! simulated axis in [`crate::sim`]) implement [`MotionAxis`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DeviceResult;

/// Reference (homing) move used to establish the axis origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceMode {
    /// Drive to the negative limit switch (GCS `FNL`).
    #[serde(alias = "FNL")]
    NegativeLimit,
    /// Drive to the positive limit switch (GCS `FPL`).
    #[serde(alias = "FPL")]
    PositiveLimit,
}

impl ReferenceMode {
    /// GCS command mnemonic for this reference move.
    pub fn command(&self) -> &'static str {
        match self {
            ReferenceMode::NegativeLimit => "FNL",
            ReferenceMode::PositiveLimit => "FPL",
        }
    }
}

impl fmt::Display for ReferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command())
    }
}

/// Digital trigger output emitted by the motion controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerOutput {
    /// One pulse per line (trigger type 1).
    LineTrigger,
    /// Output held high while the axis is in motion (trigger type 6).
    InMotion,
}

impl TriggerOutput {
    /// Controller trigger-type code (`CTO <line> 3 <code>`).
    pub fn code(&self) -> u8 {
        match self {
            TriggerOutput::LineTrigger => 1,
            TriggerOutput::InMotion => 6,
        }
    }
}

/// Interface for a single motorized positioning axis.
///
/// All motion calls block until the axis reports on-target. Implementations
/// are owned exclusively by one scan at a time, hence `&mut self` everywhere.
pub trait MotionAxis {
    /// Open the connection and start up the axis.
    fn connect(&mut self) -> DeviceResult<()>;

    /// Run a reference move and block until the stage is referenced.
    fn reference(&mut self, mode: ReferenceMode) -> DeviceResult<()>;

    /// Position reached by the most recent reference move.
    fn reference_position(&self) -> f64;

    /// Move to an absolute position and block until on target.
    fn move_to(&mut self, target: f64) -> DeviceResult<()>;

    /// Current measured position.
    fn position(&mut self) -> DeviceResult<f64>;

    /// Travel range limits as `(min, max)`.
    fn travel_range(&mut self) -> DeviceResult<(f64, f64)>;

    /// Configure and enable the trigger output.
    fn configure_trigger(&mut self, kind: TriggerOutput) -> DeviceResult<()>;

    /// Set the closed-loop velocity used for subsequent moves.
    fn set_velocity(&mut self, velocity: f64) -> DeviceResult<()>;

    /// Set the acceleration used for subsequent moves.
    fn set_acceleration(&mut self, acceleration: f64) -> DeviceResult<()>;

    /// Currently configured velocity.
    fn velocity(&mut self) -> DeviceResult<f64>;

    /// Currently configured acceleration.
    fn acceleration(&mut self) -> DeviceResult<f64>;

    /// Close the connection. The axis stays where it is.
    fn close(&mut self) -> DeviceResult<()>;
}

impl<T: MotionAxis + ?Sized> MotionAxis for Box<T> {
    fn connect(&mut self) -> DeviceResult<()> {
        (**self).connect()
    }

    fn reference(&mut self, mode: ReferenceMode) -> DeviceResult<()> {
        (**self).reference(mode)
    }

    fn reference_position(&self) -> f64 {
        (**self).reference_position()
    }

    fn move_to(&mut self, target: f64) -> DeviceResult<()> {
        (**self).move_to(target)
    }

    fn position(&mut self) -> DeviceResult<f64> {
        (**self).position()
    }

    fn travel_range(&mut self) -> DeviceResult<(f64, f64)> {
        (**self).travel_range()
    }

    fn configure_trigger(&mut self, kind: TriggerOutput) -> DeviceResult<()> {
        (**self).configure_trigger(kind)
    }

    fn set_velocity(&mut self, velocity: f64) -> DeviceResult<()> {
        (**self).set_velocity(velocity)
    }

    fn set_acceleration(&mut self, acceleration: f64) -> DeviceResult<()> {
        (**self).set_acceleration(acceleration)
    }

    fn velocity(&mut self) -> DeviceResult<f64> {
        (**self).velocity()
    }

    fn acceleration(&mut self) -> DeviceResult<f64> {
        (**self).acceleration()
    }

    fn close(&mut self) -> DeviceResult<()> {
        (**self).close()
    }
}
