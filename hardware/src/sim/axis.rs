use tracing::debug;

use super::TriggerLine;
use crate::error::{DeviceError, DeviceResult};
use crate::motion::{MotionAxis, ReferenceMode, TriggerOutput};

/// Tolerance for travel-limit checks on commanded targets.
const LIMIT_TOLERANCE: f64 = 1e-9;

/// Simulated linear stage with instantaneous, exact moves.
#[derive(Debug, Clone)]
pub struct SimulatedAxis {
    min: f64,
    max: f64,
    position: f64,
    reference_position: f64,
    velocity: f64,
    acceleration: f64,
    connected: bool,
    trigger: Option<TriggerOutput>,
    trigger_line: Option<TriggerLine>,
    aux_line: Option<TriggerLine>,
    moves: Vec<f64>,
}

impl SimulatedAxis {
    /// Create an axis with the given travel range, parked at `min`.
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            position: min,
            reference_position: min,
            velocity: 1.0,
            acceleration: 1.0,
            connected: false,
            trigger: None,
            trigger_line: None,
            aux_line: None,
            moves: Vec::new(),
        }
    }

    /// Wire this axis' trigger output to `line`.
    pub fn with_trigger_line(mut self, line: TriggerLine) -> Self {
        line.set_drive_position(self.position);
        self.trigger_line = Some(line);
        self
    }

    /// Publish this axis' position on `line` without driving triggers.
    pub fn with_aux_line(mut self, line: TriggerLine) -> Self {
        line.set_aux_position(self.position);
        self.aux_line = Some(line);
        self
    }

    /// Start at `position` instead of the negative limit.
    pub fn at(mut self, position: f64) -> Self {
        self.position = position;
        if let Some(line) = &self.trigger_line {
            line.set_drive_position(position);
        }
        if let Some(line) = &self.aux_line {
            line.set_aux_position(position);
        }
        self
    }

    /// Every target commanded through [`MotionAxis::move_to`], in order.
    pub fn moves(&self) -> &[f64] {
        &self.moves
    }

    /// Currently configured trigger output, if enabled.
    pub fn trigger(&self) -> Option<TriggerOutput> {
        self.trigger
    }

    fn ensure_connected(&self) -> DeviceResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(DeviceError::NotConnected("simulated axis".to_string()))
        }
    }

    /// Whether a move `from -> to` produces a trigger edge.
    fn triggers(&self, from: f64, to: f64) -> bool {
        match self.trigger {
            Some(TriggerOutput::LineTrigger) => true,
            // No motion, no in-motion pulse
            Some(TriggerOutput::InMotion) => from != to,
            None => false,
        }
    }

    fn travel(&mut self, target: f64) {
        let from = self.position;
        let fires = self.triggers(from, target);
        self.position = target;

        if let Some(line) = &self.trigger_line {
            if fires {
                line.fire(from, target);
            } else {
                line.set_drive_position(target);
            }
        }
        if let Some(line) = &self.aux_line {
            if fires {
                line.fire_aux(target);
            } else {
                line.set_aux_position(target);
            }
        }
    }
}

impl MotionAxis for SimulatedAxis {
    fn connect(&mut self) -> DeviceResult<()> {
        self.connected = true;
        Ok(())
    }

    fn reference(&mut self, mode: ReferenceMode) -> DeviceResult<()> {
        self.ensure_connected()?;
        let target = match mode {
            ReferenceMode::NegativeLimit => self.min,
            ReferenceMode::PositiveLimit => self.max,
        };
        self.travel(target);
        self.reference_position = target;
        debug!("Simulated axis referenced via {mode} at {target}");
        Ok(())
    }

    fn reference_position(&self) -> f64 {
        self.reference_position
    }

    fn move_to(&mut self, target: f64) -> DeviceResult<()> {
        self.ensure_connected()?;
        if !target.is_finite()
            || target < self.min - LIMIT_TOLERANCE
            || target > self.max + LIMIT_TOLERANCE
        {
            return Err(DeviceError::InvalidArgument(format!(
                "target {target} outside travel range [{}, {}]",
                self.min, self.max
            )));
        }
        self.moves.push(target);
        self.travel(target);
        Ok(())
    }

    fn position(&mut self) -> DeviceResult<f64> {
        Ok(self.position)
    }

    fn travel_range(&mut self) -> DeviceResult<(f64, f64)> {
        Ok((self.min, self.max))
    }

    fn configure_trigger(&mut self, kind: TriggerOutput) -> DeviceResult<()> {
        self.ensure_connected()?;
        self.trigger = Some(kind);
        Ok(())
    }

    fn set_velocity(&mut self, velocity: f64) -> DeviceResult<()> {
        if velocity <= 0.0 {
            return Err(DeviceError::InvalidArgument(format!(
                "velocity must be positive, got {velocity}"
            )));
        }
        self.velocity = velocity;
        Ok(())
    }

    fn set_acceleration(&mut self, acceleration: f64) -> DeviceResult<()> {
        if acceleration <= 0.0 {
            return Err(DeviceError::InvalidArgument(format!(
                "acceleration must be positive, got {acceleration}"
            )));
        }
        self.acceleration = acceleration;
        Ok(())
    }

    fn velocity(&mut self) -> DeviceResult<f64> {
        Ok(self.velocity)
    }

    fn acceleration(&mut self) -> DeviceResult<f64> {
        Ok(self.acceleration)
    }

    fn close(&mut self) -> DeviceResult<()> {
        self.connected = false;
        Ok(())
    }
}
