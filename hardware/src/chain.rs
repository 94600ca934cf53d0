//! Two daisy-chained axes driven as a pair.
//!
//! In a raster scan the primary (master) axis sweeps along each row while the
//! secondary (servo) axis steps between rows. Both controllers hang off the
//! same USB daisy chain, so setup commands are always issued to both.

use std::cell::OnceCell;

use tracing::info;

use crate::error::DeviceResult;
use crate::motion::{MotionAxis, ReferenceMode, TriggerOutput};

/// A primary/secondary axis pair.
pub struct StageChain<P: MotionAxis, S: MotionAxis> {
    primary: P,
    secondary: S,
    /// Cached travel ranges: ((primary_min, primary_max), (secondary_min, secondary_max))
    cached_travel_ranges: OnceCell<((f64, f64), (f64, f64))>,
}

impl<P: MotionAxis, S: MotionAxis> StageChain<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self {
            primary,
            secondary,
            cached_travel_ranges: OnceCell::new(),
        }
    }

    /// Connect both controllers, primary first.
    pub fn connect_both(&mut self) -> DeviceResult<()> {
        self.primary.connect()?;
        self.secondary.connect()?;
        info!("Stage chain connected");
        Ok(())
    }

    /// Reference both stages. `modes[0]` applies to the primary axis.
    pub fn reference_both(&mut self, modes: [ReferenceMode; 2]) -> DeviceResult<()> {
        self.primary.reference(modes[0])?;
        self.secondary.reference(modes[1])?;
        info!("Both stages referenced ({} / {})", modes[0], modes[1]);
        Ok(())
    }

    /// Configure the trigger outputs. `kinds[0]` applies to the primary axis.
    pub fn configure_both_triggers(&mut self, kinds: [TriggerOutput; 2]) -> DeviceResult<()> {
        self.primary.configure_trigger(kinds[0])?;
        self.secondary.configure_trigger(kinds[1])
    }

    /// Travel ranges of both axes.
    ///
    /// The result is cached after the first call since travel ranges don't change.
    pub fn travel_ranges(&mut self) -> DeviceResult<((f64, f64), (f64, f64))> {
        if let Some(&ranges) = self.cached_travel_ranges.get() {
            return Ok(ranges);
        }

        let ranges = (self.primary.travel_range()?, self.secondary.travel_range()?);
        let _ = self.cached_travel_ranges.set(ranges);
        Ok(ranges)
    }

    pub fn primary_mut(&mut self) -> &mut P {
        &mut self.primary
    }

    pub fn secondary_mut(&mut self) -> &mut S {
        &mut self.secondary
    }

    /// Both axes at once, primary first.
    pub fn both_mut(&mut self) -> (&mut P, &mut S) {
        (&mut self.primary, &mut self.secondary)
    }

    /// Close both connections.
    pub fn close_both(&mut self) -> DeviceResult<()> {
        self.primary.close()?;
        self.secondary.close()
    }

    /// Split the chain back into its axes.
    pub fn into_parts(self) -> (P, S) {
        (self.primary, self.secondary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedAxis;

    #[test]
    fn test_reference_both_lands_on_limits() {
        let mut chain = StageChain::new(
            SimulatedAxis::new(0.0, 100.0),
            SimulatedAxis::new(-5.0, 5.0),
        );
        chain.connect_both().unwrap();
        chain
            .reference_both([ReferenceMode::NegativeLimit, ReferenceMode::PositiveLimit])
            .unwrap();

        let (mut primary, mut secondary) = chain.into_parts();
        assert_eq!(primary.position().unwrap(), 0.0);
        assert_eq!(secondary.position().unwrap(), 5.0);
    }

    #[test]
    fn test_travel_ranges() {
        let mut chain = StageChain::new(
            SimulatedAxis::new(0.0, 102.0),
            SimulatedAxis::new(0.0, 50.0),
        );
        assert_eq!(
            chain.travel_ranges().unwrap(),
            ((0.0, 102.0), (0.0, 50.0))
        );
    }

    #[test]
    fn test_configure_both_triggers() {
        let mut chain = StageChain::new(SimulatedAxis::new(0.0, 1.0), SimulatedAxis::new(0.0, 1.0));
        chain.connect_both().unwrap();
        chain
            .configure_both_triggers([TriggerOutput::InMotion, TriggerOutput::LineTrigger])
            .unwrap();
        assert_eq!(chain.primary_mut().trigger(), Some(TriggerOutput::InMotion));
        assert_eq!(chain.secondary_mut().trigger(), Some(TriggerOutput::LineTrigger));
    }
}
