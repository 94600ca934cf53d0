//! Device interfaces for synchronized stage/lock-in scanning.
//!
//! This crate defines the two collaborators a scan talks to:
//!
//! - [`MotionAxis`] - a motorized positioning axis (PI C-663 class stepper
//!   controllers), optionally paired into a [`StageChain`] for raster scans
//! - [`AcquisitionModule`] - a hardware-triggered lock-in data acquisition
//!   module returning [`Burst`]s of grid data
//!
//! The [`sim`] module provides deterministic stand-ins for both, wired
//! together through a shared [`sim::TriggerLine`].

pub mod acquisition;
pub mod chain;
pub mod error;
pub mod motion;
pub mod sim;

pub use acquisition::{
    demod_sample_path, AcquisitionModule, Burst, DaqSettings, GridMode, SignalBurst, TriggerEdge,
    TriggerType,
};
pub use chain::StageChain;
pub use error::{DeviceError, DeviceResult};
pub use motion::{MotionAxis, ReferenceMode, TriggerOutput};
