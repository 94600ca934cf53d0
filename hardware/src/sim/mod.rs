//! Deterministic simulated devices for dry runs and tests.
//!
//! A [`TriggerLine`] stands in for the BNC cables between the motion
//! controllers' trigger outputs and the lock-in trigger input. The axis that
//! drives the line (the swept axis) pushes one [`TriggerEvent`] per move while
//! its trigger output is enabled. An auxiliary axis (the stepped axis of a
//! raster) publishes its position so events can be tagged with it, and its
//! own trigger output shares the input: its moves fire events at the current
//! drive position. The [`SimulatedLockin`] drains the line on every read and
//! turns each event into one grid row.

mod axis;
mod lockin;

pub use axis::SimulatedAxis;
pub use lockin::{SignalFn, SimulatedLockin};

use std::sync::{Arc, Mutex, MutexGuard};

/// A single trigger produced by a move of the driving axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerEvent {
    /// Driving axis position when the move started
    pub from: f64,
    /// Driving axis position when the move completed
    pub to: f64,
    /// Auxiliary axis position at the time of the move
    pub aux: f64,
}

#[derive(Debug, Default)]
struct TriggerLineState {
    events: Vec<TriggerEvent>,
    drive_position: f64,
    aux_position: f64,
}

/// Shared trigger wiring between simulated axes and the simulated lock-in.
#[derive(Debug, Clone, Default)]
pub struct TriggerLine {
    state: Arc<Mutex<TriggerLineState>>,
}

impl TriggerLine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TriggerLineState> {
        // Pushes never leave the event list half-written.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Trigger from a move of the driving axis.
    pub(crate) fn fire(&self, from: f64, to: f64) {
        let mut state = self.lock();
        state.drive_position = to;
        let aux = state.aux_position;
        state.events.push(TriggerEvent { from, to, aux });
    }

    /// Trigger from a move of the auxiliary axis; the driving axis is parked.
    pub(crate) fn fire_aux(&self, aux: f64) {
        let mut state = self.lock();
        state.aux_position = aux;
        let at = state.drive_position;
        state.events.push(TriggerEvent {
            from: at,
            to: at,
            aux,
        });
    }

    pub(crate) fn set_drive_position(&self, position: f64) {
        self.lock().drive_position = position;
    }

    pub(crate) fn set_aux_position(&self, position: f64) {
        self.lock().aux_position = position;
    }

    /// Remove and return all pending events.
    pub fn drain(&self) -> Vec<TriggerEvent> {
        std::mem::take(&mut self.lock().events)
    }

    /// Number of pending events.
    pub fn pending(&self) -> usize {
        self.lock().events.len()
    }
}
