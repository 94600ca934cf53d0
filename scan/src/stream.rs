//! Live sample stream from a running scan.
//!
//! The scan loop publishes [`ScanEvent`]s through a bounded channel in
//! acquisition order and always finishes with exactly one [`ScanEvent::End`].
//! When the channel is full the scan loop blocks until the receiver catches
//! up, so size the buffer for the slowest consumer.

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::warn;

use crate::session::SessionState;

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// One reconstructed point, one value per subscribed signal
    Sample {
        index: usize,
        primary: f64,
        secondary: Option<f64>,
        values: Vec<f64>,
    },
    /// A row (or a 1-D target) finished; `completed` of `total`
    RowComplete { completed: usize, total: usize },
    /// Terminal event
    End { state: SessionState, partial: bool },
}

/// Bounded event channel.
pub fn channel(capacity: usize) -> (Sender<ScanEvent>, Receiver<ScanEvent>) {
    bounded(capacity.max(1))
}

/// Publishing side held by the orchestrator.
#[derive(Debug, Default)]
pub(crate) struct EventSink {
    sender: Option<Sender<ScanEvent>>,
}

impl EventSink {
    pub(crate) fn new(sender: Option<Sender<ScanEvent>>) -> Self {
        Self { sender }
    }

    /// Blocks while the channel is full. A disconnected receiver detaches the
    /// sink; the scan itself carries on.
    pub(crate) fn send(&mut self, event: ScanEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                warn!("Scan event receiver dropped, live stream detached");
                self.sender = None;
            }
        }
    }
}

/// Everything received on a scan stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collected {
    /// `(index, primary, secondary, values)` in arrival order
    pub samples: Vec<(usize, f64, Option<f64>, Vec<f64>)>,
    pub rows_completed: usize,
    /// Final state and partial flag, if the `End` sentinel arrived
    pub end: Option<(SessionState, bool)>,
}

/// Drain `receiver` until the `End` sentinel (or disconnection).
pub fn collect(receiver: &Receiver<ScanEvent>) -> Collected {
    let mut collected = Collected::default();
    while let Ok(event) = receiver.recv() {
        match event {
            ScanEvent::Sample {
                index,
                primary,
                secondary,
                values,
            } => collected.samples.push((index, primary, secondary, values)),
            ScanEvent::RowComplete { completed, .. } => collected.rows_completed = completed,
            ScanEvent::End { state, partial } => {
                collected.end = Some((state, partial));
                break;
            }
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_collect_stops_at_end() {
        let (tx, rx) = channel(4);
        let consumer = thread::spawn(move || collect(&rx));

        let mut sink = EventSink::new(Some(tx.clone()));
        for i in 0..10 {
            sink.send(ScanEvent::Sample {
                index: i,
                primary: i as f64,
                secondary: None,
                values: vec![1.0],
            });
        }
        sink.send(ScanEvent::RowComplete {
            completed: 1,
            total: 1,
        });
        sink.send(ScanEvent::End {
            state: SessionState::Finished,
            partial: false,
        });

        let collected = consumer.join().unwrap();
        assert_eq!(collected.samples.len(), 10);
        assert_eq!(collected.samples[9].0, 9);
        assert_eq!(collected.rows_completed, 1);
        assert_eq!(collected.end, Some((SessionState::Finished, false)));
        drop(tx);
    }

    #[test]
    fn test_collect_without_end() {
        let (tx, rx) = channel(0);
        drop(tx);
        assert_eq!(collect(&rx).end, None);
    }

    #[test]
    fn test_dropped_receiver_detaches() {
        let (tx, rx) = channel(1);
        drop(rx);
        let mut sink = EventSink::new(Some(tx));
        sink.send(ScanEvent::RowComplete {
            completed: 0,
            total: 1,
        });
        assert!(sink.sender.is_none());
    }
}
