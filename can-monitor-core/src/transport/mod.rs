//! Frame transport contract
//!
//! The monitor never talks to a driver directly. Everything it needs from the
//! hardware channel goes through the [`Transport`] trait: a non-blocking read,
//! a write, and a receive event the driver signals when frames arrive.

use crate::types::{Frame, TransportError};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::time::Duration;

pub mod loopback;

pub use loopback::LoopbackTransport;

/// Result of waiting on the receive event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

/// Auto-reset wait handle shared between the driver and the event-driven reader
///
/// Signals coalesce: any number of `signal()` calls before a `wait()` wake it once.
#[derive(Debug, Clone)]
pub struct ReceiveEvent {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl ReceiveEvent {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Wake one waiter; a no-op if the event is already signaled
    pub fn signal(&self) {
        let _ = self.tx.try_send(());
    }

    /// Block until signaled or until `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> WaitOutcome {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => WaitOutcome::Signaled,
            Err(_) => WaitOutcome::TimedOut,
        }
    }

    /// Drop a pending signal without waiting
    pub fn reset(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    pub fn is_signaled(&self) -> bool {
        !self.rx.is_empty()
    }
}

impl Default for ReceiveEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// Hardware channel as seen by the monitor
///
/// Implementations are shared between the controller and at most one
/// acquisition worker, so every method takes `&self`.
pub trait Transport: Send + Sync {
    /// Take the next queued frame without blocking
    ///
    /// `Ok(None)` means the receive queue is empty; it terminates a drain loop
    /// and is not an error.
    fn read(&self) -> Result<Option<Frame>, TransportError>;

    /// Queue a frame for transmission
    fn write(&self, frame: &Frame) -> Result<(), TransportError>;

    /// Attach (or with `None`, detach) the event signaled on frame arrival
    fn configure_event(&self, event: Option<ReceiveEvent>) -> Result<(), TransportError>;

    /// Wait on the configured receive event for at most `timeout`
    fn wait_for_event(&self, timeout: Duration) -> WaitOutcome;
}
