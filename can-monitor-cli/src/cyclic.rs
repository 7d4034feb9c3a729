//! Cyclic transmission
//!
//! A frame re-sent through the controller on every tick of a
//! `crossbeam_channel::tick` timer. The command loop selects on the ticker
//! next to stdin, so every write goes through the same controller as
//! interactive commands.

use can_monitor_core::{AcquisitionController, Frame};
use crossbeam_channel::{tick, Receiver};
use std::time::{Duration, Instant};

/// A frame transmitted every `interval` until cancelled
#[derive(Debug)]
pub struct CyclicSend {
    frame: Frame,
    interval: Duration,
    ticker: Receiver<Instant>,
    sent: u64,
}

impl CyclicSend {
    pub fn new(frame: Frame, interval: Duration) -> Self {
        log::info!("Cyclic send of {} every {:?}", frame.signature(), interval);
        Self {
            frame,
            interval,
            ticker: tick(interval),
            sent: 0,
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Timer channel; one message per due transmission
    pub fn ticker(&self) -> &Receiver<Instant> {
        &self.ticker
    }

    /// Frames sent so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Transmit the frame once
    pub fn fire(&mut self, controller: &AcquisitionController) -> can_monitor_core::Result<()> {
        controller.write_frame(&self.frame)?;
        self.sent += 1;
        Ok(())
    }
}
