//! In-memory transport
//!
//! A receive queue fed by [`LoopbackTransport::receive`], stamped with a
//! driver-relative clock. Written frames can be echoed back, and read, write and
//! event-configuration errors can be injected.

use super::{ReceiveEvent, Transport, WaitOutcome};
use crate::types::{Frame, Timestamp, TransportError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct LoopbackState {
    queue: VecDeque<Frame>,
    read_errors: VecDeque<TransportError>,
    event: Option<ReceiveEvent>,
    echo_writes: bool,
    written: Vec<Frame>,
    write_error: Option<TransportError>,
    event_error: Option<TransportError>,
}

/// Queue-backed transport for tests and simulation
#[derive(Debug)]
pub struct LoopbackTransport {
    state: Mutex<LoopbackState>,
    started: Instant,
    read_calls: AtomicU64,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopbackState::default()),
            started: Instant::now(),
            read_calls: AtomicU64::new(0),
        }
    }

    /// Builder method: loop written frames back into the receive queue
    pub fn with_echo(self, enabled: bool) -> Self {
        self.lock().echo_writes = enabled;
        self
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Driver-relative time since this transport was created
    pub fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.started.elapsed().as_micros() as u64)
    }

    /// Enqueue a frame as if it had just arrived on the bus
    pub fn receive(&self, frame: Frame) {
        let stamped = frame.with_timestamp(self.now());
        self.receive_at(stamped);
    }

    /// Enqueue a frame keeping its own timestamp
    pub fn receive_at(&self, frame: Frame) {
        let event = {
            let mut state = self.lock();
            state.queue.push_back(frame);
            state.event.clone()
        };
        if let Some(event) = event {
            event.signal();
        }
    }

    /// Make the next read return `error` before any queued frame
    pub fn fail_next_read(&self, error: TransportError) {
        self.lock().read_errors.push_back(error);
    }

    /// Make every write fail with `error` (or succeed again with `None`)
    pub fn fail_writes(&self, error: Option<TransportError>) {
        self.lock().write_error = error;
    }

    /// Make attaching a receive event fail with `error`
    pub fn fail_event_configuration(&self, error: Option<TransportError>) {
        self.lock().event_error = error;
    }

    /// Frames still waiting in the receive queue
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Every frame successfully written so far
    pub fn written_frames(&self) -> Vec<Frame> {
        self.lock().written.clone()
    }

    /// Number of `read()` calls, successful or not
    pub fn read_calls(&self) -> u64 {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn has_event(&self) -> bool {
        self.lock().event.is_some()
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LoopbackTransport {
    fn read(&self) -> Result<Option<Frame>, TransportError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if let Some(error) = state.read_errors.pop_front() {
            return Err(error);
        }
        Ok(state.queue.pop_front())
    }

    fn write(&self, frame: &Frame) -> Result<(), TransportError> {
        let echo = {
            let mut state = self.lock();
            if let Some(error) = &state.write_error {
                return Err(error.clone());
            }
            state.written.push(*frame);
            state.echo_writes
        };
        if echo {
            self.receive(*frame);
        }
        Ok(())
    }

    fn configure_event(&self, event: Option<ReceiveEvent>) -> Result<(), TransportError> {
        let mut state = self.lock();
        if event.is_some() {
            if let Some(error) = &state.event_error {
                return Err(error.clone());
            }
        }
        if let Some(event) = &event {
            // Frames queued before the event was attached must still wake the reader
            if !state.queue.is_empty() {
                event.signal();
            }
        }
        state.event = event;
        Ok(())
    }

    fn wait_for_event(&self, timeout: Duration) -> WaitOutcome {
        let event = self.lock().event.clone();
        match event {
            Some(event) => event.wait(timeout),
            None => {
                thread::sleep(timeout);
                WaitOutcome::TimedOut
            }
        }
    }
}
