//! Frame acquisition
//!
//! The [`AcquisitionController`] owns the connected session and runs exactly one
//! acquisition strategy against it:
//! - **Polling**: a background ticker drains the receive queue every
//!   `poll_interval_ms`
//! - **EventDriven**: a background reader waits on the receive event (bounded by
//!   `event_timeout_ms`) and drains when it is signaled
//! - **Manual**: nothing runs in the background; [`AcquisitionController::read_once`]
//!   consumes a single frame per call
//!
//! Switching strategies fully tears down the previous one (stop flag, wake-up,
//! join) before the next one starts, so at most one producer ever reads from the
//! transport.

use crate::config::{ChannelConfig, MonitorConfig};
use crate::info::InfoLog;
use crate::table::{AggregationTable, UpdateResult};
use crate::transport::{ReceiveEvent, Transport, WaitOutcome};
use crate::types::{Frame, MonitorError, Result, TransportError};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Acquisition strategies selectable on a connected session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Polling,
    EventDriven,
    Manual,
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Polling => "Polling",
            StrategyKind::EventDriven => "EventDriven",
            StrategyKind::Manual => "Manual",
        }
    }

    fn index(&self) -> usize {
        match self {
            StrategyKind::Polling => 0,
            StrategyKind::EventDriven => 1,
            StrategyKind::Manual => 2,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Current state of the acquisition state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    Active(StrategyKind),
}

impl AcquisitionState {
    pub fn name(&self) -> &'static str {
        match self {
            AcquisitionState::Idle => "Idle",
            AcquisitionState::Active(kind) => kind.name(),
        }
    }

    pub fn strategy(&self) -> Option<StrategyKind> {
        match self {
            AcquisitionState::Idle => None,
            AcquisitionState::Active(kind) => Some(*kind),
        }
    }
}

/// Outcome of one drain loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Frames fed into the table
    pub frames: usize,
    /// How many of those created a new entry
    pub created: usize,
    /// Transport error that ended the loop, if any
    pub error: Option<TransportError>,
}

/// Read until the receive queue is empty or the transport fails
///
/// Never blocks: an empty queue ends the loop immediately.
pub fn drain(transport: &dyn Transport, table: &AggregationTable) -> DrainReport {
    drain_until(transport, table, || false)
}

/// [`drain`] that also stops as soon as `should_stop` returns true
pub fn drain_until(
    transport: &dyn Transport,
    table: &AggregationTable,
    should_stop: impl Fn() -> bool,
) -> DrainReport {
    let mut report = DrainReport::default();
    while !should_stop() {
        match transport.read() {
            Ok(Some(frame)) => {
                if let UpdateResult::Created(_) = table.update(frame) {
                    report.created += 1;
                }
                report.frames += 1;
            }
            Ok(None) => break,
            Err(e) => {
                report.error = Some(e);
                break;
            }
        }
    }
    report
}

/// Frame and error counters of one strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyStats {
    pub frames: u64,
    pub read_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames: [AtomicU64; 3],
    read_errors: [AtomicU64; 3],
}

impl Counters {
    fn add_frames(&self, kind: StrategyKind, frames: u64) {
        self.frames[kind.index()].fetch_add(frames, Ordering::SeqCst);
    }

    fn add_error(&self, kind: StrategyKind) {
        self.read_errors[kind.index()].fetch_add(1, Ordering::SeqCst);
    }

    fn get(&self, kind: StrategyKind) -> StrategyStats {
        StrategyStats {
            frames: self.frames[kind.index()].load(Ordering::SeqCst),
            read_errors: self.read_errors[kind.index()].load(Ordering::SeqCst),
        }
    }
}

/// A connected hardware channel
pub struct Session {
    channel: ChannelConfig,
    transport: Arc<dyn Transport>,
    connected_at: DateTime<Utc>,
}

impl Session {
    pub fn channel(&self) -> &ChannelConfig {
        &self.channel
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("channel", &self.channel)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

/// Everything a background strategy needs, cloned into its thread
#[derive(Clone)]
struct WorkerContext {
    kind: StrategyKind,
    transport: Arc<dyn Transport>,
    table: Arc<AggregationTable>,
    info: Arc<InfoLog>,
    counters: Arc<Counters>,
    stop: Arc<AtomicBool>,
}

impl WorkerContext {
    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn drain_and_report(&self) {
        let report = drain_until(self.transport.as_ref(), &self.table, || self.stopping());
        self.counters.add_frames(self.kind, report.frames as u64);
        if report.frames > 0 {
            log::debug!(
                "{} drain: {} frames ({} new entries)",
                self.kind,
                report.frames,
                report.created
            );
        }
        if let Some(error) = report.error {
            self.counters.add_error(self.kind);
            report_read_error(&self.info, self.kind, &error);
        }
    }
}

fn report_read_error(info: &InfoLog, kind: StrategyKind, error: &TransportError) {
    log::warn!("{} read failed: {}", kind, error);
    info.error(format!("{} read failed: {}", kind, error));
}

fn run_polling(ctx: WorkerContext, interval: Duration, stop_rx: Receiver<()>) {
    let ticker = tick(interval);
    log::debug!("Polling worker started ({:?} interval)", interval);
    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(ticker) -> _ => {
                if ctx.stopping() {
                    break;
                }
                ctx.drain_and_report();
            }
        }
    }
    log::debug!("Polling worker stopped");
}

fn run_event_driven(ctx: WorkerContext, timeout: Duration) {
    log::debug!("Event-driven worker started ({:?} wait timeout)", timeout);
    while !ctx.stopping() {
        if ctx.transport.wait_for_event(timeout) == WaitOutcome::Signaled && !ctx.stopping() {
            ctx.drain_and_report();
        }
    }
    log::debug!("Event-driven worker stopped");
}

/// A running background strategy
struct Worker {
    kind: StrategyKind,
    stop: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    event: Option<ReceiveEvent>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Stop the worker and wait for its thread to exit
    fn shutdown(mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        // Disconnecting the stop channel wakes a ticker select immediately
        self.stop_tx.take();
        if let Some(event) = &self.event {
            event.signal();
        }
        let kind = self.kind;
        self.handle.join().map_err(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            MonitorError::WorkerPanicked(format!("{} worker: {}", kind, message))
        })?;
        if let Some(event) = &self.event {
            event.reset();
        }
        Ok(())
    }
}

/// Owns the session and the single active acquisition strategy
pub struct AcquisitionController {
    config: MonitorConfig,
    table: Arc<AggregationTable>,
    info: Arc<InfoLog>,
    session: Option<Session>,
    state: AcquisitionState,
    worker: Option<Worker>,
    counters: Arc<Counters>,
}

impl AcquisitionController {
    /// Create a disconnected controller feeding `table`
    pub fn new(table: Arc<AggregationTable>, info: Arc<InfoLog>, config: MonitorConfig) -> Self {
        Self {
            config,
            table,
            info,
            session: None,
            state: AcquisitionState::Idle,
            worker: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Open a session on `transport`; a previous session is disconnected first
    pub fn connect(&mut self, transport: Arc<dyn Transport>, channel: ChannelConfig) -> Result<()> {
        if self.session.is_some() {
            self.disconnect()?;
        }
        log::info!("Connecting to channel {}", channel);
        self.info.info(format!("Connected to {}", channel));
        self.session = Some(Session {
            channel,
            transport,
            connected_at: Utc::now(),
        });
        self.state = AcquisitionState::Idle;
        Ok(())
    }

    /// Stop acquisition and release the session; the table stays queryable
    pub fn disconnect(&mut self) -> Result<()> {
        let result = self.teardown();
        if let Some(session) = self.session.take() {
            log::info!("Disconnected from channel {}", session.channel);
            self.info.info(format!("Disconnected from {}", session.channel));
        }
        result
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// True while a background strategy thread is alive
    pub fn worker_active(&self) -> bool {
        self.worker.is_some()
    }

    pub fn table(&self) -> &Arc<AggregationTable> {
        &self.table
    }

    pub fn info_log(&self) -> &Arc<InfoLog> {
        &self.info
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Frames and read errors attributed to a strategy since creation
    pub fn stats(&self, kind: StrategyKind) -> StrategyStats {
        self.counters.get(kind)
    }

    fn transport(&self) -> Result<Arc<dyn Transport>> {
        self.session
            .as_ref()
            .map(|session| Arc::clone(&session.transport))
            .ok_or(MonitorError::NotConnected)
    }

    /// Switch to `kind`, tearing down the current strategy first
    ///
    /// If the new strategy cannot be configured the controller keeps its
    /// current state and returns [`MonitorError::Configuration`].
    pub fn select_strategy(&mut self, kind: StrategyKind) -> Result<()> {
        let transport = self.transport()?;
        if self.state == AcquisitionState::Active(kind) {
            return Ok(());
        }

        // Configure before tearing anything down so a failure leaves the old strategy running
        let event = if kind == StrategyKind::EventDriven {
            let event = ReceiveEvent::new();
            if let Err(e) = transport.configure_event(Some(event.clone())) {
                let message = format!("Cannot start {} acquisition: {}", kind, e);
                log::error!("{}", message);
                self.info.error(message.clone());
                return Err(MonitorError::Configuration(message));
            }
            Some(event)
        } else {
            None
        };

        if let Err(e) = self.teardown() {
            if event.is_some() {
                let _ = transport.configure_event(None);
            }
            return Err(e);
        }

        let ctx = WorkerContext {
            kind,
            transport: Arc::clone(&transport),
            table: Arc::clone(&self.table),
            info: Arc::clone(&self.info),
            counters: Arc::clone(&self.counters),
            stop: Arc::new(AtomicBool::new(false)),
        };

        let worker = match kind {
            StrategyKind::Manual => None,
            StrategyKind::Polling => {
                let (stop_tx, stop_rx) = bounded(1);
                let interval = self.config.poll_interval();
                let stop = Arc::clone(&ctx.stop);
                let handle = thread::Builder::new()
                    .name("can-poll".to_string())
                    .spawn(move || run_polling(ctx, interval, stop_rx))?;
                Some(Worker {
                    kind,
                    stop,
                    stop_tx: Some(stop_tx),
                    event: None,
                    handle,
                })
            }
            StrategyKind::EventDriven => {
                let timeout = self.config.event_timeout();
                let stop = Arc::clone(&ctx.stop);
                let spawned = thread::Builder::new()
                    .name("can-event".to_string())
                    .spawn(move || run_event_driven(ctx, timeout));
                let handle = match spawned {
                    Ok(handle) => handle,
                    Err(e) => {
                        let _ = transport.configure_event(None);
                        return Err(e.into());
                    }
                };
                Some(Worker {
                    kind,
                    stop,
                    stop_tx: None,
                    event,
                    handle,
                })
            }
        };

        self.worker = worker;
        self.state = AcquisitionState::Active(kind);
        log::info!("Acquisition strategy: {}", kind);
        self.info.info(format!("Reading mode: {}", kind));
        Ok(())
    }

    /// Stop the active strategy and return to Idle
    pub fn stop(&mut self) -> Result<()> {
        self.teardown()
    }

    /// Stop and join the background worker, detach the receive event
    fn teardown(&mut self) -> Result<()> {
        let previous = self.state;
        self.state = AcquisitionState::Idle;

        let mut result = Ok(());
        if let Some(worker) = self.worker.take() {
            let had_event = worker.event.is_some();
            result = worker.shutdown();
            if had_event {
                if let Some(session) = &self.session {
                    if let Err(e) = session.transport.configure_event(None) {
                        log::warn!("Failed to detach receive event: {}", e);
                    }
                }
            }
        }

        if previous != AcquisitionState::Idle {
            log::debug!("{} acquisition stopped", previous.name());
        }
        if let Err(e) = &result {
            log::error!("{}", e);
            self.info.error(e.to_string());
        }
        result
    }

    /// Read exactly one frame (Manual strategy only)
    ///
    /// Returns `Ok(None)` when the receive queue is empty. A transport error is
    /// logged to the info log and returned.
    pub fn read_once(&self) -> Result<Option<UpdateResult>> {
        let transport = self.transport()?;
        if self.state != AcquisitionState::Active(StrategyKind::Manual) {
            return Err(MonitorError::WrongStrategy {
                expected: StrategyKind::Manual.name(),
                active: self.state.name(),
            });
        }

        match transport.read() {
            Ok(Some(frame)) => {
                let result = self.table.update(frame);
                self.counters.add_frames(StrategyKind::Manual, 1);
                Ok(Some(result))
            }
            Ok(None) => {
                self.info.info("The receive queue is empty");
                Ok(None)
            }
            Err(e) => {
                self.counters.add_error(StrategyKind::Manual);
                report_read_error(&self.info, StrategyKind::Manual, &e);
                Err(e.into())
            }
        }
    }

    /// Validate and transmit a frame on the connected channel
    pub fn write_frame(&self, frame: &Frame) -> Result<()> {
        let transport = self.transport()?;
        frame.validate()?;
        match transport.write(frame) {
            Ok(()) => {
                log::debug!("Sent {}", frame.signature());
                self.info.info("Message was successfully SENT");
                Ok(())
            }
            Err(e) => {
                log::warn!("Write failed: {}", e);
                self.info.error(format!("Write failed: {}", e));
                Err(e.into())
            }
        }
    }
}

impl Drop for AcquisitionController {
    fn drop(&mut self) {
        if self.session.is_some() || self.worker.is_some() {
            let _ = self.disconnect();
        }
    }
}
